use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlayerError {
    #[error("audio backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("no playlist selected")]
    NoPlaylistSelected,

    #[error("playlist has no tracks")]
    EmptyPlaylist,

    #[error("unknown playlist: {0}")]
    UnknownPlaylist(String),

    #[error("track index {index} out of range for playlist of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to play {}: {reason}", path.display())]
    Playback { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, PlayerError>;
