use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub path: PathBuf,
    title: OnceLock<String>,
}

impl Track {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            title: OnceLock::new(),
        }
    }

    pub fn title(&self) -> &str {
        self.title
            .get_or_init(|| crate::library::title_for_path(&self.path))
    }

    pub fn file_stem(&self) -> String {
        file_stem_title(&self.path)
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Track {}

pub fn file_stem_title(path: &Path) -> String {
    path.file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            tracks,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.tracks.iter().position(|track| track.path == path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    playlists: BTreeMap<String, Playlist>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, playlist: Playlist) {
        if playlist.is_empty() {
            return;
        }
        self.playlists.insert(playlist.name.clone(), playlist);
    }

    pub fn get(&self, name: &str) -> Option<&Playlist> {
        self.playlists.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.playlists.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.playlists.keys().cloned().collect()
    }

    pub fn first_name(&self) -> Option<&str> {
        self.playlists.keys().next().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

}

impl FromIterator<Playlist> for Catalog {
    fn from_iter<I: IntoIterator<Item = Playlist>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for playlist in iter {
            catalog.insert(playlist);
        }
        catalog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    To(i32),
    By(i32),
}

impl VolumeChange {
    pub fn apply(self, current: u8) -> u8 {
        let target = match self {
            Self::To(value) => value,
            Self::By(delta) => i32::from(current).saturating_add(delta),
        };
        target.clamp(0, 100) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoPlaylists,
    EmptyPlaylist,
    PlaybackFailed { path: PathBuf, reason: String },
    BackendFailure(String),
    Rescanned { playlists: usize },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPlaylists => write!(f, "No playlists found"),
            Self::EmptyPlaylist => write!(f, "No files in playlist"),
            Self::PlaybackFailed { path, reason } => {
                write!(f, "Playback failed for {}: {reason}", file_stem_title(path))
            }
            Self::BackendFailure(reason) => write!(f, "Audio backend error: {reason}"),
            Self::Rescanned { playlists } => write!(f, "Found {playlists} playlists"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "percent_level")]
    pub volume: u8,
    pub shuffle: bool,
    pub pinned: bool,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub bg_color: String,
    pub btn_color: String,
    pub font_color: String,
    #[serde(
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub playlist: Option<String>,
    #[serde(deserialize_with = "non_negative_index")]
    pub song_index: usize,
    pub show_titlebar: bool,
    #[serde(deserialize_with = "percent_level")]
    pub opacity: u8,
    pub resizable: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: 80,
            shuffle: true,
            pinned: true,
            x: 100,
            y: 100,
            width: 600,
            height: 40,
            bg_color: String::from("#000000"),
            btn_color: String::from("#333333"),
            font_color: String::from("#FFFFFF"),
            playlist: None,
            song_index: 0,
            show_titlebar: true,
            opacity: 100,
            resizable: true,
        }
    }
}

impl Settings {
    pub fn sanitized(mut self) -> Self {
        self.volume = self.volume.min(100);
        self.opacity = self.opacity.min(100);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowPrefs {
    pub pinned: Option<bool>,
    pub geometry: Option<(i32, i32, u32, u32)>,
    pub bg_color: Option<String>,
    pub btn_color: Option<String>,
    pub font_color: Option<String>,
    pub show_titlebar: Option<bool>,
    pub opacity: Option<u8>,
    pub resizable: Option<bool>,
}

impl WindowPrefs {
    pub fn apply_to(self, settings: &mut Settings) {
        if let Some(pinned) = self.pinned {
            settings.pinned = pinned;
        }
        if let Some((x, y, width, height)) = self.geometry {
            settings.x = x;
            settings.y = y;
            settings.width = width;
            settings.height = height;
        }
        if let Some(color) = self.bg_color {
            settings.bg_color = color;
        }
        if let Some(color) = self.btn_color {
            settings.btn_color = color;
        }
        if let Some(color) = self.font_color {
            settings.font_color = color;
        }
        if let Some(show) = self.show_titlebar {
            settings.show_titlebar = show;
        }
        if let Some(opacity) = self.opacity {
            settings.opacity = opacity.min(100);
        }
        if let Some(resizable) = self.resizable {
            settings.resizable = resizable;
        }
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|name| !name.trim().is_empty()))
}

fn percent_level<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    Ok(value.clamp(0, 100) as u8)
}

fn non_negative_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    Ok(usize::try_from(value).unwrap_or(0))
}
