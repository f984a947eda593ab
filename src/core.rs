use crate::audio::AudioEngine;
use crate::config::ConfigStore;
use crate::error::{PlayerError, Result};
use crate::library;
use crate::model::{
    Catalog, Notice, PlaybackStatus, Playlist, Settings, Track, VolumeChange, WindowPrefs,
};
use crate::shuffle::ShuffleOrder;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Advanced,
    Failed,
}

#[derive(Debug, Default, Clone, Copy)]
struct LoadWatch {
    ticks: u32,
    handled: bool,
}

pub struct PlayerController<E: AudioEngine> {
    engine: E,
    store: ConfigStore,
    settings: Settings,
    catalog: Catalog,
    playlist: Option<String>,
    current: Option<usize>,
    status: PlaybackStatus,
    shuffle_order: Option<ShuffleOrder>,
    loaded: bool,
    // engine still plays a file the current catalog no longer has
    detached: bool,
    recovering: bool,
    watch: LoadWatch,
    notice: Option<Notice>,
    rng: SmallRng,
}

impl<E: AudioEngine> PlayerController<E> {
    pub fn new(engine: E, store: ConfigStore, catalog: Catalog) -> Self {
        let settings = store.load();
        Self::with_settings(engine, store, settings, catalog)
    }

    pub fn with_settings(
        engine: E,
        store: ConfigStore,
        settings: Settings,
        catalog: Catalog,
    ) -> Self {
        let mut controller = Self {
            engine,
            store,
            settings: settings.sanitized(),
            catalog,
            playlist: None,
            current: None,
            status: PlaybackStatus::Stopped,
            shuffle_order: None,
            loaded: false,
            detached: false,
            recovering: false,
            watch: LoadWatch::default(),
            notice: None,
            rng: SmallRng::from_os_rng(),
        };
        controller.engine.set_volume(controller.settings.volume);
        controller.restore_selection();
        controller
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    fn restore_selection(&mut self) {
        let Some(name) = self
            .settings
            .playlist
            .clone()
            .filter(|name| self.catalog.contains(name))
            .or_else(|| self.catalog.first_name().map(str::to_string))
        else {
            info!("no playlists available");
            self.notice = Some(Notice::NoPlaylists);
            return;
        };
        self.select_playlist(&name);
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn current_playlist(&self) -> Option<&str> {
        self.playlist.as_deref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn shuffle(&self) -> bool {
        self.settings.shuffle
    }

    pub fn shuffle_order(&self) -> Option<&ShuffleOrder> {
        self.shuffle_order.as_ref()
    }

    pub fn volume(&self) -> u8 {
        self.settings.volume
    }

    pub fn playlist_names(&self) -> Vec<String> {
        self.catalog.names()
    }

    pub fn current_track(&self) -> Option<&Track> {
        if self.detached {
            return None;
        }
        let index = self.current?;
        self.current_list()?.tracks.get(index)
    }

    pub fn current_title(&self) -> Option<String> {
        if self.detached {
            return self.engine.loaded_track().map(library::title_for_path);
        }
        self.current_track().map(|track| track.title().to_string())
    }

    pub fn position(&self) -> Option<Duration> {
        self.engine.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.engine.duration()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Does not start playback.
    pub fn select_playlist(&mut self, name: &str) {
        let Some(len) = self.catalog.get(name).map(Playlist::len) else {
            debug!(playlist = name, "ignoring selection of unknown playlist");
            return;
        };

        let index = if self.settings.playlist.as_deref() == Some(name)
            && self.settings.song_index < len
        {
            self.settings.song_index
        } else {
            0
        };

        if self.playlist.as_deref() != Some(name) {
            if self.status != PlaybackStatus::Stopped {
                self.engine.stop();
                self.status = PlaybackStatus::Stopped;
            }
            self.loaded = false;
            self.detached = false;
        }

        self.playlist = Some(name.to_string());
        self.current = Some(index);
        self.shuffle_order = self
            .settings
            .shuffle
            .then(|| ShuffleOrder::starting_at(len, index, &mut self.rng));

        debug!(playlist = name, index, "playlist selected");
        self.settings.playlist = Some(name.to_string());
        self.settings.song_index = index;
        self.persist();
    }

    pub fn select_adjacent_playlist(&mut self, forward: bool) -> Option<String> {
        let names = self.catalog.names();
        if names.is_empty() {
            self.notice = Some(Notice::NoPlaylists);
            return None;
        }

        let position = self
            .playlist
            .as_ref()
            .and_then(|current| names.iter().position(|name| name == current));
        let target = match (position, forward) {
            (None, _) => 0,
            (Some(pos), true) => (pos + 1) % names.len(),
            (Some(pos), false) => (pos + names.len() - 1) % names.len(),
        };

        let name = names[target].clone();
        self.select_playlist(&name);
        Some(name)
    }

    pub fn play_track_at_index(&mut self, index: usize) -> Result<()> {
        let len = self.current_len()?;
        if index >= len {
            return Err(PlayerError::IndexOutOfRange { index, len });
        }
        self.start_with_skip(index)
    }

    pub fn toggle_play_pause(&mut self) -> Result<()> {
        match self.status {
            PlaybackStatus::Playing => {
                self.engine.pause();
                self.status = PlaybackStatus::Paused;
                Ok(())
            }
            PlaybackStatus::Stopped if self.detached => self.next(),
            PlaybackStatus::Paused | PlaybackStatus::Stopped if self.loaded => {
                let restarting = self.status == PlaybackStatus::Stopped;
                if let Err(err) = self.engine.play() {
                    let path = self
                        .engine
                        .loaded_track()
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    return Err(self.halt_with_failure(path, format!("{err:#}")));
                }
                if restarting {
                    self.watch = LoadWatch::default();
                }
                self.status = PlaybackStatus::Playing;
                Ok(())
            }
            PlaybackStatus::Paused | PlaybackStatus::Stopped => {
                if !self.report_if_unplayable() {
                    return Ok(());
                }
                let index = self.current.unwrap_or(0);
                self.play_track_at_index(index)
            }
        }
    }

    pub fn stop(&mut self) {
        self.engine.stop();
        self.status = PlaybackStatus::Stopped;
    }

    pub fn next(&mut self) -> Result<()> {
        if !self.report_if_unplayable() {
            return Ok(());
        }

        let target = match self.current {
            Some(index) => self.next_index(index),
            None => self.first_index(),
        };
        match target {
            Some(index) => self.start_with_skip(index),
            None => Ok(()),
        }
    }

    pub fn previous(&mut self) -> Result<()> {
        if !self.report_if_unplayable() {
            return Ok(());
        }

        let target = match self.current {
            Some(index) => self.previous_index(index),
            None => self.first_index(),
        };
        match target {
            Some(index) => self.start_with_skip(index),
            None => Ok(()),
        }
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.settings.shuffle = enabled;
        self.shuffle_order = match (enabled, self.current_len().ok()) {
            (true, Some(len)) => Some(ShuffleOrder::starting_at(
                len,
                self.current.unwrap_or(0),
                &mut self.rng,
            )),
            _ => None,
        };
        debug!(enabled, "shuffle changed");
        self.persist();
    }

    pub fn set_volume(&mut self, change: VolumeChange) -> u8 {
        let volume = change.apply(self.settings.volume);
        self.engine.set_volume(volume);
        self.settings.volume = volume;
        self.persist();
        volume
    }

    pub fn update_window_prefs(&mut self, prefs: WindowPrefs) {
        prefs.apply_to(&mut self.settings);
        self.persist();
    }

    /// End reports count from the second tick after a load, once per load.
    /// A failed output gets one reopen and skip before playback stops.
    pub fn monitor_tick(&mut self) -> TickOutcome {
        if !self.engine.is_healthy() {
            if self.status != PlaybackStatus::Playing {
                return TickOutcome::Idle;
            }
            if self.recovering {
                warn!("audio backend still failing after reopen, stopping");
                self.halt_backend(String::from("audio output stream failed"));
                return TickOutcome::Failed;
            }

            warn!("audio backend reported an error, reopening output");
            self.recovering = true;
            if let Err(err) = self.engine.recover() {
                warn!("reopening audio output failed: {err:#}");
                self.halt_backend(format!("{err:#}"));
                return TickOutcome::Failed;
            }
            return match self.next() {
                Ok(()) if self.status == PlaybackStatus::Playing => TickOutcome::Advanced,
                _ => TickOutcome::Failed,
            };
        }
        self.recovering = false;

        if self.status != PlaybackStatus::Playing || !self.loaded {
            return TickOutcome::Idle;
        }

        self.watch.ticks = self.watch.ticks.saturating_add(1);
        if self.watch.handled || !self.engine.has_ended() {
            return TickOutcome::Idle;
        }
        if self.watch.ticks <= 1 {
            debug!("end report on first tick after load, waiting one more tick");
            return TickOutcome::Idle;
        }

        self.watch.handled = true;
        debug!(index = ?self.current, "track ended, advancing");
        match self.next() {
            Ok(()) if self.status == PlaybackStatus::Playing => TickOutcome::Advanced,
            _ => TickOutcome::Failed,
        }
    }

    pub fn rescan(&mut self, root: &Path) -> usize {
        let catalog = library::scan(root);
        self.replace_catalog(catalog)
    }

    pub fn replace_catalog(&mut self, catalog: Catalog) -> usize {
        let previous_path = if self.loaded {
            self.engine.loaded_track().map(Path::to_path_buf)
        } else {
            self.current_track().map(|track| track.path.clone())
        };
        // while detached, `current` is one slot before where the track sat
        let sat_at = self
            .current
            .map(|index| if self.detached { index + 1 } else { index });
        self.catalog = catalog;
        let count = self.catalog.len();
        info!(playlists = count, "catalog replaced");

        let Some(name) = self.playlist.clone() else {
            self.restore_selection();
            if !self.catalog.is_empty() {
                self.notice = Some(Notice::Rescanned { playlists: count });
            }
            return count;
        };

        let Some(len) = self.catalog.get(&name).map(Playlist::len) else {
            warn!(playlist = %name, "selected playlist disappeared");
            self.clear_selection();
            self.notice = Some(if self.catalog.is_empty() {
                Notice::NoPlaylists
            } else {
                Notice::EmptyPlaylist
            });
            return count;
        };

        let relocated = previous_path
            .as_deref()
            .and_then(|path| self.catalog.get(&name)?.position_of(path));
        let index = match relocated {
            Some(index) => {
                self.detached = false;
                index
            }
            None if self.loaded && previous_path.is_some() => {
                // park on the track before the gap so `next` lands after it
                debug!("playing track left the catalog, keeping it until it ends");
                self.detached = true;
                let following = sat_at.filter(|index| *index < len).unwrap_or(0);
                (following + len - 1) % len
            }
            None => {
                self.detached = false;
                sat_at.filter(|index| *index < len).unwrap_or(0)
            }
        };
        self.current = Some(index);

        if self.settings.shuffle {
            let stale = self
                .shuffle_order
                .as_ref()
                .is_none_or(|order| order.len() != len || order.current() != Some(index));
            if stale {
                self.shuffle_order = Some(ShuffleOrder::starting_at(len, index, &mut self.rng));
            }
        }

        self.settings.song_index = index;
        self.persist();
        self.notice = Some(Notice::Rescanned { playlists: count });
        count
    }

    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        self.engine.stop();
        self.status = PlaybackStatus::Stopped;
        self.store.save(&self.settings)
    }

    fn current_list(&self) -> Option<&Playlist> {
        self.catalog.get(self.playlist.as_deref()?)
    }

    fn current_len(&self) -> Result<usize> {
        let Some(name) = self.playlist.as_deref() else {
            return Err(PlayerError::NoPlaylistSelected);
        };
        match self.catalog.get(name) {
            Some(list) if !list.is_empty() => Ok(list.len()),
            Some(_) => Err(PlayerError::EmptyPlaylist),
            None => Err(PlayerError::UnknownPlaylist(name.to_string())),
        }
    }

    fn report_if_unplayable(&mut self) -> bool {
        match self.current_len() {
            Ok(_) => true,
            Err(err) => {
                debug!("nothing to play: {err}");
                self.notice = Some(if self.catalog.is_empty() {
                    Notice::NoPlaylists
                } else {
                    Notice::EmptyPlaylist
                });
                false
            }
        }
    }

    fn first_index(&mut self) -> Option<usize> {
        let len = self.current_len().ok()?;
        if self.settings.shuffle {
            let order = ShuffleOrder::new(len, &mut self.rng);
            let first = order.current();
            self.shuffle_order = Some(order);
            first
        } else {
            Some(0)
        }
    }

    fn next_index(&mut self, from: usize) -> Option<usize> {
        let len = self.current_len().ok()?;
        if !self.settings.shuffle {
            return Some((from + 1) % len);
        }
        self.align_shuffle(len, from);
        self.shuffle_order.as_mut()?.advance(&mut self.rng)
    }

    fn previous_index(&mut self, from: usize) -> Option<usize> {
        let len = self.current_len().ok()?;
        if !self.settings.shuffle {
            return Some((from + len - 1) % len);
        }
        self.align_shuffle(len, from);
        match self.shuffle_order.as_mut()?.retreat() {
            Some(index) => Some(index),
            None => self.next_index(from),
        }
    }

    fn align_shuffle(&mut self, len: usize, index: usize) {
        let aligned = self
            .shuffle_order
            .as_ref()
            .is_some_and(|order| order.len() == len && order.current() == Some(index));
        if !aligned {
            self.shuffle_order = Some(ShuffleOrder::starting_at(len, index, &mut self.rng));
        }
    }

    fn start_with_skip(&mut self, index: usize) -> Result<()> {
        let first_err = match self.start_track(index) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!("{first_err}, skipping to the next track");

        let Some(retry) = self.next_index(index) else {
            return Err(self.halt_after(first_err));
        };
        match self.start_track(retry) {
            Ok(()) => Ok(()),
            Err(second_err) => {
                warn!("{second_err}, giving up");
                Err(self.halt_after(second_err))
            }
        }
    }

    fn start_track(&mut self, index: usize) -> Result<()> {
        let len = self.current_len()?;
        let path = self
            .current_list()
            .and_then(|list| list.tracks.get(index))
            .map(|track| track.path.clone())
            .ok_or(PlayerError::IndexOutOfRange { index, len })?;

        self.current = Some(index);
        if self.settings.shuffle {
            self.align_shuffle(len, index);
        }

        self.detached = false;
        if let Err(err) = self.load_and_play(&path) {
            self.loaded = false;
            return Err(PlayerError::Playback {
                path,
                reason: format!("{err:#}"),
            });
        }

        self.loaded = true;
        self.watch = LoadWatch::default();
        self.status = PlaybackStatus::Playing;
        if matches!(self.notice, Some(Notice::PlaybackFailed { .. })) {
            self.notice = None;
        }
        info!(track = %path.display(), index, "playing");

        self.settings.playlist = self.playlist.clone();
        self.settings.song_index = index;
        self.persist();
        Ok(())
    }

    fn load_and_play(&mut self, path: &Path) -> anyhow::Result<()> {
        self.engine.load(path)?;
        self.engine.set_volume(self.settings.volume);
        self.engine.play()
    }

    fn halt_after(&mut self, err: PlayerError) -> PlayerError {
        match err {
            PlayerError::Playback { path, reason } => self.halt_with_failure(path, reason),
            other => {
                self.stop();
                other
            }
        }
    }

    fn halt_with_failure(&mut self, path: PathBuf, reason: String) -> PlayerError {
        self.stop();
        self.notice = Some(Notice::PlaybackFailed {
            path: path.clone(),
            reason: reason.clone(),
        });
        PlayerError::Playback { path, reason }
    }

    fn halt_backend(&mut self, reason: String) {
        self.stop();
        self.recovering = false;
        self.notice = Some(Notice::BackendFailure(reason));
    }

    fn clear_selection(&mut self) {
        self.detached = false;
        self.engine.stop();
        self.status = PlaybackStatus::Stopped;
        self.playlist = None;
        self.current = None;
        self.shuffle_order = None;
        self.loaded = false;
        self.settings.playlist = None;
        self.settings.song_index = 0;
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.settings) {
            warn!("failed to persist settings: {err:#}");
        }
    }
}
