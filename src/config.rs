use crate::model::Settings;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const APP_DIR: &str = "tunebar";
const SETTINGS_FILE: &str = "settings.json";

pub fn config_root() -> PathBuf {
    if let Ok(override_dir) = env::var("TUNEBAR_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{APP_DIR}")))
}

pub fn default_music_root() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .unwrap_or_else(|| PathBuf::from("Music"))
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Settings::default();
        }

        match self.read() {
            Ok(settings) => settings.sanitized(),
            Err(err) => {
                warn!("ignoring settings file: {err:#}");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let json = serde_json::to_string_pretty(settings)?;
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to stage settings in {}", dir.display()))?;
        staged.write_all(json.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn read(&self) -> Result<Settings> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read settings file {}", self.path.display()))?;
        let document: Map<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", self.path.display()))?;
        Ok(merge_keys(document))
    }
}

// A bad value only costs its own key; the rest of the document is kept.
fn merge_keys(document: Map<String, Value>) -> Settings {
    let mut accepted = Map::new();
    for (key, value) in document {
        accepted.insert(key.clone(), value);
        if serde_json::from_value::<Settings>(Value::Object(accepted.clone())).is_err() {
            warn!(key = %key, "ignoring invalid settings value");
            accepted.remove(&key);
        }
    }
    serde_json::from_value(Value::Object(accepted)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());

        let settings = Settings {
            volume: 35,
            shuffle: false,
            pinned: false,
            x: -20,
            y: 40,
            width: 820,
            height: 44,
            bg_color: String::from("#101010"),
            btn_color: String::from("#202020"),
            font_color: String::from("#EEEEEE"),
            playlist: Some(String::from("Rock/Classic")),
            song_index: 3,
            show_titlebar: false,
            opacity: 70,
            resizable: false,
        };
        store.save(&settings).expect("save");

        assert_eq!(store.load(), settings);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(&dir.path().join("nested"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());
        fs::write(store.path(), b"{ volume: nope").expect("write junk");
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn partial_document_keeps_defaults_and_ignores_unknown_keys() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());
        fs::write(
            store.path(),
            br#"{"volume": 40, "playlist": "Jazz", "song_index": 2, "theme": "dark"}"#,
        )
        .expect("write partial");

        let loaded = store.load();
        assert_eq!(loaded.volume, 40);
        assert_eq!(loaded.playlist.as_deref(), Some("Jazz"));
        assert_eq!(loaded.song_index, 2);
        assert!(loaded.shuffle);
        assert_eq!(loaded.width, 600);
    }

    #[test]
    fn out_of_range_levels_are_clamped() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());
        fs::write(store.path(), br#"{"volume": 180, "opacity": 255}"#).expect("write");

        let loaded = store.load();
        assert_eq!(loaded.volume, 100);
        assert_eq!(loaded.opacity, 100);
    }

    #[test]
    fn oversized_volume_keeps_the_rest_of_the_document() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());
        fs::write(
            store.path(),
            br#"{"volume": 300, "playlist": "Jazz", "song_index": 2, "shuffle": false}"#,
        )
        .expect("write");

        let loaded = store.load();
        assert_eq!(loaded.volume, 100);
        assert_eq!(loaded.playlist.as_deref(), Some("Jazz"));
        assert_eq!(loaded.song_index, 2);
        assert!(!loaded.shuffle);
    }

    #[test]
    fn negative_index_reads_as_zero() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());
        fs::write(
            store.path(),
            br#"{"volume": 20, "song_index": -1, "playlist": "Rock/Classic"}"#,
        )
        .expect("write");

        let loaded = store.load();
        assert_eq!(loaded.volume, 20);
        assert_eq!(loaded.song_index, 0);
        assert_eq!(loaded.playlist.as_deref(), Some("Rock/Classic"));
    }

    #[test]
    fn wrongly_typed_key_falls_back_alone() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());
        fs::write(
            store.path(),
            br#"{"shuffle": "yes", "width": 1.5, "volume": 55, "playlist": "Jazz"}"#,
        )
        .expect("write");

        let loaded = store.load();
        assert!(loaded.shuffle);
        assert_eq!(loaded.width, 600);
        assert_eq!(loaded.volume, 55);
        assert_eq!(loaded.playlist.as_deref(), Some("Jazz"));
    }

    #[test]
    fn save_replaces_previous_document_without_leftovers() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());

        store.save(&Settings::default()).expect("first save");
        let updated = Settings {
            volume: 10,
            ..Settings::default()
        };
        store.save(&updated).expect("second save");

        assert_eq!(store.load().volume, 10);
        let entries = fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(entries, 1, "staging files must not be left behind");
    }

    #[test]
    fn absent_playlist_is_not_written() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::in_dir(dir.path());
        store.save(&Settings::default()).expect("save");

        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(!raw.contains("\"playlist\""));
        assert!(raw.contains("\"song_index\""));
    }
}
