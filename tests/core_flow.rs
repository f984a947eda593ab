use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;
use tunebar::audio::NullAudioEngine;
use tunebar::config::ConfigStore;
use tunebar::core::{PlayerController, TickOutcome};
use tunebar::library;
use tunebar::model::{PlaybackStatus, Settings};

fn write_test_wav(path: &Path, duration_ms: u32) {
    let sample_rate: u32 = 8_000;
    let total_samples = sample_rate * duration_ms / 1_000;
    let data_size = total_samples * 2;

    let mut bytes = Vec::with_capacity((44 + data_size) as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2_u16.to_le_bytes());
    bytes.extend_from_slice(&16_u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());
    bytes.resize((44 + data_size) as usize, 0);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, bytes).expect("wav fixture should be written");
}

#[test]
fn selection_survives_a_restart() {
    let music = tempdir().expect("music dir");
    let config = tempdir().expect("config dir");
    for name in ["a.wav", "b.wav", "c.wav"] {
        write_test_wav(&music.path().join("Rock/Classic").join(name), 50);
    }
    write_test_wav(&music.path().join("Jazz/d.wav"), 50);

    let store = ConfigStore::in_dir(config.path());
    let mut first = PlayerController::new(
        NullAudioEngine::new(),
        store.clone(),
        library::scan(music.path()),
    );
    assert_eq!(first.current_playlist(), Some("Jazz"));

    first.select_playlist("Rock/Classic");
    first.play_track_at_index(2).expect("play");
    first.set_shuffle(false);
    first.shutdown().expect("shutdown");

    let second = PlayerController::new(NullAudioEngine::new(), store, library::scan(music.path()));
    assert_eq!(second.current_playlist(), Some("Rock/Classic"));
    assert_eq!(second.current_index(), Some(2));
    assert!(!second.shuffle());
    assert_eq!(second.status(), PlaybackStatus::Stopped);
}

#[test]
fn finished_tracks_advance_one_at_a_time() {
    let music = tempdir().expect("music dir");
    let config = tempdir().expect("config dir");
    for name in ["1.wav", "2.wav", "3.wav"] {
        write_test_wav(&music.path().join("Mix").join(name), 40);
    }

    let settings = Settings {
        shuffle: false,
        ..Settings::default()
    };
    let mut controller = PlayerController::with_settings(
        NullAudioEngine::new(),
        ConfigStore::in_dir(config.path()),
        settings,
        library::scan(music.path()),
    );
    controller.play_track_at_index(0).expect("play");

    let mut advanced = Vec::new();
    for _ in 0..40 {
        thread::sleep(Duration::from_millis(15));
        if controller.monitor_tick() == TickOutcome::Advanced {
            advanced.push(controller.current_index().expect("index"));
        }
        if advanced.len() == 3 {
            break;
        }
    }

    assert_eq!(advanced, vec![1, 2, 0]);
    assert_eq!(controller.status(), PlaybackStatus::Playing);
}

#[test]
fn rescan_picks_up_new_files_without_interrupting() {
    let music = tempdir().expect("music dir");
    let config = tempdir().expect("config dir");
    write_test_wav(&music.path().join("Set/b.wav"), 50);

    let mut controller = PlayerController::new(
        NullAudioEngine::new(),
        ConfigStore::in_dir(config.path()),
        library::scan(music.path()),
    );
    controller.play_track_at_index(0).expect("play");

    write_test_wav(&music.path().join("Set/a.wav"), 50);
    write_test_wav(&music.path().join("Other/x.wav"), 50);
    let playlists = controller.rescan(music.path());

    assert_eq!(playlists, 2);
    assert_eq!(controller.status(), PlaybackStatus::Playing);
    assert_eq!(controller.current_index(), Some(1));
    assert_eq!(
        controller.current_track().map(|track| track.file_stem()),
        Some(String::from("b"))
    );
}

#[test]
fn corrupt_settings_fall_back_to_defaults() {
    let music = tempdir().expect("music dir");
    let config = tempdir().expect("config dir");
    write_test_wav(&music.path().join("Only/a.wav"), 50);
    fs::write(config.path().join("settings.json"), b"not json at all").expect("write");

    let controller = PlayerController::new(
        NullAudioEngine::new(),
        ConfigStore::in_dir(config.path()),
        library::scan(music.path()),
    );

    assert_eq!(controller.volume(), 80);
    assert!(controller.shuffle());
    assert_eq!(controller.current_playlist(), Some("Only"));
}
