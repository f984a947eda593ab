#![no_main]

use libfuzzer_sys::fuzz_target;
use tunebar::audio::NullAudioEngine;
use tunebar::config::ConfigStore;
use tunebar::core::PlayerController;
use tunebar::model::{Catalog, Playlist, Track, VolumeChange};

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let len = (data.len() % 32).max(1);
    let catalog: Catalog = ["A", "B"]
        .into_iter()
        .enumerate()
        .map(|(n, name)| {
            Playlist::new(
                name,
                (0..len + n)
                    .map(|idx| Track::new(format!("{name}/track_{idx}.mp3")))
                    .collect(),
            )
        })
        .collect();

    let mut controller = PlayerController::new(
        NullAudioEngine::new(),
        ConfigStore::in_dir(dir.path()),
        catalog,
    )
    .with_seed(len as u64);

    for byte in data {
        match byte % 9 {
            0 => {
                let _ = controller.next();
            }
            1 => {
                let _ = controller.previous();
            }
            2 => {
                let _ = controller.toggle_play_pause();
            }
            3 => controller.set_shuffle(!controller.shuffle()),
            4 => {
                controller.set_volume(VolumeChange::By(i32::from(*byte) - 128));
            }
            5 => {
                controller.select_adjacent_playlist(byte & 0x10 != 0);
            }
            6 => {
                let _ = controller.play_track_at_index(usize::from(*byte >> 3));
            }
            7 => {
                controller.monitor_tick();
            }
            _ => controller.stop(),
        }

        if let (Some(index), Some(name)) =
            (controller.current_index(), controller.current_playlist())
        {
            let playlist_len = controller.catalog().get(name).map_or(0, Playlist::len);
            assert!(index < playlist_len);
        }
        assert!(controller.volume() <= 100);
    }
});
