use crate::model::{Catalog, Playlist, Track, file_stem_title};
use lofty::file::TaggedFileExt;
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "m4a", "ogg"];

/// Folders `D` and `D/S` under `root` become playlists; nothing deeper is read.
pub fn scan(root: &Path) -> Catalog {
    let mut catalog = Catalog::new();
    if !root.is_dir() {
        debug!(root = %root.display(), "music root missing, nothing to scan");
        return catalog;
    }

    for top in child_entries(root).filter(is_dir) {
        let top_name = entry_name(&top);
        catalog.insert(Playlist::new(top_name.clone(), audio_files_in(top.path())));

        for sub in child_entries(top.path()).filter(is_dir) {
            let name = format!("{top_name}/{}", entry_name(&sub));
            catalog.insert(Playlist::new(name, audio_files_in(sub.path())));
        }
    }

    debug!(
        root = %root.display(),
        playlists = catalog.len(),
        "scan finished"
    );
    catalog
}

pub fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

pub fn title_for_path(path: &Path) -> String {
    symphonia_title(path)
        .or_else(|| lofty_title(path))
        .unwrap_or_else(|| file_stem_title(path))
}

fn audio_files_in(dir: &Path) -> Vec<Track> {
    child_entries(dir)
        .filter(|entry| {
            entry.file_type().is_file() && !is_hidden(entry) && is_audio(entry.path())
        })
        .map(|entry| Track::new(entry.into_path()))
        .collect()
}

fn child_entries(dir: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by(|a, b| compare_names(a.file_name(), b.file_name()))
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                None
            }
        })
}

fn compare_names(a: &OsStr, b: &OsStr) -> Ordering {
    let left = a.to_string_lossy();
    let right = b.to_string_lossy();
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(&right))
}

fn is_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && !is_hidden(entry)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn entry_name(entry: &DirEntry) -> String {
    entry.file_name().to_string_lossy().to_string()
}

fn symphonia_title(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    let mut probed = get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let from_container = probed.format.metadata().current().and_then(|revision| {
        revision
            .tags()
            .iter()
            .find(|tag| tag.std_key == Some(StandardTagKey::TrackTitle))
            .and_then(|tag| clean_title(&tag.value.to_string()))
    });

    from_container.or_else(|| {
        let revision = probed.metadata.get()?;
        let revision = revision.current()?;
        revision
            .tags()
            .iter()
            .find(|tag| tag.std_key == Some(StandardTagKey::TrackTitle))
            .and_then(|tag| clean_title(&tag.value.to_string()))
    })
}

fn lofty_title(path: &Path) -> Option<String> {
    let tagged_file = Probe::open(path).ok()?.read().ok()?;
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())?;
    tag.title().and_then(|title| clean_title(&title))
}

fn clean_title(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, b"x").expect("write fixture");
    }

    fn stems(catalog: &Catalog, name: &str) -> Vec<String> {
        catalog
            .get(name)
            .map(|playlist| playlist.tracks.iter().map(Track::file_stem).collect())
            .unwrap_or_default()
    }

    #[test]
    fn two_level_layout_becomes_named_playlists() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("Rock/Classic/a.mp3"));
        touch(&root.join("Rock/Classic/b.mp3"));
        touch(&root.join("Rock/Modern/c.mp3"));
        touch(&root.join("Jazz/d.mp3"));

        let catalog = scan(root);

        assert_eq!(
            catalog.names(),
            vec![
                String::from("Jazz"),
                String::from("Rock/Classic"),
                String::from("Rock/Modern"),
            ]
        );
        assert_eq!(stems(&catalog, "Rock/Classic"), vec!["a", "b"]);
        assert_eq!(stems(&catalog, "Rock/Modern"), vec!["c"]);
        assert_eq!(stems(&catalog, "Jazz"), vec!["d"]);
        assert!(!catalog.contains("Rock"));
    }

    #[test]
    fn missing_root_is_an_empty_catalog() {
        let dir = tempdir().expect("tempdir");
        let catalog = scan(&dir.path().join("nope"));
        assert!(catalog.is_empty());
    }

    #[test]
    fn deeper_folders_and_loose_root_files_are_ignored() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("loose.mp3"));
        touch(&root.join("A/B/C/deep.mp3"));
        touch(&root.join("A/top.ogg"));

        let catalog = scan(root);

        assert_eq!(catalog.names(), vec![String::from("A")]);
        assert_eq!(stems(&catalog, "A"), vec!["top"]);
    }

    #[test]
    fn extensions_match_case_insensitively_and_filter_others() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("Mix/one.MP3"));
        touch(&root.join("Mix/two.Flac"));
        touch(&root.join("Mix/three.m4a"));
        touch(&root.join("Mix/cover.jpg"));
        touch(&root.join("Mix/notes.txt"));
        touch(&root.join("Mix/.hidden.mp3"));
        touch(&root.join("Docs/readme.txt"));

        let catalog = scan(root);

        assert_eq!(catalog.names(), vec![String::from("Mix")]);
        assert_eq!(stems(&catalog, "Mix"), vec!["one", "three", "two"]);
    }

    #[test]
    fn order_is_case_insensitive_and_stable_across_scans() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        for name in ["beta.mp3", "Alpha.mp3", "charlie.wav", "Bravo.aac"] {
            touch(&root.join("Set").join(name));
        }

        let first = scan(root);
        let second = scan(root);

        assert_eq!(stems(&first, "Set"), vec!["Alpha", "beta", "Bravo", "charlie"]);
        assert_eq!(first, second);
    }

    #[test]
    fn title_falls_back_to_file_stem() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("Some Song.mp3");
        touch(&path);
        assert_eq!(title_for_path(&path), "Some Song");
        assert_eq!(
            title_for_path(&PathBuf::from("missing/Gone.flac")),
            "Gone"
        );
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_folder_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("Open/a.mp3"));
        touch(&root.join("Locked/b.mp3"));
        let locked = root.join("Locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        let catalog = scan(root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod back");

        assert!(catalog.contains("Open"));
        // root ignores permission bits, so only check the readable folder survived
        assert_eq!(stems(&catalog, "Open"), vec!["a"]);
    }
}
