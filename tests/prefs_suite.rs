use std::fs;

use bass_cube::prefs::{AppPrefs, PrefsError};

#[test]
fn prefs_round_trip_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("prefs.txt");
    let prefs = AppPrefs {
        preset: Some("p3".to_string()),
        volume: 0.35,
    };
    prefs.save(Some(path.as_path())).expect("save prefs");

    let loaded = AppPrefs::load(Some(path.as_path())).expect("load prefs");
    assert_eq!(loaded.preset.as_deref(), Some("p3"));
    assert!((loaded.volume - 0.35).abs() < 1e-6);
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let loaded = AppPrefs::load(Some(dir.path().join("absent.txt").as_path())).expect("defaults");
    assert_eq!(loaded, AppPrefs::default());
    assert_eq!(AppPrefs::load(None).expect("no path"), AppPrefs::default());
}

#[test]
fn unknown_keys_and_comments_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("prefs.txt");
    fs::write(&path, "# note\n\ntheme=dark\nvolume=0.5\n").expect("write");
    let loaded = AppPrefs::load(Some(path.as_path())).expect("load");
    assert_eq!(loaded.volume, 0.5);
    assert_eq!(loaded.preset, None);
}

#[test]
fn bad_volume_reports_its_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("prefs.txt");
    fs::write(&path, "preset=p1\nvolume=loud\n").expect("write");
    match AppPrefs::load(Some(path.as_path())) {
        Err(PrefsError::Parse { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected parse error, got {other:?}"),
    }

    fs::write(&path, "volume=1.5\n").expect("write");
    assert!(AppPrefs::load(Some(path.as_path())).is_err());
}

#[test]
fn line_without_separator_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("prefs.txt");
    fs::write(&path, "volume 0.4\n").expect("write");
    assert!(matches!(
        AppPrefs::load(Some(path.as_path())),
        Err(PrefsError::Parse { line: 1, .. })
    ));
}
