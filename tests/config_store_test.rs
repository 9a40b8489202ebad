// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Configuration store integration tests: schema bootstrap, camera CRUD,
//! and settings persistence across a fresh open.
//!
//! Run with: `cargo test`

use nvr::config::{CameraSpec, ConfigStore, RecordingSettings, StorageSettings, StreamingSettings};

fn tmp_db() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("nvr.db");
    (dir, path)
}

#[test]
fn fresh_store_has_no_cameras_and_default_settings() {
    let (_dir, path) = tmp_db();
    let store = ConfigStore::open(&path).expect("open store");

    assert!(store.load_cameras().expect("load cameras").is_empty());
    assert_eq!(store.load_streaming_settings().expect("load streaming"), StreamingSettings::default());
    assert_eq!(store.load_recording_settings().expect("load recording"), RecordingSettings::default());
    assert_eq!(store.load_storage_settings().expect("load storage"), StorageSettings::default());
}

#[test]
fn camera_list_survives_a_reopen() {
    let (_dir, path) = tmp_db();
    {
        let store = ConfigStore::open(&path).expect("open store");
        let cams = vec![
            CameraSpec::new("cam_front", "Front Door", "rtsp://192.0.2.1/stream"),
            CameraSpec::new("cam_back", "Back Yard", "rtsp://192.0.2.2/stream"),
        ];
        store.save_cameras(&cams).expect("save cameras");
    }

    let reopened = ConfigStore::open(&path).expect("reopen store");
    let cams = reopened.load_cameras().expect("load cameras");
    assert_eq!(cams.len(), 2);
    assert!(cams.iter().any(|c| c.camera_id == "cam_front"));
    assert!(cams.iter().any(|c| c.camera_id == "cam_back"));
}

#[test]
fn save_cameras_replaces_the_whole_list_atomically() {
    let (_dir, path) = tmp_db();
    let store = ConfigStore::open(&path).expect("open store");

    store
        .save_cameras(&[CameraSpec::new("cam_a", "A", "rtsp://a")])
        .expect("save first set");
    store
        .save_cameras(&[CameraSpec::new("cam_b", "B", "rtsp://b")])
        .expect("save second set");

    let cams = store.load_cameras().expect("load cameras");
    assert_eq!(cams.len(), 1);
    assert_eq!(cams[0].camera_id, "cam_b");
}

#[test]
fn streaming_settings_round_trip() {
    let (_dir, path) = tmp_db();
    let store = ConfigStore::open(&path).expect("open store");

    let mut settings = StreamingSettings::default();
    settings.hardware_accel = false;
    settings.max_reconnect_attempts = 3;
    settings.decoder_preference = vec!["avdec_h264".to_string()];
    store.save_streaming_settings(&settings).expect("save streaming");

    let loaded = store.load_streaming_settings().expect("load streaming");
    assert_eq!(loaded, settings);
}
