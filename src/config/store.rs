// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::ReentrantMutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::config::model::{
    CameraSpec, CleanupPriority, FileFormat, Flip, OsdOptions, PtzDescriptor, RecordingSettings,
    StorageSettings, StreamingSettings, VideoTransform,
};
use crate::error::{NvrError, Result};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS app (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    schema_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS streaming (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    decoder_preference TEXT NOT NULL,
    hardware_accel INTEGER NOT NULL,
    rtsp_latency_ms INTEGER NOT NULL,
    tcp_timeout_ms INTEGER NOT NULL,
    keepalive_interval_s INTEGER NOT NULL,
    connection_timeout_s INTEGER NOT NULL,
    auto_reconnect INTEGER NOT NULL,
    max_reconnect_attempts INTEGER NOT NULL,
    reconnect_base_delay_s INTEGER NOT NULL,
    osd_show_name INTEGER NOT NULL,
    osd_show_timestamp INTEGER NOT NULL,
    osd_font TEXT NOT NULL,
    osd_color TEXT NOT NULL,
    osd_alignment TEXT NOT NULL,
    osd_padding INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS recording (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    file_format TEXT NOT NULL,
    rotation_minutes INTEGER NOT NULL,
    codec TEXT NOT NULL,
    fragment_duration_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS storage (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    recording_path TEXT NOT NULL,
    auto_cleanup INTEGER NOT NULL,
    cleanup_interval_hours INTEGER NOT NULL,
    cleanup_on_startup INTEGER NOT NULL,
    min_free_space_gb REAL NOT NULL,
    min_free_space_pct INTEGER NOT NULL,
    cleanup_threshold_pct INTEGER NOT NULL,
    retention_days INTEGER NOT NULL,
    delete_batch_size INTEGER NOT NULL,
    delete_batch_delay_s INTEGER NOT NULL,
    cleanup_priority TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cameras (
    camera_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    rtsp_url TEXT NOT NULL,
    enabled INTEGER NOT NULL,
    username TEXT,
    password TEXT,
    ptz_type TEXT,
    ptz_port INTEGER,
    ptz_channel INTEGER,
    display_order INTEGER NOT NULL,
    streaming_on_start INTEGER NOT NULL,
    recording_on_start INTEGER NOT NULL,
    video_transform_enabled INTEGER NOT NULL,
    video_transform_flip TEXT NOT NULL,
    video_transform_rotation INTEGER NOT NULL
);

-- Tables owned by the settings editor and other external collaborators.
-- This engine creates them if absent so its own open() never races the
-- editor's schema, but it never reads or writes their contents.
CREATE TABLE IF NOT EXISTS ui (id INTEGER PRIMARY KEY CHECK (id = 0), data TEXT NOT NULL DEFAULT '{}');
CREATE TABLE IF NOT EXISTS backup (id INTEGER PRIMARY KEY CHECK (id = 0), data TEXT NOT NULL DEFAULT '{}');
CREATE TABLE IF NOT EXISTS menu_keys (id INTEGER PRIMARY KEY CHECK (id = 0), data TEXT NOT NULL DEFAULT '{}');
CREATE TABLE IF NOT EXISTS ptz_keys (id INTEGER PRIMARY KEY CHECK (id = 0), data TEXT NOT NULL DEFAULT '{}');
CREATE TABLE IF NOT EXISTS logging (id INTEGER PRIMARY KEY CHECK (id = 0), data TEXT NOT NULL DEFAULT '{}');
CREATE TABLE IF NOT EXISTS performance (id INTEGER PRIMARY KEY CHECK (id = 0), data TEXT NOT NULL DEFAULT '{}');
"#;

/// Shape of the legacy JSON sidecar this store migrates from on first open.
#[derive(Debug, Default, Deserialize, Serialize)]
struct LegacyJson {
    #[serde(default)]
    cameras: Vec<CameraSpec>,
    streaming: Option<StreamingSettings>,
    recording: Option<RecordingSettings>,
    storage: Option<StorageSettings>,
}

/// Durable typed store for camera records and global settings.
///
/// Access is serialized through a process-wide reentrant mutex around the
/// connection, the same discipline the ring-buffer storage layer used for
/// its writer: one logical writer, readers observe a committed snapshot.
pub struct ConfigStore {
    conn: ReentrantMutex<RefCell<Connection>>,
    path: PathBuf,
}

impl ConfigStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path).map_err(|e| NvrError::Store(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| NvrError::Store(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| NvrError::Store(e.to_string()))?;

        let store = Self { conn: ReentrantMutex::new(RefCell::new(conn)), path };
        store.create_schema()?;
        store.migrate_legacy_json()?;
        store.ensure_defaults()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        conn.execute_batch(SCHEMA_SQL).map_err(|e| NvrError::Store(e.to_string()))
    }

    fn legacy_json_path(&self) -> PathBuf {
        let mut os: OsString = self.path.clone().into_os_string();
        os.push(".json");
        PathBuf::from(os)
    }

    fn migrate_legacy_json(&self) -> Result<()> {
        let json_path = self.legacy_json_path();
        if !json_path.exists() {
            return Ok(());
        }

        let existing: i64 = {
            let guard = self.conn.lock();
            let conn = guard.borrow();
            conn.query_row("SELECT COUNT(*) FROM cameras", [], |r| r.get(0))
                .map_err(|e| NvrError::Store(e.to_string()))?
        };
        if existing > 0 {
            return Ok(());
        }

        let raw = fs::read_to_string(&json_path)?;
        let legacy: LegacyJson =
            serde_json::from_str(&raw).map_err(|e| NvrError::Store(format!("legacy config sidecar: {e}")))?;

        tracing::info!(cameras = legacy.cameras.len(), "migrating legacy JSON sidecar into configuration store");

        {
            let guard = self.conn.lock();
            let mut conn = guard.borrow_mut();
            let tx = conn.transaction().map_err(|e| NvrError::Store(e.to_string()))?;
            for cam in &legacy.cameras {
                insert_camera(&tx, cam).map_err(|e| NvrError::Store(e.to_string()))?;
            }
            if let Some(s) = &legacy.streaming {
                write_streaming_settings(&tx, s).map_err(|e| NvrError::Store(e.to_string()))?;
            }
            if let Some(r) = &legacy.recording {
                write_recording_settings(&tx, r).map_err(|e| NvrError::Store(e.to_string()))?;
            }
            if let Some(st) = &legacy.storage {
                write_storage_settings(&tx, st).map_err(|e| NvrError::Store(e.to_string()))?;
            }
            tx.commit().map_err(|e| NvrError::Store(e.to_string()))?;
        }

        let mut backup_name: OsString = json_path.clone().into_os_string();
        backup_name.push(".backup");
        fs::rename(&json_path, PathBuf::from(backup_name))?;
        Ok(())
    }

    fn ensure_defaults(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();

        let app_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM app", [], |r| r.get(0))
            .map_err(|e| NvrError::Store(e.to_string()))?;
        if app_count == 0 {
            conn.execute(
                "INSERT INTO app (id, name, version, schema_version) VALUES (0, 'nvr', ?1, ?2)",
                params![env!("CARGO_PKG_VERSION"), SCHEMA_VERSION],
            )
            .map_err(|e| NvrError::Store(e.to_string()))?;
        }

        let streaming_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM streaming", [], |r| r.get(0))
            .map_err(|e| NvrError::Store(e.to_string()))?;
        if streaming_count == 0 {
            write_streaming_settings(&conn, &StreamingSettings::default())
                .map_err(|e| NvrError::Store(e.to_string()))?;
        }

        let recording_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM recording", [], |r| r.get(0))
            .map_err(|e| NvrError::Store(e.to_string()))?;
        if recording_count == 0 {
            write_recording_settings(&conn, &RecordingSettings::default())
                .map_err(|e| NvrError::Store(e.to_string()))?;
        }

        let storage_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM storage", [], |r| r.get(0))
            .map_err(|e| NvrError::Store(e.to_string()))?;
        if storage_count == 0 {
            write_storage_settings(&conn, &StorageSettings::default())
                .map_err(|e| NvrError::Store(e.to_string()))?;
        }

        for table in ["ui", "backup", "menu_keys", "ptz_keys", "logging", "performance"] {
            let sql = format!("INSERT OR IGNORE INTO {table} (id) VALUES (0)");
            conn.execute(&sql, []).map_err(|e| NvrError::Store(e.to_string()))?;
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_cameras(&self) -> Result<Vec<CameraSpec>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut stmt = conn
            .prepare(
                "SELECT camera_id, name, rtsp_url, enabled, username, password, \
                 ptz_type, ptz_port, ptz_channel, display_order, streaming_on_start, \
                 recording_on_start, video_transform_enabled, video_transform_flip, \
                 video_transform_rotation FROM cameras ORDER BY display_order ASC",
            )
            .map_err(|e| NvrError::Store(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| row_to_camera(row))
            .map_err(|e| NvrError::Store(e.to_string()))?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| NvrError::Store(e.to_string()))?);
        }
        Ok(out)
    }

    /// Commits the full camera list atomically, replacing whatever was
    /// there before. This is the engine's only write path for cameras.
    pub fn save_cameras(&self, cameras: &[CameraSpec]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for cam in cameras {
            if !seen.insert(cam.camera_id.clone()) {
                return Err(NvrError::CameraDuplicate { id: cam.camera_id.clone() });
            }
        }

        let guard = self.conn.lock();
        let mut conn = guard.borrow_mut();
        let tx = conn.transaction().map_err(|e| NvrError::Store(e.to_string()))?;
        tx.execute("DELETE FROM cameras", []).map_err(|e| NvrError::Store(e.to_string()))?;
        for cam in cameras {
            insert_camera(&tx, cam).map_err(|e| NvrError::Store(e.to_string()))?;
        }
        tx.commit().map_err(|e| NvrError::Store(e.to_string()))?;
        Ok(())
    }

    pub fn load_streaming_settings(&self) -> Result<StreamingSettings> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        conn.query_row(
            "SELECT decoder_preference, hardware_accel, rtsp_latency_ms, tcp_timeout_ms, \
             keepalive_interval_s, connection_timeout_s, auto_reconnect, max_reconnect_attempts, \
             reconnect_base_delay_s, osd_show_name, osd_show_timestamp, osd_font, osd_color, \
             osd_alignment, osd_padding FROM streaming WHERE id = 0",
            [],
            |row| {
                let decoder_preference: String = row.get(0)?;
                Ok(StreamingSettings {
                    decoder_preference: decoder_preference
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    hardware_accel: row.get::<_, i64>(1)? != 0,
                    rtsp_latency_ms: row.get::<_, i64>(2)? as u32,
                    tcp_timeout_ms: row.get::<_, i64>(3)? as u32,
                    keepalive_interval_s: row.get::<_, i64>(4)? as u32,
                    connection_timeout_s: row.get::<_, i64>(5)? as u32,
                    auto_reconnect: row.get::<_, i64>(6)? != 0,
                    max_reconnect_attempts: row.get::<_, i64>(7)? as u32,
                    reconnect_base_delay_s: row.get::<_, i64>(8)? as u64,
                    osd: OsdOptions {
                        show_name: row.get::<_, i64>(9)? != 0,
                        show_timestamp: row.get::<_, i64>(10)? != 0,
                        font: row.get(11)?,
                        color: row.get(12)?,
                        alignment: row.get(13)?,
                        padding: row.get::<_, i64>(14)? as u32,
                    },
                })
            },
        )
        .map_err(|e| NvrError::Store(e.to_string()))
    }

    pub fn save_streaming_settings(&self, settings: &StreamingSettings) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        write_streaming_settings(&conn, settings).map_err(|e| NvrError::Store(e.to_string()))
    }

    pub fn load_recording_settings(&self) -> Result<RecordingSettings> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        conn.query_row(
            "SELECT file_format, rotation_minutes, codec, fragment_duration_ms FROM recording WHERE id = 0",
            [],
            |row| {
                let fmt: String = row.get(0)?;
                Ok(RecordingSettings {
                    file_format: FileFormat::parse(&fmt),
                    rotation_minutes: row.get::<_, i64>(1)? as u32,
                    codec: row.get(2)?,
                    fragment_duration_ms: row.get::<_, i64>(3)? as u32,
                })
            },
        )
        .map_err(|e| NvrError::Store(e.to_string()))
    }

    pub fn save_recording_settings(&self, settings: &RecordingSettings) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        write_recording_settings(&conn, settings).map_err(|e| NvrError::Store(e.to_string()))
    }

    pub fn load_storage_settings(&self) -> Result<StorageSettings> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        conn.query_row(
            "SELECT recording_path, auto_cleanup, cleanup_interval_hours, cleanup_on_startup, \
             min_free_space_gb, min_free_space_pct, cleanup_threshold_pct, retention_days, \
             delete_batch_size, delete_batch_delay_s, cleanup_priority FROM storage WHERE id = 0",
            [],
            |row| {
                let priority: String = row.get(10)?;
                Ok(StorageSettings {
                    recording_path: row.get(0)?,
                    auto_cleanup: row.get::<_, i64>(1)? != 0,
                    cleanup_interval_hours: row.get::<_, i64>(2)? as u32,
                    cleanup_on_startup: row.get::<_, i64>(3)? != 0,
                    min_free_space_gb: row.get(4)?,
                    min_free_space_pct: row.get::<_, i64>(5)? as u32,
                    cleanup_threshold_pct: row.get::<_, i64>(6)? as u32,
                    retention_days: row.get::<_, i64>(7)? as u32,
                    delete_batch_size: row.get::<_, i64>(8)? as u32,
                    delete_batch_delay_s: row.get::<_, i64>(9)? as u32,
                    cleanup_priority: CleanupPriority::parse(&priority),
                })
            },
        )
        .map_err(|e| NvrError::Store(e.to_string()))
    }

    pub fn save_storage_settings(&self, settings: &StorageSettings) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        write_storage_settings(&conn, settings).map_err(|e| NvrError::Store(e.to_string()))
    }
}

fn row_to_camera(row: &rusqlite::Row<'_>) -> rusqlite::Result<CameraSpec> {
    let ptz_type: Option<String> = row.get(6)?;
    let ptz = ptz_type.map(|kind| PtzDescriptor {
        kind,
        port: row.get::<_, Option<i64>>(7).unwrap_or(None).unwrap_or(0) as u16,
        channel: row.get::<_, Option<i64>>(8).unwrap_or(None).unwrap_or(0) as u8,
    });

    let video_transform_enabled: i64 = row.get(12)?;
    let video_transform = if video_transform_enabled != 0 {
        let flip_str: String = row.get(13)?;
        Some(VideoTransform {
            flip: Flip::parse(&flip_str),
            rotation: row.get::<_, i64>(14)? as u16,
        })
    } else {
        None
    };

    Ok(CameraSpec {
        camera_id: row.get(0)?,
        name: row.get(1)?,
        rtsp_url: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        username: row.get(4)?,
        password: row.get(5)?,
        ptz,
        video_transform,
        display_order: row.get::<_, i64>(9)? as u32,
        streaming_on_start: row.get::<_, i64>(10)? != 0,
        recording_on_start: row.get::<_, i64>(11)? != 0,
    })
}

fn insert_camera(conn: &Connection, cam: &CameraSpec) -> rusqlite::Result<()> {
    let (ptz_type, ptz_port, ptz_channel) = match &cam.ptz {
        Some(p) => (Some(p.kind.clone()), Some(p.port as i64), Some(p.channel as i64)),
        None => (None, None, None),
    };
    let (vt_enabled, vt_flip, vt_rotation) = match &cam.video_transform {
        Some(vt) => (1i64, vt.flip.as_str().to_string(), vt.rotation as i64),
        None => (0i64, Flip::None.as_str().to_string(), 0i64),
    };

    conn.execute(
        "INSERT INTO cameras (camera_id, name, rtsp_url, enabled, username, password, \
         ptz_type, ptz_port, ptz_channel, display_order, streaming_on_start, recording_on_start, \
         video_transform_enabled, video_transform_flip, video_transform_rotation) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            cam.camera_id,
            cam.name,
            cam.rtsp_url,
            cam.enabled as i64,
            cam.username,
            cam.password,
            ptz_type,
            ptz_port,
            ptz_channel,
            cam.display_order as i64,
            cam.streaming_on_start as i64,
            cam.recording_on_start as i64,
            vt_enabled,
            vt_flip,
            vt_rotation,
        ],
    )?;
    Ok(())
}

fn write_streaming_settings(conn: &Connection, s: &StreamingSettings) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO streaming (id, decoder_preference, hardware_accel, rtsp_latency_ms, \
         tcp_timeout_ms, keepalive_interval_s, connection_timeout_s, auto_reconnect, \
         max_reconnect_attempts, reconnect_base_delay_s, osd_show_name, osd_show_timestamp, \
         osd_font, osd_color, osd_alignment, osd_padding) \
         VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
         ON CONFLICT(id) DO UPDATE SET decoder_preference = excluded.decoder_preference, \
         hardware_accel = excluded.hardware_accel, rtsp_latency_ms = excluded.rtsp_latency_ms, \
         tcp_timeout_ms = excluded.tcp_timeout_ms, keepalive_interval_s = excluded.keepalive_interval_s, \
         connection_timeout_s = excluded.connection_timeout_s, auto_reconnect = excluded.auto_reconnect, \
         max_reconnect_attempts = excluded.max_reconnect_attempts, \
         reconnect_base_delay_s = excluded.reconnect_base_delay_s, osd_show_name = excluded.osd_show_name, \
         osd_show_timestamp = excluded.osd_show_timestamp, osd_font = excluded.osd_font, \
         osd_color = excluded.osd_color, osd_alignment = excluded.osd_alignment, \
         osd_padding = excluded.osd_padding",
        params![
            s.decoder_preference.join(","),
            s.hardware_accel as i64,
            s.rtsp_latency_ms as i64,
            s.tcp_timeout_ms as i64,
            s.keepalive_interval_s as i64,
            s.connection_timeout_s as i64,
            s.auto_reconnect as i64,
            s.max_reconnect_attempts as i64,
            s.reconnect_base_delay_s as i64,
            s.osd.show_name as i64,
            s.osd.show_timestamp as i64,
            s.osd.font,
            s.osd.color,
            s.osd.alignment,
            s.osd.padding as i64,
        ],
    )?;
    Ok(())
}

fn write_recording_settings(conn: &Connection, r: &RecordingSettings) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO recording (id, file_format, rotation_minutes, codec, fragment_duration_ms) \
         VALUES (0, ?1, ?2, ?3, ?4) \
         ON CONFLICT(id) DO UPDATE SET file_format = excluded.file_format, \
         rotation_minutes = excluded.rotation_minutes, codec = excluded.codec, \
         fragment_duration_ms = excluded.fragment_duration_ms",
        params![r.file_format.as_str(), r.rotation_minutes as i64, r.codec, r.fragment_duration_ms as i64],
    )?;
    Ok(())
}

fn write_storage_settings(conn: &Connection, s: &StorageSettings) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO storage (id, recording_path, auto_cleanup, cleanup_interval_hours, \
         cleanup_on_startup, min_free_space_gb, min_free_space_pct, cleanup_threshold_pct, \
         retention_days, delete_batch_size, delete_batch_delay_s, cleanup_priority) \
         VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
         ON CONFLICT(id) DO UPDATE SET recording_path = excluded.recording_path, \
         auto_cleanup = excluded.auto_cleanup, cleanup_interval_hours = excluded.cleanup_interval_hours, \
         cleanup_on_startup = excluded.cleanup_on_startup, min_free_space_gb = excluded.min_free_space_gb, \
         min_free_space_pct = excluded.min_free_space_pct, cleanup_threshold_pct = excluded.cleanup_threshold_pct, \
         retention_days = excluded.retention_days, delete_batch_size = excluded.delete_batch_size, \
         delete_batch_delay_s = excluded.delete_batch_delay_s, cleanup_priority = excluded.cleanup_priority",
        params![
            s.recording_path,
            s.auto_cleanup as i64,
            s.cleanup_interval_hours as i64,
            s.cleanup_on_startup as i64,
            s.min_free_space_gb,
            s.min_free_space_pct as i64,
            s.cleanup_threshold_pct as i64,
            s.retention_days as i64,
            s.delete_batch_size as i64,
            s.delete_batch_delay_s as i64,
            s.cleanup_priority.as_str(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Flip, VideoTransform};

    fn temp_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvr.db");
        (dir, path)
    }

    #[test]
    fn round_trips_camera_spec_with_nested_fields() {
        let (_dir, path) = temp_db();
        let store = ConfigStore::open(&path).unwrap();

        let mut cam = CameraSpec::new("cam_01", "Front Door", "rtsp://192.0.2.1/stream");
        cam.ptz = Some(PtzDescriptor { kind: "onvif".to_string(), port: 80, channel: 1 });
        cam.video_transform = Some(VideoTransform { flip: Flip::Both, rotation: 180 });
        cam.display_order = 3;

        store.save_cameras(&[cam.clone()]).unwrap();
        let loaded = store.load_cameras().unwrap();
        assert_eq!(loaded, vec![cam]);
    }

    #[test]
    fn save_cameras_rejects_duplicate_ids() {
        let (_dir, path) = temp_db();
        let store = ConfigStore::open(&path).unwrap();
        let a = CameraSpec::new("dup", "A", "rtsp://a");
        let b = CameraSpec::new("dup", "B", "rtsp://b");
        assert!(store.save_cameras(&[a, b]).is_err());
    }

    #[test]
    fn default_singletons_are_populated_on_open() {
        let (_dir, path) = temp_db();
        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.load_streaming_settings().unwrap(), StreamingSettings::default());
        assert_eq!(store.load_recording_settings().unwrap(), RecordingSettings::default());
        assert_eq!(store.load_storage_settings().unwrap(), StorageSettings::default());
    }

    #[test]
    fn migrates_legacy_json_sidecar_once() {
        let (_dir, path) = temp_db();
        let mut json_path = path.clone().into_os_string();
        json_path.push(".json");
        let json_path = PathBuf::from(json_path);

        let legacy = LegacyJson {
            cameras: vec![CameraSpec::new("cam_legacy", "Legacy Cam", "rtsp://legacy")],
            streaming: None,
            recording: None,
            storage: None,
        };
        fs::write(&json_path, serde_json::to_string(&legacy).unwrap()).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        let cams = store.load_cameras().unwrap();
        assert_eq!(cams.len(), 1);
        assert_eq!(cams[0].camera_id, "cam_legacy");

        let mut backup_path = json_path.clone().into_os_string();
        backup_path.push(".backup");
        assert!(PathBuf::from(backup_path).exists());
        assert!(!json_path.exists());
    }
}
