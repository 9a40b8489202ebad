// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use serde::{Deserialize, Serialize};

/// Flip applied by the `videoflip` stage ahead of scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flip {
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Flip {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flip::None => "none",
            Flip::Horizontal => "h",
            Flip::Vertical => "v",
            Flip::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "h" => Flip::Horizontal,
            "v" => Flip::Vertical,
            "both" => Flip::Both,
            _ => Flip::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTransform {
    pub flip: Flip,
    /// Degrees, one of 0/90/180/270.
    pub rotation: u16,
}

impl Default for VideoTransform {
    fn default() -> Self {
        Self { flip: Flip::None, rotation: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtzDescriptor {
    pub kind: String,
    pub port: u16,
    pub channel: u8,
}

/// A single camera's persisted identity and behavior. Identity is `camera_id`;
/// uniqueness is enforced by the configuration store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub camera_id: String,
    pub name: String,
    pub rtsp_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: bool,
    pub streaming_on_start: bool,
    pub recording_on_start: bool,
    pub ptz: Option<PtzDescriptor>,
    pub video_transform: Option<VideoTransform>,
    pub display_order: u32,
}

impl CameraSpec {
    pub fn new(camera_id: impl Into<String>, name: impl Into<String>, rtsp_url: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            name: name.into(),
            rtsp_url: rtsp_url.into(),
            username: None,
            password: None,
            enabled: true,
            streaming_on_start: true,
            recording_on_start: false,
            ptz: None,
            video_transform: None,
            display_order: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsdOptions {
    pub show_name: bool,
    pub show_timestamp: bool,
    pub font: String,
    pub color: String,
    pub alignment: String,
    pub padding: u32,
}

impl Default for OsdOptions {
    fn default() -> Self {
        Self {
            show_name: true,
            show_timestamp: true,
            font: "Sans, 18".to_string(),
            color: "white".to_string(),
            alignment: "top-left".to_string(),
            padding: 8,
        }
    }
}

/// Singleton settings shared by every camera's streaming branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingSettings {
    pub decoder_preference: Vec<String>,
    pub hardware_accel: bool,
    pub rtsp_latency_ms: u32,
    pub tcp_timeout_ms: u32,
    pub keepalive_interval_s: u32,
    pub connection_timeout_s: u32,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_s: u64,
    pub osd: OsdOptions,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            decoder_preference: vec![
                "nvh264dec".to_string(),
                "vaapih264dec".to_string(),
                "avdec_h264".to_string(),
            ],
            hardware_accel: true,
            rtsp_latency_ms: 200,
            tcp_timeout_ms: 5_000,
            keepalive_interval_s: 5,
            connection_timeout_s: 10,
            auto_reconnect: true,
            max_reconnect_attempts: 10,
            reconnect_base_delay_s: 5,
            osd: OsdOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    Mkv,
    Mp4,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Mkv => "mkv",
            FileFormat::Mp4 => "mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Mkv => "mkv",
            FileFormat::Mp4 => "mp4",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "mp4" => FileFormat::Mp4,
            _ => FileFormat::Mkv,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub file_format: FileFormat,
    /// Rotation target, minutes, >= 1.
    pub rotation_minutes: u32,
    pub codec: String,
    pub fragment_duration_ms: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            file_format: FileFormat::Mkv,
            rotation_minutes: 10,
            codec: "h264".to_string(),
            fragment_duration_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupPriority {
    OldestFirst,
    LargestFirst,
}

impl CleanupPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupPriority::OldestFirst => "oldest_first",
            CleanupPriority::LargestFirst => "largest_first",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "largest_first" => CleanupPriority::LargestFirst,
            _ => CleanupPriority::OldestFirst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub recording_path: String,
    pub auto_cleanup: bool,
    pub cleanup_interval_hours: u32,
    pub cleanup_on_startup: bool,
    pub min_free_space_gb: f64,
    pub min_free_space_pct: u32,
    pub cleanup_threshold_pct: u32,
    pub retention_days: u32,
    pub delete_batch_size: u32,
    pub delete_batch_delay_s: u32,
    /// Only `OldestFirst` is honored; `LargestFirst` is accepted but not
    /// implemented by the cleanup hook (reflects current behavior).
    pub cleanup_priority: CleanupPriority,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            recording_path: "./recordings".to_string(),
            auto_cleanup: true,
            cleanup_interval_hours: 6,
            cleanup_on_startup: false,
            min_free_space_gb: 2.0,
            min_free_space_pct: 5,
            cleanup_threshold_pct: 10,
            retention_days: 30,
            delete_batch_size: 50,
            delete_batch_delay_s: 1,
            cleanup_priority: CleanupPriority::OldestFirst,
        }
    }
}

/// Ephemeral per-camera pipeline state, not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    Error,
}

/// Ephemeral per-camera recording state, not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingState {
    Idle,
    Recording,
    PausedStorageError,
    PausedDiskFull,
}
