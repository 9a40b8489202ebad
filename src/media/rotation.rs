// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Computes `splitmuxsink`'s `format-location` target. The source caught
//! exceptions raised from inside this callback (typically a missing
//! directory mid-eject) and logged them; here the callback returns a
//! `Result` instead, and the caller lifts an `Err` into `STORAGE_DISCONNECTED`
//! (§4.6) rather than relying on unwinding.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Local};

use crate::config::model::FileFormat;
use crate::error::{NvrError, Result};

/// Produces `{recording_root}/{camera_id}/{YYYYMMDD}/{camera_id}_{YYYYMMDD_HHMMSS}.{ext}`
/// paths for one camera, guaranteeing strict monotonicity within a session
/// (I5/P2): two splits landing in the same wall-clock second still get
/// distinct, increasing filenames.
pub struct RotationNamer {
    recording_root: PathBuf,
    camera_id: String,
    file_format: FileFormat,
    last_timestamp: Mutex<Option<DateTime<Local>>>,
}

impl RotationNamer {
    pub fn new(recording_root: impl Into<PathBuf>, camera_id: impl Into<String>, file_format: FileFormat) -> Self {
        Self {
            recording_root: recording_root.into(),
            camera_id: camera_id.into(),
            file_format,
            last_timestamp: Mutex::new(None),
        }
    }

    /// Invoked once per fragment boundary. Creates the date directory if
    /// absent and returns the next strictly-greater-timestamped path.
    pub fn next_location(&self) -> Result<PathBuf> {
        let mut last = self.last_timestamp.lock().unwrap();
        let mut stamp = Local::now();
        if let Some(prev) = *last {
            if stamp <= prev {
                stamp = prev + ChronoDuration::seconds(1);
            }
        }
        *last = Some(stamp);

        let date_dir = self.recording_root.join(&self.camera_id).join(stamp.format("%Y%m%d").to_string());
        std::fs::create_dir_all(&date_dir).map_err(NvrError::Io)?;

        let filename = format!(
            "{}_{}.{}",
            self.camera_id,
            stamp.format("%Y%m%d_%H%M%S"),
            self.file_format.extension()
        );
        Ok(date_dir.join(filename))
    }

    /// A reconnect always starts a fresh session (I5): the previous file is
    /// finalized and a new one begins, so there's no monotonicity
    /// requirement spanning the gap. Resetting here just avoids an
    /// unbounded clock skew accumulating across long-lived sessions.
    pub fn reset_session(&self) {
        *self.last_timestamp.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_dated_directory_and_filename() {
        let dir = tempfile::tempdir().unwrap();
        let namer = RotationNamer::new(dir.path(), "cam_01", FileFormat::Mkv);
        let path = namer.next_location().unwrap();
        assert!(path.starts_with(dir.path().join("cam_01")));
        assert_eq!(path.extension().unwrap(), "mkv");
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn filenames_are_strictly_monotonic_even_within_the_same_second() {
        let dir = tempfile::tempdir().unwrap();
        let namer = RotationNamer::new(dir.path(), "cam_01", FileFormat::Mkv);
        let first = namer.next_location().unwrap();
        let second = namer.next_location().unwrap();
        let third = namer.next_location().unwrap();
        assert!(second > first);
        assert!(third > second);
    }
}
