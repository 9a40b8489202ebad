// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Polls the recording root every 5s and fans edge-triggered transitions
//! out to every registered recorder (§4.5). Recorders hold only the
//! function references passed to `register`; the watcher never reaches
//! back into a recorder's internals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};

/// Disk-full recovery (§4.3) keeps deleting until at least this much space
/// is free, regardless of the configured minimum.
const DISK_FULL_TARGET_FREE_GB: f64 = 2.0;

/// What the last poll observed. `LowSpace` is treated as `DiskFull` by the
/// fault handlers (§4.5), but the watcher itself keeps the distinct reason
/// so the subscription layer can report it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    Ok,
    UsbDisconnected,
    PermissionDenied,
    LowSpace,
}

impl StorageState {
    pub fn is_ok(&self) -> bool {
        matches!(self, StorageState::Ok)
    }
}

struct Subscriber {
    on_storage_error: Box<dyn Fn(StorageState) + Send + Sync>,
    on_storage_recovered: Box<dyn Fn() + Send + Sync>,
}

pub struct StorageWatcher {
    recording_root: PathBuf,
    min_free_gb: f64,
    min_free_pct: u32,
    retention_days: u32,
    delete_batch_size: u32,
    delete_batch_delay: Duration,
    last_available: Mutex<Option<bool>>,
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl StorageWatcher {
    pub fn new(
        recording_root: impl Into<PathBuf>,
        min_free_gb: f64,
        min_free_pct: u32,
        retention_days: u32,
        delete_batch_size: u32,
        delete_batch_delay_s: u32,
    ) -> Self {
        Self {
            recording_root: recording_root.into(),
            min_free_gb,
            min_free_pct,
            retention_days,
            delete_batch_size,
            delete_batch_delay: Duration::from_secs(delete_batch_delay_s as u64),
            last_available: Mutex::new(None),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        camera_id: impl Into<String>,
        on_storage_error: impl Fn(StorageState) + Send + Sync + 'static,
        on_storage_recovered: impl Fn() + Send + Sync + 'static,
    ) {
        self.subscribers.write().insert(
            camera_id.into(),
            Subscriber { on_storage_error: Box::new(on_storage_error), on_storage_recovered: Box::new(on_storage_recovered) },
        );
    }

    pub fn unregister(&self, camera_id: &str) {
        self.subscribers.write().remove(camera_id);
    }

    /// Runs one poll cycle, notifying subscribers only on a state-edge
    /// (§4.5's "edge-triggered" contract). Returns the observed state so
    /// the caller can log or test against it directly.
    pub fn poll_once(&self) -> StorageState {
        let state = self.check();
        let is_ok = state.is_ok();

        let edge = {
            let mut last = self.last_available.lock();
            let changed = *last != Some(is_ok);
            *last = Some(is_ok);
            changed
        };

        if edge {
            let subscribers = self.subscribers.read();
            if is_ok {
                for sub in subscribers.values() {
                    (sub.on_storage_recovered)();
                }
            } else {
                for sub in subscribers.values() {
                    (sub.on_storage_error)(state);
                }
            }
        }

        state
    }

    fn check(&self) -> StorageState {
        if looks_like_removable_mount(&self.recording_root) && !self.recording_root.exists() {
            return StorageState::UsbDisconnected;
        }

        if !is_writable(&self.recording_root) {
            return StorageState::PermissionDenied;
        }

        match free_space_gb(&self.recording_root) {
            Some(free_gb) => {
                let total_gb = total_space_gb(&self.recording_root).unwrap_or(free_gb);
                let free_pct = if total_gb > 0.0 { (free_gb / total_gb) * 100.0 } else { 100.0 };
                if free_gb < self.min_free_gb || (free_pct as u32) < self.min_free_pct {
                    StorageState::LowSpace
                } else {
                    StorageState::Ok
                }
            }
            None => StorageState::Ok,
        }
    }

    /// Disk-full cleanup hook (§4.3): delete retention-exceeded files first,
    /// then the oldest remaining files in batches, until at least
    /// `DISK_FULL_TARGET_FREE_GB` is free or nothing is left to delete.
    /// Returns whether the target was reached, so the caller knows whether
    /// to auto-resume or surface a user-visible error.
    pub async fn run_disk_full_cleanup(&self) -> bool {
        let files = collect_files(&self.recording_root);
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(self.retention_days as u64 * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let (expired, mut remaining): (Vec<_>, Vec<_>) = files.into_iter().partition(|(_, mtime, _)| *mtime < cutoff);
        for (path, _, _) in &expired {
            let _ = std::fs::remove_file(path);
        }
        if !expired.is_empty() {
            tracing::info!(root = %self.recording_root.display(), deleted = expired.len(), "removed retention-exceeded recordings");
        }

        if free_space_gb(&self.recording_root).unwrap_or(0.0) >= DISK_FULL_TARGET_FREE_GB {
            return true;
        }

        remaining.sort_by_key(|(_, mtime, _)| *mtime);
        let batch_size = self.delete_batch_size.max(1) as usize;
        let mut rest = remaining.as_slice();
        while !rest.is_empty() {
            let take = batch_size.min(rest.len());
            let (batch, tail) = rest.split_at(take);
            for (path, _, _) in batch {
                let _ = std::fs::remove_file(path);
            }
            rest = tail;
            if free_space_gb(&self.recording_root).unwrap_or(0.0) >= DISK_FULL_TARGET_FREE_GB {
                return true;
            }
            if !rest.is_empty() {
                tokio::time::sleep(self.delete_batch_delay).await;
            }
        }

        free_space_gb(&self.recording_root).unwrap_or(0.0) >= DISK_FULL_TARGET_FREE_GB
    }

    /// Spawns the 5s-cadence polling task. Returns a handle the caller can
    /// abort on shutdown.
    pub fn spawn(self: std::sync::Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.poll_once();
            }
        })
    }
}

/// Recursively lists every regular file under `root` with its mtime and
/// size. Unreadable subtrees are skipped rather than failing the sweep.
fn collect_files(root: &Path) -> Vec<(PathBuf, SystemTime, u64)> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            if meta.is_dir() {
                stack.push(path);
            } else if meta.is_file() {
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                out.push((path, mtime, meta.len()));
            }
        }
    }
    out
}

/// A conventional external-volume prefix, e.g. `/media/{user}/{label}`.
fn looks_like_removable_mount(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "media")
}

fn is_writable(path: &Path) -> bool {
    if std::fs::create_dir_all(path).is_err() {
        return false;
    }
    let probe = path.join(".nvr-storage-probe");
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(unix)]
fn free_space_gb(path: &Path) -> Option<f64> {
    statvfs_stats(path).map(|(free_bytes, _)| free_bytes as f64 / 1_073_741_824.0)
}

#[cfg(unix)]
fn total_space_gb(path: &Path) -> Option<f64> {
    statvfs_stats(path).map(|(_, total_bytes)| total_bytes as f64 / 1_073_741_824.0)
}

#[cfg(unix)]
fn statvfs_stats(path: &Path) -> Option<(u64, u64)> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let stat = unsafe { stat.assume_init() };
    let free = stat.f_bavail as u64 * stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * stat.f_frsize as u64;
    Some((free, total))
}

#[cfg(not(unix))]
fn free_space_gb(_path: &Path) -> Option<f64> {
    None
}

#[cfg(not(unix))]
fn total_space_gb(_path: &Path) -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn notifies_only_on_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = StorageWatcher::new(dir.path(), 0.0, 0, 30, 50, 1);

        let errors = Arc::new(AtomicU32::new(0));
        let recoveries = Arc::new(AtomicU32::new(0));
        let (e2, r2) = (errors.clone(), recoveries.clone());
        watcher.register(
            "cam_01",
            move |_reason| {
                e2.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                r2.fetch_add(1, Ordering::SeqCst);
            },
        );

        // First poll against a healthy tempdir: edge from "unknown" to ok.
        assert_eq!(watcher.poll_once(), StorageState::Ok);
        assert_eq!(recoveries.load(Ordering::SeqCst), 1);

        // Repeated healthy polls: no further notification.
        watcher.poll_once();
        watcher.poll_once();
        assert_eq!(recoveries.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_removable_mount_is_usb_disconnected() {
        let missing = PathBuf::from("/media/someone/NONEXISTENT_NVR_TEST_LABEL");
        let watcher = StorageWatcher::new(&missing, 0.0, 0, 30, 50, 1);
        assert_eq!(watcher.poll_once(), StorageState::UsbDisconnected);
    }

    #[test]
    fn unregister_stops_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = StorageWatcher::new(dir.path(), 0.0, 0, 30, 50, 1);
        let count = Arc::new(AtomicU32::new(0));
        let c2 = count.clone();
        watcher.register("cam_01", move |_| {}, move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        watcher.unregister("cam_01");
        watcher.poll_once();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
