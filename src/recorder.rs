// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera recording state machine (§4.7), owned 1-to-1 by a
//! supervisor. Talks to the pipeline only through `RecordingBranch`, so
//! the state machine itself is tested with a fake branch rather than a
//! real GStreamer graph.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::model::RecordingState as PersistedRecordingState;
use crate::scheduler::Scheduler;
use crate::subscription::SubscriptionRegistry;

/// What drove a `stop()` call. Determines whether a best-effort clean
/// split is attempted and which paused state (if any) results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    StorageError,
    DiskFull,
}

/// The recorder's view of the splitting muxer and its gate: open/close the
/// valve, and ask the muxer to finalize the current fragment now.
pub trait RecordingBranch: Send + Sync {
    fn open(&self);
    fn close(&self);
    fn request_split(&self);
}

pub struct Recorder {
    camera_id: String,
    branch: Arc<dyn RecordingBranch>,
    registry: Arc<SubscriptionRegistry>,
    pipeline_playing: Arc<AtomicBool>,
    validate_storage: Arc<dyn Fn() -> bool + Send + Sync>,
    scheduler: Scheduler,
    state: Mutex<PersistedRecordingState>,
    should_auto_resume: AtomicBool,
    retry_count: AtomicU32,
    max_retry: u32,
    retry_interval: Duration,
    finalize_wait: Duration,
}

impl Recorder {
    pub fn new(
        camera_id: impl Into<String>,
        branch: Arc<dyn RecordingBranch>,
        registry: Arc<SubscriptionRegistry>,
        pipeline_playing: Arc<AtomicBool>,
        validate_storage: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            camera_id: camera_id.into(),
            branch,
            registry,
            pipeline_playing,
            validate_storage,
            scheduler: Scheduler::new(),
            state: Mutex::new(PersistedRecordingState::Idle),
            should_auto_resume: AtomicBool::new(false),
            retry_count: AtomicU32::new(0),
            max_retry: 20,
            retry_interval: Duration::from_secs(6),
            finalize_wait: Duration::from_millis(500),
        })
    }

    pub fn state(&self) -> PersistedRecordingState {
        *self.state.lock()
    }

    pub fn should_auto_resume(&self) -> bool {
        self.should_auto_resume.load(Ordering::SeqCst)
    }

    /// No-op if already recording. Rejects if the pipeline isn't playing.
    pub async fn start(&self) {
        {
            let state = self.state.lock();
            if *state == PersistedRecordingState::Recording {
                return;
            }
        }
        if !self.pipeline_playing.load(Ordering::SeqCst) {
            tracing::warn!(camera_id = %self.camera_id, "recorder start rejected: pipeline not playing");
            return;
        }
        self.branch.open();
        *self.state.lock() = PersistedRecordingState::Recording;
        self.registry.publish_recording_state(&self.camera_id, true);
        tracing::info!(camera_id = %self.camera_id, "recording started");
    }

    /// No-op if already idle. `reason` decides whether a clean split is
    /// attempted (skipped for `StorageError`, since the sink is
    /// unreachable) and which paused state results.
    pub async fn stop(&self, reason: StopReason) {
        {
            let state = self.state.lock();
            if *state == PersistedRecordingState::Idle {
                return;
            }
        }
        self.branch.close();

        if reason != StopReason::StorageError {
            self.branch.request_split();
            tokio::time::sleep(self.finalize_wait).await;
        }

        let target = match reason {
            StopReason::User => {
                self.should_auto_resume.store(false, Ordering::SeqCst);
                PersistedRecordingState::Idle
            }
            StopReason::StorageError => PersistedRecordingState::PausedStorageError,
            StopReason::DiskFull => PersistedRecordingState::PausedDiskFull,
        };
        *self.state.lock() = target;
        self.registry.publish_recording_state(&self.camera_id, false);
        tracing::info!(camera_id = %self.camera_id, ?reason, "recording stopped");
    }

    /// Bundles stop-for-storage-error, setting the auto-resume flag, and
    /// scheduling the first retry tick (§4.7).
    pub fn on_storage_error(self: &Arc<Self>) {
        let this = self.clone();
        self.should_auto_resume.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            this.stop(StopReason::StorageError).await;
            this.schedule_retry();
        });
    }

    /// No-op unless `should_auto_resume`; then starts and clears the flag.
    /// Short-circuits any pending retry timer, since the watcher's own
    /// edge notification is more immediate than the next retry tick.
    pub fn on_storage_recovered(self: &Arc<Self>) {
        if self.should_auto_resume.swap(false, Ordering::SeqCst) {
            self.scheduler.cancel_all();
            self.retry_count.store(0, Ordering::SeqCst);
            let this = self.clone();
            tokio::spawn(async move {
                this.start().await;
            });
        }
    }

    /// Called by the fault detector after its disk-full cleanup hook
    /// frees enough space (§4.3): marks auto-resume and schedules a retry.
    /// If cleanup did not free enough space, the caller instead publishes
    /// `recording-error` directly and never calls this.
    pub fn mark_should_auto_resume_and_retry(self: &Arc<Self>) {
        self.should_auto_resume.store(true, Ordering::SeqCst);
        self.schedule_retry();
    }

    /// Called when the disk-full cleanup hook couldn't free enough space
    /// (§4.3): surfaces `recording-error` directly rather than arming a
    /// retry, since insufficient cleanup is the user-mediated branch of
    /// disk-full recovery, not an automatic one.
    pub fn report_unrecoverable_disk_full(&self) {
        self.should_auto_resume.store(false, Ordering::SeqCst);
        self.registry.publish_recording_error(&self.camera_id);
    }

    fn schedule_retry(self: &Arc<Self>) {
        let this = self.clone();
        let interval = self.retry_interval;
        self.scheduler.after(interval, move || {
            let this = this.clone();
            async move {
                this.retry_tick().await;
            }
        });
    }

    /// Checked every `retry_interval` while paused for a recoverable
    /// fault: if storage now validates, resumes; otherwise counts the
    /// attempt and gives up past `max_retry`, publishing `recording-error`.
    pub async fn retry_tick(self: &Arc<Self>) {
        if (self.validate_storage)() {
            self.should_auto_resume.store(false, Ordering::SeqCst);
            self.retry_count.store(0, Ordering::SeqCst);
            self.start().await;
            return;
        }

        let attempt = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.max_retry {
            tracing::warn!(camera_id = %self.camera_id, attempt, "recording retries exhausted");
            self.registry.publish_recording_error(&self.camera_id);
            return;
        }
        self.schedule_retry();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as TestCounter;

    #[derive(Default)]
    struct FakeBranch {
        open_calls: TestCounter,
        close_calls: TestCounter,
        split_calls: TestCounter,
    }

    impl RecordingBranch for FakeBranch {
        fn open(&self) {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn request_split(&self) {
            self.split_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_recorder(
        branch: Arc<FakeBranch>,
        playing: bool,
        validates: bool,
    ) -> (Arc<Recorder>, Arc<SubscriptionRegistry>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let recorder = Recorder::new(
            "cam_01",
            branch,
            registry.clone(),
            Arc::new(AtomicBool::new(playing)),
            Arc::new(move || validates),
        );
        (recorder, registry)
    }

    #[tokio::test]
    async fn start_rejected_when_pipeline_not_playing() {
        let branch = Arc::new(FakeBranch::default());
        let (recorder, _registry) = make_recorder(branch.clone(), false, true);
        recorder.start().await;
        assert_eq!(recorder.state(), PersistedRecordingState::Idle);
        assert_eq!(branch.open_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let branch = Arc::new(FakeBranch::default());
        let (recorder, _registry) = make_recorder(branch.clone(), true, true);
        recorder.start().await;
        recorder.start().await;
        assert_eq!(branch.open_calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.state(), PersistedRecordingState::Recording);
    }

    #[tokio::test]
    async fn stop_on_idle_recorder_is_a_silent_no_op() {
        let branch = Arc::new(FakeBranch::default());
        let (recorder, registry) = make_recorder(branch.clone(), true, true);
        let received = Arc::new(Mutex::new(0u32));
        let r2 = received.clone();
        registry.subscribe(Box::new(move |_| *r2.lock() += 1));

        recorder.stop(StopReason::User).await;
        assert_eq!(branch.close_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*received.lock(), 0);
    }

    #[tokio::test]
    async fn storage_error_stop_skips_clean_split() {
        let branch = Arc::new(FakeBranch::default());
        let (recorder, _registry) = make_recorder(branch.clone(), true, true);
        recorder.start().await;
        recorder.stop(StopReason::StorageError).await;
        assert_eq!(branch.split_calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.state(), PersistedRecordingState::PausedStorageError);
    }

    #[tokio::test]
    async fn user_stop_attempts_clean_split_and_clears_auto_resume() {
        let branch = Arc::new(FakeBranch::default());
        let (recorder, _registry) = make_recorder(branch.clone(), true, true);
        recorder.start().await;
        recorder.on_storage_error();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(recorder.should_auto_resume());

        recorder.start().await;
        recorder.stop(StopReason::User).await;
        assert_eq!(branch.split_calls.load(Ordering::SeqCst), 1);
        assert!(!recorder.should_auto_resume());
        assert_eq!(recorder.state(), PersistedRecordingState::Idle);
    }

    #[tokio::test]
    async fn on_storage_recovered_is_a_no_op_without_auto_resume_flag() {
        let branch = Arc::new(FakeBranch::default());
        let (recorder, _registry) = make_recorder(branch.clone(), true, true);
        recorder.on_storage_recovered();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(branch.open_calls.load(Ordering::SeqCst), 0);
    }
}
