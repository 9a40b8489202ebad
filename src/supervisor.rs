// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Owns one camera's pipeline lifecycle end to end: build, connect,
//! reconnect on fault with exponential backoff, and recording resumption
//! across both kinds of interruption (§4.2/§4.8). Everything that touches
//! GStreamer directly lives in `media::factory`; this module only holds
//! the state machine and the timers around it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use parking_lot::Mutex;

use crate::config::model::{CameraSpec, PipelineState, RecordingSettings, StreamingSettings};
use crate::fault::ErrorKind;
use crate::liveness::{spawn_deadline_checker, FrameProbe};
use crate::media::adapter::MediaAdapter;
use crate::media::factory::{build_pipeline, PipelineCallbacks, PipelineHandle};
use crate::media::gate::GateMode;
use crate::recorder::{Recorder, RecordingBranch, StopReason};
use crate::storage_watcher::{StorageState, StorageWatcher};
use crate::subscription::SubscriptionRegistry;

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);
/// Gives the pipeline a moment to settle into steady `PLAYING` state
/// before a previously-recording camera is told to resume (§9 open
/// question: not configurable, fixed at a conservative value).
const POST_CONNECT_STABILIZATION: Duration = Duration::from_secs(1);

struct GateBranch {
    gate: Arc<crate::media::gate::BranchGate>,
    split_mux: gst::Element,
}

impl RecordingBranch for GateBranch {
    fn open(&self) {
        self.gate.open_recording();
    }
    fn close(&self) {
        self.gate.close_recording();
    }
    fn request_split(&self) {
        self.split_mux.emit_by_name::<()>("split-now", &[]);
    }
}

/// Per-camera supervisor. One instance per configured camera, held by the
/// engine for the camera's lifetime.
pub struct CameraStreamSupervisor {
    camera_id: String,
    adapter: Arc<dyn MediaAdapter>,
    camera: Mutex<CameraSpec>,
    streaming_settings: Mutex<StreamingSettings>,
    recording_settings: Mutex<RecordingSettings>,
    recording_root: PathBuf,
    registry: Arc<SubscriptionRegistry>,
    storage_watcher: Arc<StorageWatcher>,
    scheduler: crate::scheduler::Scheduler,
    handle: Mutex<Option<PipelineHandle>>,
    recorder: Mutex<Option<Arc<Recorder>>>,
    pipeline_state: Mutex<PipelineState>,
    attempt: AtomicU32,
    was_recording: AtomicBool,
    shutting_down: AtomicBool,
}

impl CameraStreamSupervisor {
    pub fn new(
        adapter: Arc<dyn MediaAdapter>,
        camera: CameraSpec,
        streaming_settings: StreamingSettings,
        recording_settings: RecordingSettings,
        recording_root: impl Into<PathBuf>,
        registry: Arc<SubscriptionRegistry>,
        storage_watcher: Arc<StorageWatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            camera_id: camera.camera_id.clone(),
            adapter,
            camera: Mutex::new(camera),
            streaming_settings: Mutex::new(streaming_settings),
            recording_settings: Mutex::new(recording_settings),
            recording_root: recording_root.into(),
            registry,
            storage_watcher,
            scheduler: crate::scheduler::Scheduler::new(),
            handle: Mutex::new(None),
            recorder: Mutex::new(None),
            pipeline_state: Mutex::new(PipelineState::Idle),
            attempt: AtomicU32::new(0),
            was_recording: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn pipeline_state(&self) -> PipelineState {
        *self.pipeline_state.lock()
    }

    pub fn recording_state(&self) -> Option<crate::config::model::RecordingState> {
        self.recorder.lock().as_ref().map(|r| r.state())
    }

    /// Connects, building and starting the pipeline. Idempotent: a no-op
    /// if already connecting or streaming.
    pub fn start_streaming(self: &Arc<Self>) {
        {
            let state = self.pipeline_state.lock();
            if matches!(*state, PipelineState::Connecting | PipelineState::Streaming) {
                return;
            }
        }
        self.shutting_down.store(false, Ordering::SeqCst);
        self.connect();
    }

    /// Tears the pipeline down and marks the camera idle. If it was
    /// recording, that is stopped first (`StopReason::User`) so no
    /// auto-resume is attempted later.
    pub fn stop_streaming(self: &Arc<Self>) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.scheduler.cancel_all();
        self.storage_watcher.unregister(&self.camera_id);

        if let Some(recorder) = self.recorder.lock().take() {
            let this = self.clone();
            tokio::spawn(async move {
                recorder.stop(StopReason::User).await;
                let _ = this;
            });
        }
        if let Some(handle) = self.handle.lock().take() {
            handle.teardown();
        }
        *self.pipeline_state.lock() = PipelineState::Idle;
        self.registry.publish_connection_state(&self.camera_id, false);
    }

    pub fn start_recording(self: &Arc<Self>) {
        if let Some(recorder) = self.recorder.lock().clone() {
            let this = self.clone();
            tokio::spawn(async move {
                recorder.start().await;
                let _ = this;
            });
        }
    }

    pub fn stop_recording(self: &Arc<Self>) {
        if let Some(recorder) = self.recorder.lock().clone() {
            tokio::spawn(async move {
                recorder.stop(StopReason::User).await;
            });
        }
    }

    fn connect(self: &Arc<Self>) {
        *self.pipeline_state.lock() = PipelineState::Connecting;
        self.registry.publish_connection_state(&self.camera_id, false);

        let camera = self.camera.lock().clone();
        let streaming = self.streaming_settings.lock().clone();
        let recording = self.recording_settings.lock().clone();

        let frame_probe = Arc::new(FrameProbe::new(LIVENESS_TIMEOUT));

        let this_fault = self.clone();
        let on_fault: Arc<dyn Fn(ErrorKind, String) + Send + Sync> =
            Arc::new(move |kind, message| this_fault.handle_fault(kind, message));

        let this_playing = self.clone();
        let on_playing: Arc<dyn Fn() + Send + Sync> = Arc::new(move || this_playing.on_pipeline_playing());

        let callbacks = PipelineCallbacks { on_fault: on_fault.clone(), on_playing };

        let built = build_pipeline(
            self.adapter.as_ref(),
            &camera,
            &streaming,
            &recording,
            &self.recording_root,
            frame_probe.clone(),
            callbacks,
        );

        let handle = match built {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(camera_id = %self.camera_id, error = %e, "pipeline build failed");
                self.schedule_reconnect();
                return;
            }
        };

        if let Err(e) = handle.pipeline.set_state(gst::State::Playing) {
            tracing::error!(camera_id = %self.camera_id, error = %e, "failed to set pipeline to Playing");
            handle.teardown();
            self.schedule_reconnect();
            return;
        }

        let gate_branch = Arc::new(GateBranch { gate: handle.gate.clone(), split_mux: handle.split_mux.clone() });
        let playing_flag = handle.playing.clone();
        let this_storage = self.clone();
        let validate_storage: Arc<dyn Fn() -> bool + Send + Sync> =
            Arc::new(move || this_storage.storage_watcher.poll_once() == StorageState::Ok);
        let recorder = Recorder::new(
            self.camera_id.clone(),
            gate_branch,
            self.registry.clone(),
            playing_flag,
            validate_storage,
        );

        let checker_fault = on_fault.clone();
        let _deadline = spawn_deadline_checker(frame_probe, LIVENESS_CHECK_INTERVAL, move || {
            checker_fault(ErrorKind::RtspNetwork, "no frames received within liveness timeout".to_string());
        });

        let this_storage_cb = self.clone();
        let recorder_for_error = recorder.clone();
        let recorder_for_recovery = recorder.clone();
        self.storage_watcher.register(
            self.camera_id.clone(),
            move |_reason| {
                let _ = &this_storage_cb;
                recorder_for_error.on_storage_error();
            },
            move || {
                recorder_for_recovery.on_storage_recovered();
            },
        );

        *self.recorder.lock() = Some(recorder);
        *self.handle.lock() = Some(handle);
    }

    /// Invoked from the bus watch when the pipeline reaches `PLAYING`.
    /// Re-asserts gate state (I2: reconnects never silently change a
    /// camera's streaming/recording intent) and, after a short
    /// stabilization window, resumes recording if it was active before
    /// the interruption.
    fn on_pipeline_playing(self: &Arc<Self>) {
        self.attempt.store(0, Ordering::SeqCst);
        *self.pipeline_state.lock() = PipelineState::Streaming;
        self.registry.publish_connection_state(&self.camera_id, true);
        tracing::info!(camera_id = %self.camera_id, "pipeline playing");

        let camera = self.camera.lock().clone();
        if let Some(handle) = self.handle.lock().as_ref() {
            let mode = match (camera.streaming_on_start, camera.recording_on_start) {
                (true, true) => GateMode::Both,
                (true, false) => GateMode::StreamingOnly,
                (false, true) => GateMode::RecordingOnly,
                (false, false) => GateMode::Idle,
            };
            handle.gate.apply_mode(mode);
        }

        // Resume either because a fault interrupted an in-progress recording
        // (`was_recording`) or because this is the camera's first connect
        // and it's configured to record on start — both cases wait out the
        // same stabilization window before engaging the recorder.
        let resume_recording = self.was_recording.swap(false, Ordering::SeqCst) || camera.recording_on_start;
        if resume_recording {
            let this = self.clone();
            self.scheduler.after(POST_CONNECT_STABILIZATION, move || async move {
                this.start_recording();
            });
        }
    }

    /// Dispatches one classified bus fault (§4.3). Storage-related kinds
    /// are routed to the recorder directly since the pipeline itself (and
    /// the streaming branch) is unaffected; everything else tears the
    /// pipeline down and schedules a reconnect.
    fn handle_fault(self: &Arc<Self>, kind: ErrorKind, message: String) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!(camera_id = %self.camera_id, ?kind, %message, "pipeline fault");

        match kind {
            ErrorKind::StorageDisconnected => {
                if let Some(recorder) = self.recorder.lock().clone() {
                    recorder.on_storage_error();
                }
            }
            ErrorKind::DiskFull => {
                if let Some(recorder) = self.recorder.lock().clone() {
                    let storage_watcher = self.storage_watcher.clone();
                    let camera_id = self.camera_id.clone();
                    tokio::spawn(async move {
                        recorder.stop(StopReason::DiskFull).await;
                        if storage_watcher.run_disk_full_cleanup().await {
                            recorder.mark_should_auto_resume_and_retry();
                        } else {
                            tracing::error!(camera_id = %camera_id, "disk-full cleanup did not free enough space");
                            recorder.report_unrecoverable_disk_full();
                        }
                    });
                }
            }
            ErrorKind::RtspNetwork | ErrorKind::Decoder | ErrorKind::VideoSink | ErrorKind::Unknown => {
                self.was_recording.store(
                    self.recorder.lock().as_ref().map(|r| r.state() == crate::config::model::RecordingState::Recording).unwrap_or(false),
                    Ordering::SeqCst,
                );
                if let Some(handle) = self.handle.lock().take() {
                    handle.teardown();
                }
                self.recorder.lock().take();
                self.storage_watcher.unregister(&self.camera_id);
                *self.pipeline_state.lock() = PipelineState::Reconnecting;
                self.schedule_reconnect();
            }
        }
    }

    /// `delay = min(base * 2^(attempt-1), 60s)` for 1-indexed attempt
    /// number (§4.8): the first reconnect waits `base` seconds, the second
    /// `2*base`, and so on. Gives up past `max_reconnect_attempts`,
    /// publishing a connection error instead of retrying forever.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let streaming = self.streaming_settings.lock().clone();
        if !streaming.auto_reconnect {
            *self.pipeline_state.lock() = PipelineState::Error;
            self.registry.publish_connection_error(&self.camera_id);
            return;
        }

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > streaming.max_reconnect_attempts {
            tracing::error!(camera_id = %self.camera_id, attempt, "reconnect attempts exhausted");
            *self.pipeline_state.lock() = PipelineState::Error;
            self.registry.publish_connection_error(&self.camera_id);
            return;
        }

        let base = streaming.reconnect_base_delay_s;
        let delay_s = base.saturating_mul(1u64 << (attempt - 1).min(16)).min(60);
        tracing::info!(camera_id = %self.camera_id, attempt, delay_s, "scheduling reconnect");

        let this = self.clone();
        self.scheduler.after(Duration::from_secs(delay_s), move || async move {
            this.connect();
        });
    }

    /// Replaces the persisted camera/settings snapshot used by the next
    /// `connect()`. Does not itself reconnect; the caller decides whether
    /// a running pipeline needs to be restarted for the change to apply.
    pub fn update_camera(&self, camera: CameraSpec) {
        *self.camera.lock() = camera;
    }

    pub fn update_streaming_settings(&self, settings: StreamingSettings) {
        *self.streaming_settings.lock() = settings;
    }

    pub fn update_recording_settings(&self, settings: RecordingSettings) {
        *self.recording_settings.lock() = settings;
    }
}
