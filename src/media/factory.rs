// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Builds the per-camera element graph (§4.1):
//!
//! ```text
//! rtspsrc -> depay -> h264parse -> tee -+-> q_s -> gate_s -> decoder -> convert
//!                                       |          -> videoflip -> overlay -> scale -> caps -> video_sink
//!                                       +-> q_r -> gate_r -> parse_r -> splitmuxsink
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gstreamer as gst;
use gstreamer::glib::ControlFlow;
use gstreamer::prelude::*;
use gstreamer::MessageView;

use crate::config::model::{CameraSpec, FileFormat, Flip, RecordingSettings, StreamingSettings};
use crate::error::{NvrError, Result};
use crate::fault::{classify, ErrorKind, Signal};
use crate::liveness::FrameProbe;
use crate::media::adapter::MediaAdapter;
use crate::media::gate::BranchGate;
use crate::media::rotation::RotationNamer;

/// Everything the supervisor needs to drive and tear down a built pipeline.
pub struct PipelineHandle {
    pub pipeline: gst::Pipeline,
    pub gate: Arc<BranchGate>,
    pub split_mux: gst::Element,
    pub rotation_namer: Arc<RotationNamer>,
    /// Set while the pipeline is in `PLAYING`; `Recorder::start` consults
    /// this before opening the recording gate.
    pub playing: Arc<AtomicBool>,
    _bus_watch: gst::bus::BusWatchGuard,
}

impl PipelineHandle {
    /// Tears the pipeline down. Idempotent.
    pub fn teardown(&self) {
        self.playing.store(false, Ordering::SeqCst);
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(error = %e, "error setting pipeline to Null during teardown");
        }
    }
}

/// Callbacks the factory's bus watch and pad probe drive. Supervisor-owned
/// state (the fault detector's dispatch, the gate's re-assertion policy)
/// lives behind these so the factory itself stays a pure graph builder.
pub struct PipelineCallbacks {
    pub on_fault: Arc<dyn Fn(ErrorKind, String) + Send + Sync>,
    /// Invoked every time the pipeline reaches `PLAYING` — the fault
    /// detector re-applies gate state here (I2).
    pub on_playing: Arc<dyn Fn() + Send + Sync>,
}

pub fn build_pipeline<A: MediaAdapter>(
    adapter: &A,
    camera: &CameraSpec,
    streaming: &StreamingSettings,
    recording: &RecordingSettings,
    recording_root: &Path,
    frame_probe: Arc<FrameProbe>,
    callbacks: PipelineCallbacks,
) -> Result<PipelineHandle> {
    adapter.init()?;

    let pipeline = gst::Pipeline::new();

    let source = adapter.make_element("rtspsrc", "source", "source")?;
    source.set_property("location", &camera.rtsp_url);
    source.set_property_from_str("protocols", "tcp");
    source.set_property("latency", streaming.rtsp_latency_ms);
    source.set_property("tcp-timeout", (streaming.tcp_timeout_ms as u64) * 1_000);
    source.set_property("timeout", (streaming.connection_timeout_s as u64) * 1_000_000);
    source.set_property("retry", 5u32);
    source.set_property("do-rtsp-keep-alive", true);
    if let Some(user) = &camera.username {
        source.set_property("user-id", user);
    }
    if let Some(pass) = &camera.password {
        source.set_property("user-pw", pass);
    }

    let depay = adapter.make_element("rtph264depay", "depay", "depay")?;
    let parse = adapter.make_element("h264parse", "parse", "parse")?;
    parse.set_property("config-interval", 1i32);

    let tee = adapter.make_element("tee", "tee", "tee")?;
    tee.set_property("allow-not-linked", true);

    pipeline
        .add_many([&source, &depay, &parse, &tee])
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "assemble-source".into(), cause: e.to_string() })?;
    gst::Element::link_many([&depay, &parse, &tee])
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "link-source".into(), cause: e.to_string() })?;

    let depay_sink = depay.static_pad("sink").expect("rtph264depay has a sink pad");
    let fault_for_pad_added = callbacks.on_fault.clone();
    source.connect_pad_added(move |_src, src_pad| {
        if depay_sink.is_linked() {
            return;
        }
        if let Err(e) = src_pad.link(&depay_sink) {
            tracing::error!(error = %e, "failed to link rtspsrc pad to depayloader");
            fault_for_pad_added(ErrorKind::RtspNetwork, format!("dynamic pad link failed: {e}"));
        }
    });

    // Frame-arrival probe (§4.4): the liveness monitor's only touchpoint.
    let parse_src = parse.static_pad("src").expect("h264parse has a src pad");
    let probe_handle = frame_probe.clone();
    parse_src.add_probe(gst::PadProbeType::BUFFER, move |_pad, _info| {
        probe_handle.note_frame();
        gst::PadProbeReturn::Ok
    });

    let (gate, split_mux) = build_branches(adapter, &pipeline, &tee, camera, streaming, recording)?;

    let rotation_namer = Arc::new(RotationNamer::new(recording_root, camera.camera_id.clone(), recording.file_format));
    wire_format_location(&split_mux, rotation_namer.clone(), callbacks.on_fault.clone());

    let playing = Arc::new(AtomicBool::new(false));
    let bus_watch = install_bus_watch(&pipeline, playing.clone(), frame_probe, callbacks)?;

    Ok(PipelineHandle { pipeline, gate, split_mux, rotation_namer, playing, _bus_watch: bus_watch })
}

fn build_branches<A: MediaAdapter>(
    adapter: &A,
    pipeline: &gst::Pipeline,
    tee: &gst::Element,
    camera: &CameraSpec,
    streaming: &StreamingSettings,
    recording: &RecordingSettings,
) -> Result<(Arc<BranchGate>, gst::Element)> {
    // --- streaming branch ---
    let q_s = adapter.make_element("queue", "q_s", "streaming-queue")?;
    q_s.set_property("max-size-time", 2 * gst::ClockTime::SECOND.nseconds());
    q_s.set_property("max-size-buffers", 10u32);
    q_s.set_property_from_str("leaky", "downstream");

    let gate_s = adapter.make_element("valve", "gate_s", "streaming-gate")?;
    gate_s.set_property("drop", !camera.streaming_on_start);

    let decoder = select_decoder(adapter, streaming)?;
    let convert = adapter.make_element("videoconvert", "convert", "streaming-branch")?;
    let videoflip = adapter.make_element("videoflip", "videoflip", "streaming-branch")?;
    apply_video_transform(&videoflip, camera);

    let overlay = adapter.make_element("textoverlay", "overlay", "streaming-branch")?;
    configure_overlay(&overlay, camera, streaming);

    let scale = adapter.make_element("videoscale", "scale", "streaming-branch")?;
    let caps_filter = adapter.make_element("capsfilter", "caps", "streaming-branch")?;
    let caps = gst::Caps::builder("video/x-raw").field("width", 1280i32).field("height", 720i32).build();
    caps_filter.set_property("caps", &caps);

    let video_sink = adapter.make_element("autovideosink", "video_sink", "video-sink")?;
    video_sink.set_property("sync", false);

    pipeline
        .add_many([&q_s, &gate_s, &decoder, &convert, &videoflip, &overlay, &scale, &caps_filter, &video_sink])
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "assemble-streaming".into(), cause: e.to_string() })?;
    gst::Element::link_many([&q_s, &gate_s, &decoder, &convert, &videoflip, &overlay, &scale, &caps_filter, &video_sink])
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "link-streaming".into(), cause: e.to_string() })?;

    let tee_src_s = tee
        .request_pad_simple("src_%u")
        .ok_or_else(|| NvrError::PipelineBuildFailed { stage: "tee".into(), cause: "could not request streaming tee pad".into() })?;
    let q_s_sink = q_s.static_pad("sink").expect("queue has a sink pad");
    tee_src_s
        .link(&q_s_sink)
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "link-tee-streaming".into(), cause: e.to_string() })?;

    // --- recording branch ---
    let q_r = adapter.make_element("queue", "q_r", "recording-queue")?;
    q_r.set_property("max-size-time", 5 * gst::ClockTime::SECOND.nseconds());
    q_r.set_property("max-size-bytes", 50u32 * 1024 * 1024);
    q_r.set_property_from_str("leaky", "downstream");

    let gate_r = adapter.make_element("valve", "gate_r", "recording-gate")?;
    gate_r.set_property("drop", !camera.recording_on_start);

    let parse_r = adapter.make_element("h264parse", "parse_r", "recording-branch")?;
    parse_r.set_property("config-interval", 1i32);

    let split_mux = adapter.make_element("splitmuxsink", "split_mux", "recording-branch")?;
    split_mux.set_property("max-size-time", (recording.rotation_minutes as u64) * 60 * gst::ClockTime::SECOND.nseconds());
    split_mux.set_property("send-keyframe-requests", true);
    split_mux.set_property("async-finalize", false);
    split_mux.set_property_from_str(
        "muxer-factory",
        match recording.file_format {
            FileFormat::Mkv => "matroskamux",
            FileFormat::Mp4 => "mp4mux",
        },
    );

    pipeline
        .add_many([&q_r, &gate_r, &parse_r, &split_mux])
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "assemble-recording".into(), cause: e.to_string() })?;
    gst::Element::link_many([&q_r, &gate_r, &parse_r, &split_mux])
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "link-recording".into(), cause: e.to_string() })?;

    let tee_src_r = tee
        .request_pad_simple("src_%u")
        .ok_or_else(|| NvrError::PipelineBuildFailed { stage: "tee".into(), cause: "could not request recording tee pad".into() })?;
    let q_r_sink = q_r.static_pad("sink").expect("queue has a sink pad");
    tee_src_r
        .link(&q_r_sink)
        .map_err(|e| NvrError::PipelineBuildFailed { stage: "link-tee-recording".into(), cause: e.to_string() })?;

    Ok((Arc::new(BranchGate::new(gate_s, gate_r)), split_mux))
}

/// Iterates the decoder preference list; the first factory that exists and
/// links is used. Hardware-accelerated names are attempted first when
/// `hardware_accel` is set, software names otherwise skipped to the end.
fn select_decoder<A: MediaAdapter>(adapter: &A, streaming: &StreamingSettings) -> Result<gst::Element> {
    let software_fallback = "avdec_h264";
    let mut candidates: Vec<&str> = streaming.decoder_preference.iter().map(String::as_str).collect();
    if !streaming.hardware_accel {
        candidates.retain(|name| *name == software_fallback || !looks_hardware_accelerated(name));
    }
    if candidates.is_empty() {
        candidates.push(software_fallback);
    }

    for name in &candidates {
        if adapter.has_factory(name) {
            if let Ok(element) = adapter.make_element(name, "decoder", "decoder") {
                return Ok(element);
            }
        }
    }

    Err(NvrError::PipelineBuildFailed {
        stage: "decoder".into(),
        cause: format!("no decoder in preference list could be instantiated: {:?}", streaming.decoder_preference),
    })
}

fn looks_hardware_accelerated(name: &str) -> bool {
    name.starts_with("nv") || name.starts_with("vaapi") || name.starts_with("v4l2") || name.starts_with("qsv")
}

fn apply_video_transform(videoflip: &gst::Element, camera: &CameraSpec) {
    let Some(transform) = &camera.video_transform else {
        return;
    };
    let method = match (transform.flip, transform.rotation) {
        (Flip::None, 0) => "none",
        (Flip::None, 90) => "clockwise",
        (Flip::None, 180) => "rotate-180",
        (Flip::None, 270) => "counterclockwise",
        (Flip::Horizontal, 0) => "horizontal-flip",
        (Flip::Vertical, 0) => "vertical-flip",
        (Flip::Horizontal, 180) | (Flip::Vertical, 180) => "rotate-180",
        (Flip::Both, _) => "rotate-180",
        _ => "none",
    };
    videoflip.set_property_from_str("method", method);
}

fn configure_overlay(overlay: &gst::Element, camera: &CameraSpec, streaming: &StreamingSettings) {
    let osd = &streaming.osd;
    let text = match (osd.show_name, osd.show_timestamp) {
        (true, _) => camera.name.clone(),
        (false, _) => String::new(),
    };
    overlay.set_property("text", &text);
    overlay.set_property("font-desc", &osd.font);
    overlay.set_property_from_str("halignment", alignment_h(&osd.alignment));
    overlay.set_property_from_str("valignment", alignment_v(&osd.alignment));
    if let Some(shaded) = overlay.find_property("shaded-background") {
        let _ = shaded;
        overlay.set_property("shaded-background", true);
    }
    // `show_timestamp` is re-pushed on a 1Hz timer by the supervisor
    // (which owns the clock), not by this one-time setup.
    let _ = osd.show_timestamp;
    overlay.set_property("color", color_to_argb(&osd.color));
}

fn alignment_h(alignment: &str) -> &'static str {
    if alignment.contains("right") {
        "right"
    } else if alignment.contains("center") {
        "center"
    } else {
        "left"
    }
}

fn alignment_v(alignment: &str) -> &'static str {
    if alignment.contains("bottom") {
        "bottom"
    } else if alignment.contains("center") {
        "center"
    } else {
        "top"
    }
}

fn color_to_argb(name: &str) -> u32 {
    match name {
        "white" => 0xFFFFFFFF,
        "black" => 0xFF000000,
        "red" => 0xFFFF0000,
        "yellow" => 0xFFFFFF00,
        _ => 0xFFFFFFFF,
    }
}

fn wire_format_location(
    split_mux: &gst::Element,
    namer: Arc<RotationNamer>,
    on_fault: Arc<dyn Fn(ErrorKind, String) + Send + Sync>,
) {
    split_mux.connect("format-location", false, move |_args| {
        match namer.next_location() {
            Ok(path) => Some(path_to_value(&path)),
            Err(e) => {
                tracing::error!(error = %e, "format-location callback failed, likely a missing recording directory");
                on_fault(ErrorKind::StorageDisconnected, e.to_string());
                Some(path_to_value(&PathBuf::new()))
            }
        }
    });
}

fn path_to_value(path: &Path) -> gstreamer::glib::Value {
    path.to_string_lossy().to_string().to_value()
}

fn install_bus_watch(
    pipeline: &gst::Pipeline,
    playing: Arc<AtomicBool>,
    frame_probe: Arc<FrameProbe>,
    callbacks: PipelineCallbacks,
) -> Result<gst::bus::BusWatchGuard> {
    let bus = pipeline.bus().ok_or_else(|| NvrError::GStreamer("pipeline has no bus".into()))?;
    let PipelineCallbacks { on_fault, on_playing } = callbacks;

    bus.add_watch(move |_bus, msg| {
        match msg.view() {
            MessageView::Error(err) => {
                let emitter = err.src().map(|s| s.name().to_string());
                let message = err.error().to_string();
                let signal = error_to_signal(&err, emitter.as_deref(), &message);
                let kind = classify(&signal);
                tracing::error!(kind = ?kind, ?emitter, %message, "pipeline error");
                on_fault(kind, message);
            }
            MessageView::Warning(w) => {
                let src = w.src().map(|s| s.name().to_string()).unwrap_or_default();
                tracing::warn!(src = %src, error = %w.error(), "pipeline warning");
            }
            MessageView::Eos(_) => {
                tracing::warn!("pipeline reported end-of-stream");
            }
            MessageView::StateChanged(sc) => {
                if sc.src().map(|s| s.type_().is_a(gst::Pipeline::static_type())).unwrap_or(false)
                    && sc.current() == gst::State::Playing
                {
                    playing.store(true, Ordering::SeqCst);
                    frame_probe.resume();
                    on_playing();
                } else if sc.current() != gst::State::Playing
                    && sc.src().map(|s| s.type_().is_a(gst::Pipeline::static_type())).unwrap_or(false)
                {
                    playing.store(false, Ordering::SeqCst);
                }
            }
            MessageView::Buffering(b) => {
                tracing::debug!(percent = b.percent(), "pipeline buffering");
            }
            _ => {}
        }
        ControlFlow::Continue
    })
    .map_err(|e| NvrError::GStreamer(e.to_string()))
}

fn error_to_signal<'a>(err: &gst::message::Error, emitter: Option<&'a str>, message: &'a str) -> Signal<'a> {
    let glib_err = err.error();
    // Only an unambiguous NOT_FOUND counts as "resource not found" — an
    // rtspsrc failing to resolve its URL. OPEN_READ/OPEN_WRITE/READ can just
    // as easily be a sink (splitmuxsink) losing its mount, which must stay
    // within `write_error` so the permission/missing-fd and emitter tiers
    // below can still route it to `STORAGE_DISCONNECTED` instead of tearing
    // the whole pipeline down as `RTSP_NETWORK` (§4.3).
    let resource_not_found = glib_err.matches(gst::ResourceError::NotFound);
    let no_space_left = glib_err.matches(gst::ResourceError::NoSpaceLeft);
    let write_error = glib_err.matches(gst::ResourceError::Write)
        || glib_err.matches(gst::ResourceError::OpenWrite)
        || glib_err.matches(gst::ResourceError::OpenRead)
        || glib_err.matches(gst::ResourceError::Read);
    let stream_error = glib_err.matches(gst::StreamError::Decode)
        || glib_err.matches(gst::StreamError::Format)
        || glib_err.matches(gst::StreamError::Failed);

    let debug = err.debug().unwrap_or_default();
    let permission_denied = debug.contains("Permission denied") || message.contains("Permission denied");
    let missing_fd = debug.contains("Bad file descriptor") || debug.contains("No such file or directory");

    Signal {
        resource_not_found,
        no_space_left,
        write_error,
        permission_denied,
        missing_fd,
        stream_error,
        emitter,
        message,
    }
}
