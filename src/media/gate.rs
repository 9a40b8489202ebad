// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use gstreamer as gst;
use gstreamer::prelude::*;

/// The four ways the two branch gates can be set together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    StreamingOnly,
    RecordingOnly,
    Both,
    Idle,
}

/// Two independently addressable valves sharing one fan-out point. Closing
/// one never back-pressures the other: the queues feeding each valve are
/// built leaky-downstream by the pipeline factory, so a closed gate just
/// drops buffers instead of stalling upstream.
pub struct BranchGate {
    gate_s: gst::Element,
    gate_r: gst::Element,
}

impl BranchGate {
    pub fn new(gate_s: gst::Element, gate_r: gst::Element) -> Self {
        Self { gate_s, gate_r }
    }

    /// Sets both gates consistently. For `RecordingOnly`/`Both` this only
    /// opens the valve; whether the recorder is actually writing is a
    /// separate concern owned by the recorder (§4.7).
    pub fn apply_mode(&self, mode: GateMode) {
        let (streaming_open, recording_open) = match mode {
            GateMode::StreamingOnly => (true, false),
            GateMode::RecordingOnly => (false, true),
            GateMode::Both => (true, true),
            GateMode::Idle => (false, false),
        };
        Self::set_open(&self.gate_s, streaming_open);
        Self::set_open(&self.gate_r, recording_open);
    }

    /// Idempotent: opening an already-open gate is a no-op observable
    /// effect (the underlying property write is harmless either way).
    pub fn open_recording(&self) {
        Self::set_open(&self.gate_r, true);
    }

    pub fn close_recording(&self) {
        Self::set_open(&self.gate_r, false);
    }

    pub fn is_recording_open(&self) -> bool {
        !self.gate_r.property::<bool>("drop")
    }

    pub fn is_streaming_open(&self) -> bool {
        !self.gate_s.property::<bool>("drop")
    }

    fn set_open(valve: &gst::Element, open: bool) {
        valve.set_property("drop", !open);
    }
}
