// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Frame-arrival probe plus an optional RTSP keep-alive, both feeding the
//! same "treat silence as `RTSP_NETWORK`" path. Bus-reported transport
//! breakage can lag tens of seconds; these catch a silent stall in 2-5s.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Updated from a `PadProbeType::BUFFER` probe on the parser's source pad.
/// The probe callback only ever calls `note_frame`: one clock read, one
/// atomic store, no allocation, no lock.
pub struct FrameProbe {
    epoch: Instant,
    last_frame_nanos: AtomicU64,
    timeout: Duration,
    suspended: AtomicBool,
}

impl FrameProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_frame_nanos: AtomicU64::new(0),
            timeout,
            suspended: AtomicBool::new(true),
        }
    }

    pub fn note_frame(&self) {
        let elapsed = self.epoch.elapsed().as_nanos() as u64;
        self.last_frame_nanos.store(elapsed, Ordering::Relaxed);
    }

    /// Starts (or restarts) the deadline check. Called when the pipeline
    /// reaches `PLAYING`.
    pub fn resume(&self) {
        self.note_frame();
        self.suspended.store(false, Ordering::Relaxed);
    }

    /// Suspended while the pipeline is not playing, per §4.4.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Relaxed);
    }

    pub fn is_timed_out(&self) -> bool {
        if self.suspended.load(Ordering::Relaxed) {
            return false;
        }
        let last = Duration::from_nanos(self.last_frame_nanos.load(Ordering::Relaxed));
        let now = self.epoch.elapsed();
        now.saturating_sub(last) > self.timeout
    }
}

/// Runs the periodic deadline check on the tokio runtime's timer. On the
/// first observed timeout, invokes `on_timeout` once and stops checking
/// (the supervisor is expected to tear the pipeline down and, on rebuild,
/// call `resume()` on a fresh or reset probe).
pub fn spawn_deadline_checker(
    probe: Arc<FrameProbe>,
    check_interval: Duration,
    on_timeout: impl Fn() + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval);
        loop {
            ticker.tick().await;
            if probe.is_timed_out() {
                probe.suspend();
                on_timeout();
                break;
            }
        }
    })
}

/// Optional secondary line of defense: emits an RTSP keep-alive on an
/// interval and expects a response within a parallel timeout. Wired
/// through the same `note_response`/`is_timed_out` shape as `FrameProbe`
/// so the supervisor treats both uniformly.
pub struct KeepAlive {
    epoch: Instant,
    last_response_nanos: AtomicU64,
    timeout: Duration,
    enabled: AtomicBool,
}

impl KeepAlive {
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_response_nanos: AtomicU64::new(0),
            timeout,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn note_response(&self) {
        let elapsed = self.epoch.elapsed().as_nanos() as u64;
        self.last_response_nanos.store(elapsed, Ordering::Relaxed);
    }

    pub fn enable(&self) {
        self.note_response();
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_timed_out(&self) -> bool {
        if !self.enabled.load(Ordering::Relaxed) {
            return false;
        }
        let last = Duration::from_nanos(self.last_response_nanos.load(Ordering::Relaxed));
        let now = self.epoch.elapsed();
        now.saturating_sub(last) > self.timeout
    }
}

/// Runs the keep-alive send/check loop: every `interval`, `send_keepalive`
/// is invoked; if no `note_response` call lands within `keepalive.timeout`,
/// `on_timeout` fires once and the loop stops, same contract as the frame
/// probe's deadline checker.
pub fn spawn_keepalive_loop(
    keepalive: Arc<KeepAlive>,
    interval: Duration,
    send_keepalive: impl Fn() + Send + 'static,
    on_timeout: impl Fn() + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            send_keepalive();
            tokio::time::sleep(keepalive.timeout).await;
            if keepalive.is_timed_out() {
                keepalive.disable();
                on_timeout();
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_probe_never_times_out() {
        let probe = FrameProbe::new(Duration::from_millis(10));
        assert!(!probe.is_timed_out());
    }

    #[tokio::test]
    async fn boundary_before_timeout_does_not_trip() {
        let probe = FrameProbe::new(Duration::from_millis(100));
        probe.resume();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(!probe.is_timed_out());
    }

    #[tokio::test]
    async fn boundary_after_timeout_trips() {
        let probe = FrameProbe::new(Duration::from_millis(100));
        probe.resume();
        tokio::time::sleep(Duration::from_millis(130)).await;
        assert!(probe.is_timed_out());
    }

    #[tokio::test]
    async fn deadline_checker_fires_once_and_stops() {
        use std::sync::atomic::AtomicU32;
        let probe = Arc::new(FrameProbe::new(Duration::from_millis(30)));
        probe.resume();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        let handle = spawn_deadline_checker(probe, Duration::from_millis(10), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
