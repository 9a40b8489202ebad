// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Closed error taxonomy and the pure classification rule behind it (§4.3).
//! The bus watch installed by the pipeline factory extracts a `Signal` from
//! each `gst::Message` and hands it here; keeping the extraction and the
//! classification separate means the priority rules can be unit tested
//! without booting GStreamer at all.

/// The only fault kinds the recovery controller knows about. Anything that
/// doesn't match a rule below is `Unknown` and is treated as fatal for the
/// pipeline (logged, then stopped) rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RtspNetwork,
    StorageDisconnected,
    DiskFull,
    Decoder,
    VideoSink,
    Unknown,
}

/// What the bus watch observed about one error/warning message, already
/// reduced to the flags the classifier's priority ladder cares about.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signal<'a> {
    /// `GST_RESOURCE_ERROR_NOT_FOUND` only — an unambiguous "couldn't
    /// resolve the resource", typically the RTSP source.
    pub resource_not_found: bool,
    /// `GST_RESOURCE_ERROR_NO_SPACE_LEFT` at a sink.
    pub no_space_left: bool,
    /// `GST_RESOURCE_ERROR_WRITE`/`OPEN_WRITE`/`OPEN_READ`/`READ` — an open
    /// or I/O failure that could come from either the source or a sink;
    /// paired with `permission_denied`/`missing_fd` or the emitter name to
    /// disambiguate.
    pub write_error: bool,
    pub permission_denied: bool,
    pub missing_fd: bool,
    /// `GST_STREAM_ERROR_DECODE` (or `_FAILED`/`_FORMAT`) at a decoder.
    pub stream_error: bool,
    pub emitter: Option<&'a str>,
    pub message: &'a str,
}

/// Classifies one bus signal per §4.3's three-tier priority rule: domain +
/// code first, emitter element name second, message substring last.
pub fn classify(signal: &Signal<'_>) -> ErrorKind {
    if signal.resource_not_found {
        return ErrorKind::RtspNetwork;
    }
    if signal.no_space_left {
        return ErrorKind::DiskFull;
    }
    if signal.write_error && (signal.permission_denied || signal.missing_fd) {
        return ErrorKind::StorageDisconnected;
    }
    if signal.stream_error {
        return ErrorKind::Decoder;
    }

    match signal.emitter {
        Some("source") => return ErrorKind::RtspNetwork,
        Some("split_mux") => return ErrorKind::StorageDisconnected,
        Some(name) if name.starts_with("decoder") => return ErrorKind::Decoder,
        Some("video_sink") | Some("sink") => return ErrorKind::VideoSink,
        _ => {}
    }

    let msg = signal.message;
    if msg.contains("space") || msg.contains("No space") {
        return ErrorKind::DiskFull;
    }
    if msg.contains("Permission denied") {
        return ErrorKind::StorageDisconnected;
    }
    if msg.contains("Output window") {
        return ErrorKind::VideoSink;
    }

    ErrorKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base<'a>() -> Signal<'a> {
        Signal { message: "", ..Default::default() }
    }

    #[test]
    fn resource_not_found_is_rtsp_network_regardless_of_emitter() {
        let sig = Signal { resource_not_found: true, emitter: Some("sink"), ..base() };
        assert_eq!(classify(&sig), ErrorKind::RtspNetwork);
    }

    #[test]
    fn no_space_left_is_disk_full() {
        let sig = Signal { no_space_left: true, ..base() };
        assert_eq!(classify(&sig), ErrorKind::DiskFull);
    }

    #[test]
    fn write_error_with_permission_denied_is_storage_disconnected() {
        let sig = Signal { write_error: true, permission_denied: true, ..base() };
        assert_eq!(classify(&sig), ErrorKind::StorageDisconnected);
    }

    #[test]
    fn write_error_without_cause_falls_through_to_emitter_rule() {
        let sig = Signal { write_error: true, emitter: Some("split_mux"), ..base() };
        assert_eq!(classify(&sig), ErrorKind::StorageDisconnected);
    }

    #[test]
    fn stream_error_is_decoder() {
        let sig = Signal { stream_error: true, emitter: Some("video_sink"), ..base() };
        assert_eq!(classify(&sig), ErrorKind::Decoder);
    }

    #[test]
    fn emitter_name_breaks_ties_when_domain_is_ambiguous() {
        let sig = Signal { emitter: Some("source"), ..base() };
        assert_eq!(classify(&sig), ErrorKind::RtspNetwork);

        let sig = Signal { emitter: Some("decoder0"), ..base() };
        assert_eq!(classify(&sig), ErrorKind::Decoder);
    }

    #[test]
    fn message_substrings_are_the_last_resort() {
        let sig = Signal { message: "write failed: No space left on device", ..base() };
        assert_eq!(classify(&sig), ErrorKind::DiskFull);

        let sig = Signal { message: "open failed: Permission denied", ..base() };
        assert_eq!(classify(&sig), ErrorKind::StorageDisconnected);

        let sig = Signal { message: "Could not create Output window", ..base() };
        assert_eq!(classify(&sig), ErrorKind::VideoSink);
    }

    #[test]
    fn unrecognized_signal_is_unknown() {
        let sig = Signal { message: "something else entirely", ..base() };
        assert_eq!(classify(&sig), ErrorKind::Unknown);
    }
}
