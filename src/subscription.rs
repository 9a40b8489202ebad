// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The engine's only publisher boundary to the outside world. Replaces the
//! source's scattered callback lists mutated from many call sites with a
//! single registry: subscribers register via a stable handle and can
//! unregister; the engine is the only thing that ever calls `publish_*`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Reason attached to a `storage-state` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageReason {
    Ok,
    UsbDisconnected,
    PermissionDenied,
    LowSpace,
}

/// Events published on the engine's event loop. Subscribers must not block.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConnectionState { camera_id: String, up: bool },
    RecordingState { camera_id: String, recording: bool },
    StorageState { scope: String, ok: bool, reason: StorageReason },
    ConnectionError { camera_id: String },
    RecordingError { camera_id: String },
}

pub type Callback = Box<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

#[derive(Default)]
struct LastKnown {
    connection: HashMap<String, bool>,
    recording: HashMap<String, bool>,
    storage: Option<(String, bool, StorageReason)>,
}

/// Publish/subscribe fan-out. One instance is owned by the engine; camera
/// components never hold subscriber lists of their own.
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionHandle, Callback)>>,
    last_known: RwLock<LastKnown>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
            last_known: RwLock::new(LastKnown::default()),
        }
    }

    /// Registers a subscriber. Per the "subscribe before start" ordering
    /// guarantee, callers must register before invoking any supervisor
    /// lifecycle method; the registry does not enforce this itself.
    pub fn subscribe(&self, callback: Callback) -> SubscriptionHandle {
        let id = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.write().push((id, callback));
        id
    }

    /// Registers a subscriber and immediately replays the last known state
    /// of every camera to it — the safety net for a subscriber that
    /// registers after the first real event already fired.
    pub fn subscribe_with_replay(&self, callback: Callback) -> SubscriptionHandle {
        let handle = self.subscribe(callback);
        self.replay(handle);
        handle
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.write().retain(|(id, _)| *id != handle);
    }

    fn replay(&self, handle: SubscriptionHandle) {
        let last_known = self.last_known.read();
        let subscribers = self.subscribers.read();
        let Some((_, callback)) = subscribers.iter().find(|(id, _)| *id == handle) else {
            return;
        };
        for (camera_id, up) in last_known.connection.iter() {
            callback(&Event::ConnectionState { camera_id: camera_id.clone(), up: *up });
        }
        for (camera_id, recording) in last_known.recording.iter() {
            callback(&Event::RecordingState { camera_id: camera_id.clone(), recording: *recording });
        }
        if let Some((scope, ok, reason)) = &last_known.storage {
            callback(&Event::StorageState { scope: scope.clone(), ok: *ok, reason: *reason });
        }
    }

    fn publish(&self, event: Event) {
        for (_, callback) in self.subscribers.read().iter() {
            callback(&event);
        }
    }

    pub fn publish_connection_state(&self, camera_id: &str, up: bool) {
        self.last_known.write().connection.insert(camera_id.to_string(), up);
        self.publish(Event::ConnectionState { camera_id: camera_id.to_string(), up });
    }

    pub fn publish_recording_state(&self, camera_id: &str, recording: bool) {
        self.last_known.write().recording.insert(camera_id.to_string(), recording);
        self.publish(Event::RecordingState { camera_id: camera_id.to_string(), recording });
    }

    pub fn publish_storage_state(&self, scope: &str, ok: bool, reason: StorageReason) {
        self.last_known.write().storage = Some((scope.to_string(), ok, reason));
        self.publish(Event::StorageState { scope: scope.to_string(), ok, reason });
    }

    pub fn publish_connection_error(&self, camera_id: &str) {
        self.publish(Event::ConnectionError { camera_id: camera_id.to_string() });
    }

    pub fn publish_recording_error(&self, camera_id: &str) {
        self.publish(Event::RecordingError { camera_id: camera_id.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn replay_delivers_last_known_state_only_to_new_subscriber() {
        let registry = SubscriptionRegistry::new();
        registry.publish_connection_state("cam_01", true);
        registry.publish_recording_state("cam_01", true);

        let received = Arc::new(RwLock::new(Vec::new()));
        let received2 = received.clone();
        registry.subscribe_with_replay(Box::new(move |event| {
            received2.write().push(event.clone());
        }));

        let events = received.read();
        assert!(events.iter().any(|e| matches!(e, Event::ConnectionState { up: true, .. })));
        assert!(events.iter().any(|e| matches!(e, Event::RecordingState { recording: true, .. })));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = SubscriptionRegistry::new();
        let count = Arc::new(RwLock::new(0));
        let count2 = count.clone();
        let handle = registry.subscribe(Box::new(move |_| {
            *count2.write() += 1;
        }));
        registry.publish_connection_state("cam_01", true);
        registry.unsubscribe(handle);
        registry.publish_connection_state("cam_01", false);
        assert_eq!(*count.read(), 1);
    }

    #[test]
    fn all_subscribers_see_events_in_the_same_order() {
        let registry = SubscriptionRegistry::new();
        let a = Arc::new(RwLock::new(Vec::new()));
        let b = Arc::new(RwLock::new(Vec::new()));
        let (a2, b2) = (a.clone(), b.clone());
        registry.subscribe(Box::new(move |e| a2.write().push(e.clone())));
        registry.subscribe(Box::new(move |e| b2.write().push(e.clone())));

        registry.publish_connection_state("cam_01", true);
        registry.publish_recording_state("cam_01", true);
        registry.publish_connection_state("cam_01", false);

        assert_eq!(*a.read(), *b.read());
    }
}
