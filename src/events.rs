//! Typed event fan-out for decoded packets and driver diagnostics
//!
//! One category per packet type, two aggregates (wheel state, any sensor
//! data) and two diagnostics (invalid packet, connection lost). Dispatch is
//! synchronous on the notifying thread - the driver's read loop - so handlers
//! must not block; a stalled handler stalls serial ingestion. Within one
//! category, notifications fire in decode order.
//!
//! Dispatch runs over a snapshot of the subscriber list taken before any
//! handler is invoked, so a handler may subscribe or unsubscribe on the same
//! hub. A removal takes effect from the next `notify`.

use crate::kinematics::OdometryState;
use crate::protocol::{PacketKind, PacketRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Subscription category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// One decoded packet of the given category
    Packet(PacketKind),
    /// Encoder-derived odometry was refreshed
    WheelState,
    /// Any sensor packet was decoded
    SensorData,
    /// A frame failed validation and was dropped
    InvalidPacket,
    /// The serial link died mid-session
    ConnectionLost,
}

/// Event payload handed to subscribers
#[derive(Debug, Clone)]
pub enum Event {
    /// A decoded record (fired for its packet category and for `SensorData`)
    Packet(PacketRecord),
    /// Fresh odometry (fired for `WheelState`)
    Wheel(OdometryState),
    /// Raw bytes of a discarded frame (fired for `InvalidPacket`)
    Invalid(Vec<u8>),
    /// Description of the link failure (fired for `ConnectionLost`)
    ConnectionLost(String),
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Callback registry with per-category subscriber lists
pub struct EventHub {
    subscribers: Mutex<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for one category
    ///
    /// Many subscribers per category are allowed. The handler runs on the
    /// notifying thread and must return promptly.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a previously registered handler
    ///
    /// Unknown ids are ignored (the subscription may already be gone).
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscribers.lock();
        for list in subs.values_mut() {
            list.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    /// Synchronously invoke every handler registered for `kind`
    ///
    /// The registry lock is not held while handlers run: dispatch goes over a
    /// snapshot, so handlers are free to call back into the hub.
    pub fn notify(&self, kind: EventKind, event: &Event) {
        let snapshot: Vec<Handler> = {
            let subs = self.subscribers.lock();
            match subs.get(&kind) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        for handler in &snapshot {
            handler(event);
        }
    }

    /// Number of active subscriptions for a category
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.lock().get(&kind).map_or(0, Vec::len)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{InertiaData, MotorCurrent};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn inertia_event(angle: i16) -> Event {
        Event::Packet(PacketRecord::Inertia(InertiaData {
            angle,
            ..Default::default()
        }))
    }

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            hub.subscribe(EventKind::Packet(PacketKind::Inertia), move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        hub.notify(EventKind::Packet(PacketKind::Inertia), &inertia_event(1));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_categories_are_independent() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        hub.subscribe(EventKind::Packet(PacketKind::Current), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.notify(EventKind::Packet(PacketKind::Inertia), &inertia_event(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        hub.notify(
            EventKind::Packet(PacketKind::Current),
            &Event::Packet(PacketRecord::Current(MotorCurrent::default())),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_in_order_within_category() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        hub.subscribe(EventKind::Packet(PacketKind::Inertia), move |e| {
            if let Event::Packet(PacketRecord::Inertia(i)) = e {
                s.lock().push(i.angle);
            }
        });

        for angle in [10, 20, 30] {
            hub.notify(EventKind::Packet(PacketKind::Inertia), &inertia_event(angle));
        }
        assert_eq!(*seen.lock(), vec![10, 20, 30]);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let id = hub.subscribe(EventKind::WheelState, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hub.subscriber_count(EventKind::WheelState), 1);

        hub.unsubscribe(id);
        hub.notify(
            EventKind::WheelState,
            &Event::Wheel(OdometryState::default()),
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(hub.subscriber_count(EventKind::WheelState), 0);

        // Unsubscribing twice is harmless
        hub.unsubscribe(id);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let hub = Arc::new(EventHub::new());
        let count = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None::<SubscriptionId>));

        let h = Arc::clone(&hub);
        let c = Arc::clone(&count);
        let slot = Arc::clone(&own_id);
        let id = hub.subscribe(EventKind::WheelState, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot.lock() {
                h.unsubscribe(id); // re-entrant call must not wedge dispatch
            }
        });
        *own_id.lock() = Some(id);

        let event = Event::Wheel(OdometryState::default());
        hub.notify(EventKind::WheelState, &event);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(EventKind::WheelState), 0);

        // Removal took effect: a second notify reaches nobody
        hub.notify(EventKind::WheelState, &event);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_subscribe_another() {
        let hub = Arc::new(EventHub::new());
        let count = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hub);
        let c = Arc::clone(&count);
        hub.subscribe(EventKind::ConnectionLost, move |_| {
            let c = Arc::clone(&c);
            h.subscribe(EventKind::WheelState, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        hub.notify(
            EventKind::ConnectionLost,
            &Event::ConnectionLost("gone".to_string()),
        );
        assert_eq!(hub.subscriber_count(EventKind::WheelState), 1);

        hub.notify(
            EventKind::WheelState,
            &Event::Wheel(OdometryState::default()),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
