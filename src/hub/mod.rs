//! Notification hub: subscription registry and non-blocking fan-out.
//!
//! Every duplex connection and every SSE stream registers one listener with a
//! bounded outbound queue. Publishing encodes the event once and offers it to
//! each matching listener with `try_send`; a full queue drops that delivery
//! for that listener only and bumps its drop counter. A slow consumer can
//! therefore never stall the publisher or its peers.
//!
//! Routing:
//!
//! - `ResourceUpdated { uri }` reaches listeners subscribed to `uri` and
//!   listeners subscribed to [`GLOBAL_TOPIC`].
//! - List-changed events reach [`GLOBAL_TOPIC`] subscribers only.
//!
//! A listener receives at most one copy of an event even if several of its
//! subscriptions match.

pub mod event;

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::protocol::{codec, Dialect, Envelope};
use crate::transport::TransportKind;

pub use event::HubEvent;

/// Subscription topic matching every event.
pub const GLOBAL_TOPIC: &str = "*";

/// One encoded notification frame, shared by every recipient.
pub type Outbound = Arc<str>;

/// Hub-assigned listener identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ListenerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ListenerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<u64> for ListenerId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Outcome of one [`NotificationHub::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Listeners whose queue accepted the event.
    pub delivered: usize,
    /// Listeners that matched but whose queue was full or closed.
    pub dropped: usize,
}

struct Listener {
    kind: TransportKind,
    tx: mpsc::Sender<Outbound>,
    dropped: AtomicU64,
}

#[derive(Default)]
struct Registry {
    listeners: HashMap<ListenerId, Listener>,
    by_uri: HashMap<String, HashSet<ListenerId>>,
    global: HashSet<ListenerId>,
}

impl Registry {
    fn detach(&mut self, id: ListenerId) {
        self.global.remove(&id);
        self.by_uri.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
    }
}

/// Process-wide subscription registry.
pub struct NotificationHub {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
    capacity: usize,
}

impl NotificationHub {
    /// Hub whose listeners buffer at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Per-listener queue length.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a listener with the hub's default queue length.
    ///
    /// The returned receiver yields encoded notification frames; dropping it
    /// makes later deliveries count as dropped until the listener is removed.
    pub fn register_listener(&self, kind: TransportKind) -> (ListenerId, mpsc::Receiver<Outbound>) {
        self.register_listener_with_capacity(kind, self.capacity)
    }

    /// Register a listener with an explicit queue length.
    pub fn register_listener_with_capacity(
        &self,
        kind: TransportKind,
        capacity: usize,
    ) -> (ListenerId, mpsc::Receiver<Outbound>) {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.write().listeners.insert(
            id,
            Listener {
                kind,
                tx,
                dropped: AtomicU64::new(0),
            },
        );
        debug!(listener_id = %id, transport = %kind, "listener registered");
        (id, rx)
    }

    /// Subscribe `listener` to `uri`, or to every event when `uri` is [`GLOBAL_TOPIC`].
    ///
    /// Idempotent. Returns `false` if the listener is not registered.
    pub fn subscribe(&self, listener: ListenerId, uri: &str) -> bool {
        let mut registry = self.write();
        if !registry.listeners.contains_key(&listener) {
            return false;
        }
        if uri == GLOBAL_TOPIC {
            registry.global.insert(listener);
        } else {
            registry
                .by_uri
                .entry(uri.to_owned())
                .or_default()
                .insert(listener);
        }
        debug!(listener_id = %listener, uri, "subscribed");
        true
    }

    /// Remove one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, listener: ListenerId, uri: &str) -> bool {
        let mut registry = self.write();
        if uri == GLOBAL_TOPIC {
            return registry.global.remove(&listener);
        }
        let Some(members) = registry.by_uri.get_mut(uri) else {
            return false;
        };
        let removed = members.remove(&listener);
        if members.is_empty() {
            registry.by_uri.remove(uri);
        }
        removed
    }

    /// Remove every subscription of `listener`, keeping it registered.
    pub fn unsubscribe_all(&self, listener: ListenerId) {
        self.write().detach(listener);
    }

    /// Remove `listener` and all its subscriptions.
    ///
    /// Idempotent. Returns `false` if it was not registered. Dropping the
    /// listener's sender ends its receiver once drained.
    pub fn remove_listener(&self, listener: ListenerId) -> bool {
        let mut registry = self.write();
        registry.detach(listener);
        let removed = registry.listeners.remove(&listener);
        drop(registry);

        match removed {
            Some(entry) => {
                let dropped = entry.dropped.load(Ordering::Relaxed);
                debug!(
                    listener_id = %listener,
                    transport = %entry.kind,
                    dropped,
                    "listener removed"
                );
                true
            }
            None => false,
        }
    }

    /// Fan `event` out to every matching listener without blocking.
    pub fn publish(&self, event: &HubEvent) -> PublishReport {
        self.publish_excluding(event, None)
    }

    /// As [`NotificationHub::publish`], skipping `origin`.
    ///
    /// Used when a connection relays an event it received from its own peer.
    pub fn publish_excluding(&self, event: &HubEvent, origin: Option<ListenerId>) -> PublishReport {
        let frame: Outbound = Arc::from(codec::encode(
            &Envelope::Notification(event.to_notification()),
            Dialect::Strict,
        ));

        let registry = self.read();
        let mut targets: HashSet<ListenerId> = registry.global.clone();
        if let Some(members) = event.resource_uri().and_then(|uri| registry.by_uri.get(uri)) {
            targets.extend(members.iter().copied());
        }
        if let Some(origin) = origin {
            targets.remove(&origin);
        }

        let mut report = PublishReport::default();
        for id in targets {
            let Some(listener) = registry.listeners.get(&id) else {
                continue;
            };
            match listener.tx.try_send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    let total = listener.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        listener_id = %id,
                        transport = %listener.kind,
                        method = event.method(),
                        dropped_total = total,
                        "listener queue full; dropping notification"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    listener.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(listener_id = %id, "listener receiver gone; dropping notification");
                }
            }
        }

        if report.delivered + report.dropped > 0 {
            info!(
                method = event.method(),
                delivered = report.delivered,
                dropped = report.dropped,
                "published notification"
            );
        }
        report
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.read().listeners.len()
    }

    /// Whether `listener` is registered.
    #[must_use]
    pub fn contains(&self, listener: ListenerId) -> bool {
        self.read().listeners.contains_key(&listener)
    }

    /// Number of listeners subscribed to exactly `uri` (or the global topic).
    #[must_use]
    pub fn subscriber_count(&self, uri: &str) -> usize {
        let registry = self.read();
        if uri == GLOBAL_TOPIC {
            registry.global.len()
        } else {
            registry.by_uri.get(uri).map_or(0, HashSet::len)
        }
    }

    /// Number of distinct URIs with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.read().by_uri.len()
    }

    /// Deliveries dropped for `listener` so far, or `None` if unregistered.
    #[must_use]
    pub fn dropped_count(&self, listener: ListenerId) -> Option<u64> {
        self.read()
            .listeners
            .get(&listener)
            .map(|entry| entry.dropped.load(Ordering::Relaxed))
    }

    /// Topics `listener` is subscribed to, sorted.
    #[must_use]
    pub fn subscriptions_of(&self, listener: ListenerId) -> Vec<String> {
        let registry = self.read();
        let mut topics: Vec<String> = registry
            .by_uri
            .iter()
            .filter(|(_, members)| members.contains(&listener))
            .map(|(uri, _)| uri.clone())
            .collect();
        if registry.global.contains(&listener) {
            topics.push(GLOBAL_TOPIC.to_owned());
        }
        topics.sort();
        topics
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}
