//! Message bus — in-process direct, broadcast, and topic pub/sub for
//! swarm agents.
//!
//! Handlers run synchronously in the sender's execution context, so
//! per-destination ordering follows bus acceptance order. A handler must
//! not call back into the bus and wait on its own reply; panicking
//! handlers are isolated from their siblings and from the bus itself.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Sentinel destination for broadcasts.
pub const BROADCAST_TARGET: &str = "*";

/// Maximum retained history entries. Exceeding it retains the most
/// recent 80%.
const MAX_HISTORY: usize = 1000;

/// A message routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmMessage {
    /// Bus-unique, monotonically increasing id.
    pub id: u64,
    /// Swarm this message belongs to.
    pub swarm_id: String,
    /// Sender agent id.
    pub from: String,
    /// Destination agent id, or [`BROADCAST_TARGET`].
    pub to: String,
    /// Topic label.
    pub topic: String,
    /// Arbitrary payload.
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Id of the message this one replies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,
}

/// A subscriber callback. Invoked synchronously; must not re-enter the bus.
pub type MessageHandler = Arc<dyn Fn(&SwarmMessage) + Send + Sync>;

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct BusInner {
    subscribers: HashMap<String, Vec<(SubscriptionId, MessageHandler)>>,
    topic_subscribers: HashMap<String, Vec<(SubscriptionId, MessageHandler)>>,
    history: VecDeque<SwarmMessage>,
}

/// In-process message bus shared by every swarm in the orchestrator;
/// messages are scoped by `swarm_id`.
pub struct MessageBus {
    next_message_id: AtomicU64,
    next_subscription_id: AtomicU64,
    inner: Mutex<BusInner>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicU64::new(1),
            next_subscription_id: AtomicU64::new(1),
            inner: Mutex::new(BusInner {
                subscribers: HashMap::new(),
                topic_subscribers: HashMap::new(),
                history: VecDeque::new(),
            }),
        }
    }

    /// Subscribe to messages addressed to `agent_id` (including
    /// broadcasts from other agents).
    pub fn subscribe(&self, agent_id: &str, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock().expect("bus lock");
        inner
            .subscribers
            .entry(agent_id.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Subscribe to every message published on `topic`.
    pub fn subscribe_topic(&self, topic: &str, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock().expect("bus lock");
        inner
            .topic_subscribers
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut inner = self.inner.lock().expect("bus lock");
        for handlers in inner.subscribers.values_mut() {
            handlers.retain(|(id, _)| *id != subscription);
        }
        for handlers in inner.topic_subscribers.values_mut() {
            handlers.retain(|(id, _)| *id != subscription);
        }
    }

    /// Send a direct message. Delivered to the direct subscribers of
    /// `to`, then to the subscribers of `topic`.
    pub fn send(
        &self,
        swarm_id: &str,
        from: &str,
        to: &str,
        topic: &str,
        payload: Value,
        reply_to: Option<u64>,
    ) -> SwarmMessage {
        let message = self.make_message(swarm_id, from, to, topic, payload, reply_to);
        let mut inner = self.inner.lock().expect("bus lock");
        Self::record(&mut inner, message.clone());

        let direct: Vec<MessageHandler> = inner
            .subscribers
            .get(to)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        let topical = Self::topic_handlers(&inner, topic);

        // Delivery happens under the lock so two concurrent sends cannot
        // interleave at a destination.
        Self::deliver(&direct, &message);
        Self::deliver(&topical, &message);
        message
    }

    /// Broadcast to every direct subscriber except `from`, then to the
    /// subscribers of `topic`. `to` is the `"*"` sentinel.
    pub fn broadcast(
        &self,
        swarm_id: &str,
        from: &str,
        topic: &str,
        payload: Value,
    ) -> SwarmMessage {
        let message =
            self.make_message(swarm_id, from, BROADCAST_TARGET, topic, payload, None);
        let mut inner = self.inner.lock().expect("bus lock");
        Self::record(&mut inner, message.clone());

        let direct: Vec<MessageHandler> = inner
            .subscribers
            .iter()
            .filter(|(agent_id, _)| agent_id.as_str() != from)
            .flat_map(|(_, hs)| hs.iter().map(|(_, h)| Arc::clone(h)))
            .collect();
        let topical = Self::topic_handlers(&inner, topic);

        Self::deliver(&direct, &message);
        Self::deliver(&topical, &message);
        message
    }

    /// The most recent `limit` messages of a swarm, oldest first.
    pub fn get_history(&self, swarm_id: &str, limit: usize) -> Vec<SwarmMessage> {
        let inner = self.inner.lock().expect("bus lock");
        let matching: Vec<SwarmMessage> = inner
            .history
            .iter()
            .filter(|m| m.swarm_id == swarm_id)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }

    /// The most recent `limit` messages addressed to an agent (direct or
    /// broadcast from another agent), oldest first.
    pub fn get_agent_messages(&self, agent_id: &str, limit: usize) -> Vec<SwarmMessage> {
        let inner = self.inner.lock().expect("bus lock");
        let matching: Vec<SwarmMessage> = inner
            .history
            .iter()
            .filter(|m| {
                m.to == agent_id || (m.to == BROADCAST_TARGET && m.from != agent_id)
            })
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }

    /// Drop all history belonging to a swarm.
    pub fn clear_swarm(&self, swarm_id: &str) {
        let mut inner = self.inner.lock().expect("bus lock");
        inner.history.retain(|m| m.swarm_id != swarm_id);
        debug!(swarm_id = %swarm_id, "bus history cleared for swarm");
    }

    /// Drop all state: history and every subscription.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("bus lock");
        inner.history.clear();
        inner.subscribers.clear();
        inner.topic_subscribers.clear();
    }

    fn make_message(
        &self,
        swarm_id: &str,
        from: &str,
        to: &str,
        topic: &str,
        payload: Value,
        reply_to: Option<u64>,
    ) -> SwarmMessage {
        SwarmMessage {
            id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
            swarm_id: swarm_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            topic: topic.to_string(),
            payload,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            reply_to,
        }
    }

    fn record(inner: &mut BusInner, message: SwarmMessage) {
        inner.history.push_back(message);
        if inner.history.len() > MAX_HISTORY {
            let keep = MAX_HISTORY * 8 / 10;
            let drop = inner.history.len() - keep;
            inner.history.drain(..drop);
            debug!(dropped = drop, "bus history trimmed");
        }
    }

    fn topic_handlers(inner: &BusInner, topic: &str) -> Vec<MessageHandler> {
        inner
            .topic_subscribers
            .get(topic)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    fn deliver(handlers: &[MessageHandler], message: &SwarmMessage) {
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                warn!(
                    message_id = message.id,
                    topic = %message.topic,
                    "bus handler panicked; continuing with remaining handlers"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn collector() -> (MessageHandler, Arc<StdMutex<Vec<u64>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: MessageHandler = Arc::new(move |m| {
            sink.lock().unwrap().push(m.id);
        });
        (handler, seen)
    }

    #[test]
    fn direct_send_reaches_destination_and_topic() {
        let bus = MessageBus::new();
        let (direct, direct_seen) = collector();
        let (topical, topic_seen) = collector();
        let (other, other_seen) = collector();

        bus.subscribe("a1", direct);
        bus.subscribe("a2", other);
        bus.subscribe_topic("status", topical);

        let msg = bus.send("s1", "a0", "a1", "status", json!({"x": 1}), None);

        assert_eq!(*direct_seen.lock().unwrap(), vec![msg.id]);
        assert_eq!(*topic_seen.lock().unwrap(), vec![msg.id]);
        assert!(other_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn broadcast_skips_sender() {
        let bus = MessageBus::new();
        let (h1, seen1) = collector();
        let (h2, seen2) = collector();
        bus.subscribe("a1", h1);
        bus.subscribe("a2", h2);

        let msg = bus.broadcast("s1", "a1", "news", json!({}));

        assert_eq!(msg.to, BROADCAST_TARGET);
        assert!(seen1.lock().unwrap().is_empty());
        assert_eq!(*seen2.lock().unwrap(), vec![msg.id]);
    }

    #[test]
    fn message_ids_are_monotonic() {
        let bus = MessageBus::new();
        let a = bus.send("s1", "x", "y", "t", json!(1), None);
        let b = bus.send("s1", "x", "y", "t", json!(2), None);
        let c = bus.broadcast("s1", "x", "t", json!(3));
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn ordering_preserved_per_destination() {
        let bus = MessageBus::new();
        let (handler, seen) = collector();
        bus.subscribe("a1", handler);

        let ids: Vec<u64> = (0..10)
            .map(|i| bus.send("s1", "a0", "a1", "t", json!(i), None).id)
            .collect();

        assert_eq!(*seen.lock().unwrap(), ids);
    }

    #[test]
    fn panicking_handler_does_not_affect_siblings() {
        let bus = MessageBus::new();
        let panicking: MessageHandler = Arc::new(|_| panic!("boom"));
        let (ok_handler, seen) = collector();
        bus.subscribe("a1", panicking);
        bus.subscribe("a1", ok_handler);

        let msg = bus.send("s1", "a0", "a1", "t", json!({}), None);

        assert_eq!(*seen.lock().unwrap(), vec![msg.id]);
        // Bus is still usable.
        bus.send("s1", "a0", "a1", "t", json!({}), None);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = MessageBus::new();
        let (handler, seen) = collector();
        let sub = bus.subscribe("a1", handler);

        bus.send("s1", "a0", "a1", "t", json!(1), None);
        bus.unsubscribe(sub);
        bus.send("s1", "a0", "a1", "t", json!(2), None);

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn history_scoped_by_swarm_with_limit() {
        let bus = MessageBus::new();
        for i in 0..5 {
            bus.send("s1", "a", "b", "t", json!(i), None);
        }
        bus.send("s2", "a", "b", "t", json!("other"), None);

        let history = bus.get_history("s1", 3);
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|m| m.swarm_id == "s1"));
        // Oldest first, most recent retained.
        assert!(history[0].id < history[2].id);

        bus.clear_swarm("s1");
        assert!(bus.get_history("s1", 50).is_empty());
        assert_eq!(bus.get_history("s2", 50).len(), 1);
    }

    #[test]
    fn agent_messages_include_broadcasts_from_others() {
        let bus = MessageBus::new();
        bus.send("s1", "a0", "a1", "t", json!(1), None);
        bus.broadcast("s1", "a1", "t", json!(2));
        bus.broadcast("s1", "a2", "t", json!(3));

        let messages = bus.get_agent_messages("a1", 50);
        let ids: Vec<&str> = messages.iter().map(|m| m.from.as_str()).collect();
        assert_eq!(ids, vec!["a0", "a2"]);
    }

    #[test]
    fn history_trims_to_eighty_percent() {
        let bus = MessageBus::new();
        for i in 0..(MAX_HISTORY + 1) {
            bus.send("s1", "a", "b", "t", json!(i), None);
        }
        let inner = bus.inner.lock().unwrap();
        assert_eq!(inner.history.len(), MAX_HISTORY * 8 / 10);
        // The retained window is the most recent messages.
        assert_eq!(inner.history.back().unwrap().id as usize, MAX_HISTORY + 1);
    }

    #[test]
    fn reply_to_round_trips() {
        let bus = MessageBus::new();
        let first = bus.send("s1", "a", "b", "t", json!(1), None);
        let reply = bus.send("s1", "b", "a", "t", json!(2), Some(first.id));
        assert_eq!(reply.reply_to, Some(first.id));
    }
}
