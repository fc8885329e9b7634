use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::SharedConfig;
use crate::glob::GlobPattern;

/// A message delivered to a subscriber's queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: Bytes,
    /// The pattern that matched, for pattern subscriptions.
    pub pattern: Option<Bytes>,
    pub payload: Bytes,
}

/// What PUBLISH does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait up to the publish timeout for room, then drop this copy.
    Block,
    /// Evict the oldest queued message to make room.
    DropOldest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropOldest => "drop-oldest",
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!("invalid pubsub-overflow policy '{other}'")),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Queue {
    tx: Sender<Message>,
    /// Kept so drop-oldest can evict from the head.
    rx: Receiver<Message>,
}

#[derive(Default)]
struct Registry {
    /// channel -> subscriber ids
    channels: HashMap<Bytes, HashSet<u64>>,
    /// pattern -> (compiled pattern, subscriber ids)
    patterns: HashMap<Bytes, (GlobPattern, HashSet<u64>)>,
    queues: HashMap<u64, Queue>,
    subscriber_channels: HashMap<u64, HashSet<Bytes>>,
    subscriber_patterns: HashMap<u64, HashSet<Bytes>>,
}

impl Registry {
    fn subscription_count(&self, id: u64) -> usize {
        self.subscriber_channels.get(&id).map_or(0, |c| c.len())
            + self.subscriber_patterns.get(&id).map_or(0, |p| p.len())
    }

    fn unsubscribe(&mut self, id: u64, channel: &[u8]) {
        if let Some(ids) = self.channels.get_mut(channel) {
            ids.remove(&id);
            if ids.is_empty() {
                self.channels.remove(channel);
            }
        }
        if let Some(chans) = self.subscriber_channels.get_mut(&id) {
            chans.remove(channel);
        }
    }

    fn punsubscribe(&mut self, id: u64, pattern: &[u8]) {
        if let Some((_, ids)) = self.patterns.get_mut(pattern) {
            ids.remove(&id);
            if ids.is_empty() {
                self.patterns.remove(pattern);
            }
        }
        if let Some(pats) = self.subscriber_patterns.get_mut(&id) {
            pats.remove(pattern);
        }
    }
}

/// Channel → subscriber-queue registry with fan-out on publish.
///
/// Each subscriber owns a bounded queue. Publishing snapshots the target
/// queues under a read lock and sends after releasing it, so a slow
/// subscriber never holds up the registry.
pub struct Broker {
    registry: RwLock<Registry>,
    config: SharedConfig,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published())
            .finish()
    }
}

impl Broker {
    pub fn new(config: SharedConfig) -> Self {
        Broker {
            registry: RwLock::new(Registry::default()),
            config,
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber with its own queue and no subscriptions.
    pub fn subscriber(self: &Arc<Self>) -> Subscription {
        let capacity = self.config.read().pubsub_queue_capacity;
        let (tx, rx) = bounded(capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.write().queues.insert(
            id,
            Queue {
                tx,
                rx: rx.clone(),
            },
        );
        debug!(subscriber = id, capacity, "subscriber registered");
        Subscription {
            id,
            broker: Arc::clone(self),
            rx,
        }
    }

    /// Deliver `payload` to every queue subscribed to `channel` directly or
    /// through a matching pattern. Returns the number of queues that
    /// received it. Nothing is retained for later subscribers.
    pub fn publish(&self, channel: &Bytes, payload: &Bytes) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<(u64, Sender<Message>, Receiver<Message>, Option<Bytes>)> = {
            let registry = self.registry.read();
            let mut targets = Vec::new();
            if let Some(ids) = registry.channels.get(channel) {
                for id in ids {
                    if let Some(q) = registry.queues.get(id) {
                        targets.push((*id, q.tx.clone(), q.rx.clone(), None));
                    }
                }
            }
            for (pattern, (compiled, ids)) in &registry.patterns {
                if !compiled.matches(channel) {
                    continue;
                }
                for id in ids {
                    if let Some(q) = registry.queues.get(id) {
                        targets.push((*id, q.tx.clone(), q.rx.clone(), Some(pattern.clone())));
                    }
                }
            }
            targets
        };
        if targets.is_empty() {
            return 0;
        }

        let (policy, timeout) = {
            let config = self.config.read();
            (config.pubsub_overflow, config.pubsub_publish_timeout)
        };

        let mut delivered = 0;
        for (id, tx, rx, pattern) in targets {
            let message = Message {
                channel: channel.clone(),
                pattern,
                payload: payload.clone(),
            };
            if self.deliver(id, &tx, &rx, message, policy, timeout) {
                delivered += 1;
            }
        }
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    fn deliver(
        &self,
        id: u64,
        tx: &Sender<Message>,
        rx: &Receiver<Message>,
        message: Message,
        policy: OverflowPolicy,
        timeout: Duration,
    ) -> bool {
        match policy {
            OverflowPolicy::Block => match tx.send_timeout(message, timeout) {
                Ok(()) => true,
                Err(SendTimeoutError::Timeout(message)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = id,
                        channel = %String::from_utf8_lossy(&message.channel),
                        "subscriber queue full, message dropped"
                    );
                    false
                }
                Err(SendTimeoutError::Disconnected(_)) => false,
            },
            OverflowPolicy::DropOldest => {
                let mut message = message;
                loop {
                    match tx.try_send(message) {
                        Ok(()) => return true,
                        Err(TrySendError::Full(m)) => {
                            if rx.try_recv().is_ok() {
                                self.dropped.fetch_add(1, Ordering::Relaxed);
                                warn!(subscriber = id, "subscriber queue full, oldest message evicted");
                            }
                            message = m;
                        }
                        Err(TrySendError::Disconnected(_)) => return false,
                    }
                }
            }
        }
    }

    /// Active channels, optionally filtered by a glob pattern, sorted.
    pub fn channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        let compiled = pattern.map(GlobPattern::new);
        let registry = self.registry.read();
        let mut channels: Vec<Bytes> = registry
            .channels
            .keys()
            .filter(|c| compiled.as_ref().is_none_or(|p| p.matches(c)))
            .cloned()
            .collect();
        channels.sort();
        channels
    }

    /// Direct subscriber count per channel (pattern subscribers excluded).
    pub fn numsub(&self, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        let registry = self.registry.read();
        channels
            .iter()
            .map(|c| (c.clone(), registry.channels.get(c).map_or(0, |ids| ids.len())))
            .collect()
    }

    pub fn numpat(&self) -> usize {
        self.registry.read().patterns.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.read().queues.len()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn remove_subscriber(&self, id: u64) {
        let mut registry = self.registry.write();
        if let Some(chans) = registry.subscriber_channels.remove(&id) {
            for channel in chans {
                registry.unsubscribe(id, &channel);
            }
        }
        if let Some(pats) = registry.subscriber_patterns.remove(&id) {
            for pattern in pats {
                registry.punsubscribe(id, &pattern);
            }
        }
        registry.queues.remove(&id);
        debug!(subscriber = id, "subscriber removed");
    }
}

/// A subscriber's handle: its queue plus its channel and pattern
/// subscriptions. Dropping it deregisters everything.
pub struct Subscription {
    id: u64,
    broker: Arc<Broker>,
    rx: Receiver<Message>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Subscribe to channels. Returns the total subscription count.
    pub fn subscribe(&self, channels: &[Bytes]) -> usize {
        let mut registry = self.broker.registry.write();
        for channel in channels {
            registry
                .channels
                .entry(channel.clone())
                .or_default()
                .insert(self.id);
            registry
                .subscriber_channels
                .entry(self.id)
                .or_default()
                .insert(channel.clone());
        }
        debug!(subscriber = self.id, count = channels.len(), "subscribed");
        registry.subscription_count(self.id)
    }

    /// Unsubscribe from channels, or from every channel when `channels` is
    /// empty. Returns the remaining subscription count.
    pub fn unsubscribe(&self, channels: &[Bytes]) -> usize {
        let mut registry = self.broker.registry.write();
        let targets: Vec<Bytes> = if channels.is_empty() {
            registry
                .subscriber_channels
                .get(&self.id)
                .map(|c| c.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            channels.to_vec()
        };
        for channel in &targets {
            registry.unsubscribe(self.id, channel);
        }
        debug!(subscriber = self.id, count = targets.len(), "unsubscribed");
        registry.subscription_count(self.id)
    }

    pub fn psubscribe(&self, patterns: &[Bytes]) -> usize {
        let mut registry = self.broker.registry.write();
        for pattern in patterns {
            registry
                .patterns
                .entry(pattern.clone())
                .or_insert_with(|| (GlobPattern::new(pattern), HashSet::new()))
                .1
                .insert(self.id);
            registry
                .subscriber_patterns
                .entry(self.id)
                .or_default()
                .insert(pattern.clone());
        }
        debug!(subscriber = self.id, count = patterns.len(), "pattern subscribed");
        registry.subscription_count(self.id)
    }

    pub fn punsubscribe(&self, patterns: &[Bytes]) -> usize {
        let mut registry = self.broker.registry.write();
        let targets: Vec<Bytes> = if patterns.is_empty() {
            registry
                .subscriber_patterns
                .get(&self.id)
                .map(|p| p.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            patterns.to_vec()
        };
        for pattern in &targets {
            registry.punsubscribe(self.id, pattern);
        }
        registry.subscription_count(self.id)
    }

    pub fn subscription_count(&self) -> usize {
        self.broker.registry.read().subscription_count(self.id)
    }

    pub fn channels(&self) -> Vec<Bytes> {
        let registry = self.broker.registry.read();
        let mut channels: Vec<Bytes> = registry
            .subscriber_channels
            .get(&self.id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    /// Wait up to `timeout` for the next message. `None` means nothing
    /// arrived in time.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Messages queued and not yet received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.remove_subscriber(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::config::Config;

    fn broker_with(config: Config) -> Arc<Broker> {
        Arc::new(Broker::new(Arc::new(RwLock::new(config))))
    }

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broker = broker_with(Config::default());
        assert_eq!(broker.publish(&b("news"), &b("hello")), 0);
        let sub = broker.subscriber();
        sub.subscribe(&[b("news")]);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_fan_out_fifo() {
        let broker = broker_with(Config::default());
        let a = broker.subscriber();
        let c = broker.subscriber();
        assert_eq!(a.subscribe(&[b("news"), b("sports")]), 2);
        c.subscribe(&[b("news")]);

        assert_eq!(broker.publish(&b("news"), &b("one")), 2);
        assert_eq!(broker.publish(&b("news"), &b("two")), 2);
        assert_eq!(broker.publish(&b("sports"), &b("goal")), 1);

        let payloads: Vec<Bytes> = std::iter::from_fn(|| a.try_recv()).map(|m| m.payload).collect();
        assert_eq!(payloads, vec!["one", "two", "goal"]);
        assert_eq!(c.pending(), 2);
    }

    #[test]
    fn test_pattern_subscription() {
        let broker = broker_with(Config::default());
        let sub = broker.subscriber();
        sub.psubscribe(&[b("news.*")]);
        assert_eq!(broker.publish(&b("news.tech"), &b("x")), 1);
        assert_eq!(broker.publish(&b("weather"), &b("y")), 0);
        let msg = sub.try_recv().unwrap();
        assert_eq!(msg.pattern, Some(b("news.*")));
        assert_eq!(msg.channel, "news.tech");
        assert_eq!(broker.numpat(), 1);
        assert_eq!(sub.punsubscribe(&[]), 0);
        assert_eq!(broker.numpat(), 0);
    }

    #[test]
    fn test_unsubscribe_and_drop_deregister() {
        let broker = broker_with(Config::default());
        let sub = broker.subscriber();
        sub.subscribe(&[b("a"), b("b")]);
        assert_eq!(sub.unsubscribe(&[b("a")]), 1);
        assert_eq!(broker.channels(None), vec![b("b")]);
        assert_eq!(broker.numsub(&[b("a"), b("b")]), vec![(b("a"), 0), (b("b"), 1)]);
        drop(sub);
        assert!(broker.channels(None).is_empty());
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[test]
    fn test_block_policy_times_out() {
        let config = Config {
            pubsub_queue_capacity: 1,
            pubsub_publish_timeout: Duration::from_millis(10),
            ..Config::default()
        };
        let broker = broker_with(config);
        let sub = broker.subscriber();
        sub.subscribe(&[b("c")]);
        assert_eq!(broker.publish(&b("c"), &b("1")), 1);
        assert_eq!(broker.publish(&b("c"), &b("2")), 0);
        assert_eq!(broker.dropped(), 1);
        assert_eq!(sub.try_recv().unwrap().payload, "1");
    }

    #[test]
    fn test_drop_oldest_policy() {
        let config = Config {
            pubsub_queue_capacity: 2,
            pubsub_overflow: OverflowPolicy::DropOldest,
            ..Config::default()
        };
        let broker = broker_with(config);
        let sub = broker.subscriber();
        sub.subscribe(&[b("c")]);
        for payload in ["1", "2", "3"] {
            assert_eq!(broker.publish(&b("c"), &Bytes::from(payload)), 1);
        }
        assert_eq!(sub.try_recv().unwrap().payload, "2");
        assert_eq!(sub.try_recv().unwrap().payload, "3");
    }

    #[test]
    fn test_recv_timeout_across_threads() {
        let broker = broker_with(Config::default());
        let sub = broker.subscriber();
        sub.subscribe(&[b("events")]);
        assert!(sub.recv_timeout(Duration::from_millis(10)).is_none());

        let publisher = {
            let broker = Arc::clone(&broker);
            thread::spawn(move || broker.publish(&b("events"), &b("ping")))
        };
        let msg = sub.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(msg.payload, "ping");
        assert_eq!(publisher.join().unwrap(), 1);
    }
}
