//! # Transition Publisher
//!
//! Publishing side of the bus: one `tokio::sync::broadcast` channel per
//! [`TransitionTopic`].

use crate::events::{StoreTransition, TransitionTopic};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing store transitions.
pub trait TransitionPublisher: Send + Sync {
    /// Publish a transition on its topic channel.
    ///
    /// Returns the number of subscribers that received it.
    fn publish(&self, transition: StoreTransition) -> usize;

    /// Total transitions published.
    fn transitions_published(&self) -> u64;
}

/// In-memory bus with a separate broadcast channel per topic.
pub struct TransitionBus {
    channels: HashMap<TransitionTopic, broadcast::Sender<StoreTransition>>,

    /// Active subscription count by topic.
    subscriptions: Arc<RwLock<HashMap<TransitionTopic, usize>>>,

    published: AtomicU64,

    capacity: usize,
}

impl TransitionBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let channels = TransitionTopic::ALL
            .iter()
            .map(|topic| (*topic, broadcast::channel(capacity).0))
            .collect();
        Self {
            channels,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to one topic. Only transitions published after this call
    /// are delivered.
    #[must_use]
    pub fn subscribe(&self, topic: TransitionTopic) -> Subscription {
        let receiver = match self.channels.get(&topic) {
            Some(sender) => sender.subscribe(),
            // Every topic is created in `with_capacity`.
            None => broadcast::channel(1).1,
        };

        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(topic).or_insert(0) += 1;
        }

        debug!(topic = topic.name(), "New subscription created");
        Subscription::new(receiver, topic, self.subscriptions.clone())
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: TransitionTopic) -> usize {
        self.subscriptions
            .read()
            .ok()
            .and_then(|subs| subs.get(&topic).copied())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TransitionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionPublisher for TransitionBus {
    fn publish(&self, transition: StoreTransition) -> usize {
        let topic = transition.topic();
        self.published.fetch_add(1, Ordering::Relaxed);

        let Some(sender) = self.channels.get(&topic) else {
            return 0;
        };
        let label = transition.label();
        match sender.send(transition) {
            Ok(receivers) => {
                trace!(topic = topic.name(), transition = label, receivers, "Transition published");
                receivers
            }
            Err(_) => {
                trace!(topic = topic.name(), transition = label, "Transition dropped (no receivers)");
                0
            }
        }
    }

    fn transitions_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
