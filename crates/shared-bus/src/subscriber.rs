//! # Transition Subscriber
//!
//! Receiving side of the bus.

use crate::events::{StoreTransition, TransitionTopic};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("transition bus closed")]
    Closed,
}

/// A subscription to one topic. Dropping it releases the slot.
pub struct Subscription {
    receiver: broadcast::Receiver<StoreTransition>,
    topic: TransitionTopic,
    subscriptions: Arc<RwLock<HashMap<TransitionTopic, usize>>>,
    /// Transitions lost to lag since the last `take_missed`.
    missed: u64,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<StoreTransition>,
        topic: TransitionTopic,
        subscriptions: Arc<RwLock<HashMap<TransitionTopic, usize>>>,
    ) -> Self {
        Self {
            receiver,
            topic,
            subscriptions,
            missed: 0,
        }
    }

    /// Receive the next transition.
    ///
    /// Lag is absorbed here and counted; callers check [`take_missed`] to
    /// decide whether to resynchronise from the store.
    ///
    /// [`take_missed`]: Subscription::take_missed
    pub async fn recv(&mut self) -> Result<StoreTransition, SubscriptionError> {
        loop {
            match self.receiver.recv().await {
                Ok(t) => return Ok(t),
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(topic = self.topic.name(), lagged = count, "Subscriber lagged, transitions dropped");
                    self.missed += count;
                }
            }
        }
    }

    /// Non-blocking receive. `Ok(None)` when nothing is queued.
    pub fn try_recv(&mut self) -> Result<Option<StoreTransition>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(t) => return Ok(Some(t)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(SubscriptionError::Closed),
                Err(broadcast::error::TryRecvError::Lagged(count)) => self.missed += count,
            }
        }
    }

    /// Consume exactly one transition matching `predicate`, discarding the
    /// non-matching ones queued before it.
    pub async fn next_matching<F>(&mut self, mut predicate: F) -> Result<StoreTransition, SubscriptionError>
    where
        F: FnMut(&StoreTransition) -> bool,
    {
        loop {
            let t = self.recv().await?;
            if predicate(&t) {
                return Ok(t);
            }
        }
    }

    /// Return and reset the lag counter.
    pub fn take_missed(&mut self) -> u64 {
        std::mem::take(&mut self.missed)
    }

    #[must_use]
    pub fn topic(&self) -> TransitionTopic {
        self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        if let Some(count) = subs.get_mut(&self.topic) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.topic);
            }
        }
        debug!(topic = self.topic.name(), "Subscription dropped");
    }
}
