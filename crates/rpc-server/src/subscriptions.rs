//! Subscription Manager - Manages WebSocket subscriptions
//!
//! Handles staking event subscriptions and broadcasts events to subscribers.
//! A subscription either follows one participant or every event.

use dashmap::DashMap;
use solana_program::pubkey::Pubkey;
use staking_program::{StakingEvent, Tick};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Subscription ID
pub type SubscriptionId = u64;

/// Event notification
#[derive(Clone, Debug)]
pub struct EventNotification {
    pub subscription_id: SubscriptionId,
    pub tick: Tick,
    pub event: StakingEvent,
}

/// Subscription entry
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// `None` receives every event
    pub participant: Option<Pubkey>,
    pub sender: broadcast::Sender<EventNotification>,
}

impl Subscription {
    fn wants(&self, event: &StakingEvent) -> bool {
        self.participant.map_or(true, |p| event.involves(&p))
    }
}

/// Manages WebSocket subscriptions
pub struct SubscriptionManager {
    /// Active subscriptions by ID
    subscriptions: DashMap<SubscriptionId, Subscription>,
    /// Next subscription ID
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to staking events, optionally for one participant
    pub fn subscribe_events(
        &self,
        participant: Option<Pubkey>,
    ) -> (SubscriptionId, broadcast::Receiver<EventNotification>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = broadcast::channel(64);

        self.subscriptions.insert(
            id,
            Subscription {
                id,
                participant,
                sender,
            },
        );

        tracing::debug!("Created subscription {} for {:?}", id, participant);

        (id, receiver)
    }

    /// Unsubscribe from events
    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> bool {
        if self.subscriptions.remove(&subscription_id).is_some() {
            tracing::debug!("Removed subscription {}", subscription_id);
            true
        } else {
            false
        }
    }

    /// Notify subscribers of the events produced at `tick`
    pub fn notify_events(&self, tick: Tick, events: &[StakingEvent]) {
        if events.is_empty() {
            return;
        }

        for sub in self.subscriptions.iter() {
            for event in events.iter().filter(|e| sub.wants(e)) {
                let notification = EventNotification {
                    subscription_id: sub.id,
                    tick,
                    event: event.clone(),
                };

                // Ignore send errors (subscriber might have disconnected)
                let _ = sub.sender.send(notification);
            }
        }
    }

    /// Get subscription count
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if a subscription exists
    pub fn has_subscription(&self, subscription_id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&subscription_id)
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
