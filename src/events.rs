//! Change notifier: owner-scoped publish/subscribe over store mutations.
//!
//! Every successful save publishes a `ChangeEvent` on the owner's topic.
//! Subscribers in this process see it immediately; writes made by other
//! processes are picked up by `StoreWatcher` and republished here with
//! `ChangeOrigin::External`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::OwnerId;

/// Buffered events per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 64;

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Saved through this process's store.
    Local,
    /// Observed in the database, written by someone else.
    External,
}

/// One stored value changed. Values are the serialized records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub owner: OwnerId,
    pub key: String,
    pub new_value: Option<String>,
    pub old_value: Option<String>,
    pub origin: ChangeOrigin,
}

struct Topic {
    sender: broadcast::Sender<ChangeEvent>,
    /// Last value published (or observed) per storage key.
    latest: HashMap<String, Option<String>>,
}

impl Topic {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            sender,
            latest: HashMap::new(),
        }
    }
}

/// Event bus with one broadcast topic per owner.
pub struct ChangeBus {
    topics: Mutex<HashMap<OwnerId, Topic>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<OwnerId, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listen to every change for `owner`.
    pub fn subscribe(&self, owner: &OwnerId) -> broadcast::Receiver<ChangeEvent> {
        self.topics()
            .entry(owner.clone())
            .or_insert_with(Topic::new)
            .sender
            .subscribe()
    }

    /// Number of live subscribers for `owner`.
    pub fn subscriber_count(&self, owner: &OwnerId) -> usize {
        self.topics()
            .get(owner)
            .map(|t| t.sender.receiver_count())
            .unwrap_or(0)
    }

    /// Publish unconditionally. Returns how many subscribers received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut topics = self.topics();
        let topic = topics.entry(event.owner.clone()).or_insert_with(Topic::new);
        topic
            .latest
            .insert(event.key.clone(), event.new_value.clone());
        tracing::debug!(owner = %event.owner, key = %event.key, origin = ?event.origin, "Change published");
        // No subscribers is not an error: nobody is looking right now.
        topic.sender.send(event).unwrap_or(0)
    }

    /// Publish only if `event.new_value` differs from the last known value.
    ///
    /// The first observation of a key only records a baseline.
    /// `old_value` is filled in from the last known value.
    pub fn publish_if_changed(&self, mut event: ChangeEvent) -> bool {
        {
            let mut topics = self.topics();
            let topic = topics.entry(event.owner.clone()).or_insert_with(Topic::new);
            match topic.latest.get(&event.key) {
                None => {
                    topic.latest.insert(event.key, event.new_value);
                    return false;
                }
                Some(known) if *known == event.new_value => return false,
                Some(known) => event.old_value = known.clone(),
            }
        }
        self.publish(event);
        true
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str) -> OwnerId {
        OwnerId::parse(name).unwrap()
    }

    fn event(owner_id: &OwnerId, value: &str) -> ChangeEvent {
        ChangeEvent {
            owner: owner_id.clone(),
            key: owner_id.medicines_key(),
            new_value: Some(value.to_string()),
            old_value: None,
            origin: ChangeOrigin::Local,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = ChangeBus::new();
        let a = owner("a@example.org");
        let mut rx = bus.subscribe(&a);
        assert_eq!(bus.publish(event(&a, "[]")), 1);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.new_value.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn topics_are_owner_scoped() {
        let bus = ChangeBus::new();
        let a = owner("a@example.org");
        let b = owner("b@example.org");
        let mut rx_b = bus.subscribe(&b);
        bus.publish(event(&a, "[]"));
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = ChangeBus::new();
        let a = owner("a@example.org");
        assert_eq!(bus.publish(event(&a, "[]")), 0);
        assert_eq!(bus.subscriber_count(&a), 0);
    }

    #[tokio::test]
    async fn publish_if_changed_sets_baseline_then_dedups() {
        let bus = ChangeBus::new();
        let a = owner("a@example.org");
        let mut rx = bus.subscribe(&a);

        assert!(!bus.publish_if_changed(event(&a, "[1]")));
        assert!(!bus.publish_if_changed(event(&a, "[1]")));
        assert!(bus.publish_if_changed(event(&a, "[2]")));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.new_value.as_deref(), Some("[2]"));
        assert_eq!(got.old_value.as_deref(), Some("[1]"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn local_publish_updates_baseline() {
        let bus = ChangeBus::new();
        let a = owner("a@example.org");
        bus.publish(event(&a, "[3]"));
        assert!(!bus.publish_if_changed(event(&a, "[3]")));
    }
}
