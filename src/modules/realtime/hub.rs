use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::{
    api::error,
    modules::realtime::events::{ChangeEvent, HubEvent, MessageChange},
};

/// Fans message changes out to every live subscription.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    tx: broadcast::Sender<HubEvent>,
    /// Last assigned sequence number. Held while sending so that sequence
    /// order and delivery order agree.
    seq: Mutex<u64>,
    active: AtomicUsize,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { inner: Arc::new(HubInner { tx, seq: Mutex::new(0), active: AtomicUsize::new(0) }) }
    }

    pub fn publish(&self, change: MessageChange) -> u64 {
        let mut seq = self.inner.seq.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *seq += 1;
        let event = ChangeEvent { seq: *seq, change };
        // no receivers is fine
        let _ = self.inner.tx.send(HubEvent::Change(event));
        *seq
    }

    /// Tells every subscriber that changes may have been lost.
    pub fn signal_gap(&self) {
        let _guard = self.inner.seq.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = self.inner.tx.send(HubEvent::Gap);
    }

    /// Creates an inactive subscription; nothing is received until `activate`.
    pub fn subscription(&self, scope: SubscriptionScope) -> Subscription {
        Subscription { hub: self.clone(), scope, state: SubscriptionState::Inactive, rx: None }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionScope {
    /// Every change to messages the profile sent or received.
    Inbox(Uuid),
    Conversation(Uuid),
}

impl SubscriptionScope {
    pub fn matches(&self, change: &MessageChange) -> bool {
        match self {
            SubscriptionScope::Inbox(profile_id) => change.involves(profile_id),
            SubscriptionScope::Conversation(conversation_id) => {
                change.conversation_id() == *conversation_id
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Inactive,
    Subscribing,
    Active,
    Unsubscribed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    Change(ChangeEvent),
    /// Local state can no longer be patched incrementally and must be refetched.
    Resync,
}

pub struct Subscription {
    hub: RealtimeHub,
    scope: SubscriptionScope,
    state: SubscriptionState,
    rx: Option<broadcast::Receiver<HubEvent>>,
}

impl Subscription {
    pub fn scope(&self) -> SubscriptionScope {
        self.scope
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Starts receiving. Changes published before this call are not delivered.
    pub fn activate(&mut self) -> Result<(), error::SystemError> {
        match self.state {
            SubscriptionState::Active => return Ok(()),
            SubscriptionState::Unsubscribed => {
                return Err(error::SystemError::bad_request("Subscription already closed"));
            }
            SubscriptionState::Inactive | SubscriptionState::Subscribing => {}
        }

        self.state = SubscriptionState::Subscribing;
        self.rx = Some(self.hub.inner.tx.subscribe());
        self.hub.inner.active.fetch_add(1, Ordering::SeqCst);
        self.state = SubscriptionState::Active;

        tracing::debug!("Subscription {:?} active", self.scope);
        Ok(())
    }

    /// Next update in scope, in publish order. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<LiveUpdate> {
        loop {
            let rx = self.rx.as_mut()?;
            let received = rx.recv().await;
            match received {
                Ok(HubEvent::Change(event)) if self.scope.matches(&event.change) => {
                    return Some(LiveUpdate::Change(event));
                }
                Ok(HubEvent::Change(_)) => continue,
                Ok(HubEvent::Gap) => return Some(LiveUpdate::Resync),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Subscription {:?} lagged by {missed} events", self.scope);
                    return Some(LiveUpdate::Resync);
                }
                Err(RecvError::Closed) => {
                    self.unsubscribe();
                    return None;
                }
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        if self.state == SubscriptionState::Active {
            self.hub.inner.active.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("Subscription {:?} closed", self.scope);
        }
        self.rx = None;
        self.state = SubscriptionState::Unsubscribed;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::message_at;
    use std::time::Duration;

    fn inserted(conversation_id: Uuid, sender: Uuid, receiver: Uuid, secs: i64) -> MessageChange {
        MessageChange::Inserted(message_at(conversation_id, sender, receiver, secs))
    }

    async fn next_change(sub: &mut Subscription) -> ChangeEvent {
        match tokio::time::timeout(Duration::from_secs(1), sub.recv()).await {
            Ok(Some(LiveUpdate::Change(event))) => event,
            other => panic!("expected a change, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_and_active_count() {
        let hub = RealtimeHub::new(16);
        let mut sub = hub.subscription(SubscriptionScope::Conversation(Uuid::now_v7()));

        assert_eq!(sub.state(), SubscriptionState::Inactive);
        assert_eq!(hub.active_subscriptions(), 0);

        sub.activate().unwrap();
        sub.activate().unwrap();
        assert_eq!(sub.state(), SubscriptionState::Active);
        assert_eq!(hub.active_subscriptions(), 1);

        sub.unsubscribe();
        assert_eq!(sub.state(), SubscriptionState::Unsubscribed);
        assert_eq!(hub.active_subscriptions(), 0);
        assert!(sub.activate().is_err());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let hub = RealtimeHub::new(16);
        {
            let mut inbox = hub.subscription(SubscriptionScope::Inbox(Uuid::now_v7()));
            let mut room = hub.subscription(SubscriptionScope::Conversation(Uuid::now_v7()));
            inbox.activate().unwrap();
            room.activate().unwrap();
            assert_eq!(hub.active_subscriptions(), 2);
        }
        assert_eq!(hub.active_subscriptions(), 0);

        // never activated: dropping must not underflow the count
        drop(hub.subscription(SubscriptionScope::Inbox(Uuid::now_v7())));
        assert_eq!(hub.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_conversation_scope_preserves_commit_order() {
        let hub = RealtimeHub::new(64);
        let conversation = Uuid::now_v7();
        let other_conversation = Uuid::now_v7();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        let mut sub = hub.subscription(SubscriptionScope::Conversation(conversation));
        sub.activate().unwrap();

        let mut expected = Vec::new();
        for i in 0..10 {
            let (sender, receiver) = if i % 2 == 0 { (a, b) } else { (b, a) };
            let change = inserted(conversation, sender, receiver, i);
            expected.push(change.message_id());
            hub.publish(change);
            hub.publish(inserted(other_conversation, sender, receiver, i));
        }

        let mut received = Vec::new();
        let mut last_seq = 0;
        for _ in 0..10 {
            let event = next_change(&mut sub).await;
            assert!(event.seq > last_seq);
            last_seq = event.seq;
            assert_eq!(event.change.conversation_id(), conversation);
            received.push(event.change.message_id());
        }
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_inbox_scope_only_sees_own_messages() {
        let hub = RealtimeHub::new(16);
        let me = Uuid::now_v7();
        let mut inbox = hub.subscription(SubscriptionScope::Inbox(me));
        inbox.activate().unwrap();

        hub.publish(inserted(Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), 1));
        let mine = inserted(Uuid::now_v7(), Uuid::now_v7(), me, 2);
        hub.publish(mine.clone());

        assert_eq!(next_change(&mut inbox).await.change, mine);
    }

    #[tokio::test]
    async fn test_changes_before_activation_are_not_delivered() {
        let hub = RealtimeHub::new(16);
        let conversation = Uuid::now_v7();
        let mut sub = hub.subscription(SubscriptionScope::Conversation(conversation));

        hub.publish(inserted(conversation, Uuid::now_v7(), Uuid::now_v7(), 1));
        sub.activate().unwrap();
        let after = inserted(conversation, Uuid::now_v7(), Uuid::now_v7(), 2);
        hub.publish(after.clone());

        assert_eq!(next_change(&mut sub).await.change, after);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told_to_resync() {
        let hub = RealtimeHub::new(2);
        let conversation = Uuid::now_v7();
        let mut sub = hub.subscription(SubscriptionScope::Conversation(conversation));
        sub.activate().unwrap();

        for i in 0..5 {
            hub.publish(inserted(conversation, Uuid::now_v7(), Uuid::now_v7(), i));
        }

        assert_eq!(sub.recv().await, Some(LiveUpdate::Resync));
    }

    #[tokio::test]
    async fn test_gap_reaches_every_scope() {
        let hub = RealtimeHub::new(16);
        let mut inbox = hub.subscription(SubscriptionScope::Inbox(Uuid::now_v7()));
        let mut room = hub.subscription(SubscriptionScope::Conversation(Uuid::now_v7()));
        inbox.activate().unwrap();
        room.activate().unwrap();

        hub.signal_gap();

        assert_eq!(inbox.recv().await, Some(LiveUpdate::Resync));
        assert_eq!(room.recv().await, Some(LiveUpdate::Resync));
    }
}
