//! In-process session and store, used by `--backend local` and by tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::common::{ChatMessage, Identity, NewMessage, Timestamp};

use super::auth::{AuthError, SessionProvider};
use super::store::{Direction, MessageStore, RoomQuery, SnapshotResult, StoreError, Subscription};

#[derive(Default)]
struct Inner {
    messages: Vec<ChatMessage>,
    received: Vec<NewMessage>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    changes: watch::Sender<Vec<ChatMessage>>,
    fail_appends: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
            fail_appends: false,
        }
    }

    /// Store whose appends are always rejected.
    pub fn rejecting() -> Self {
        Self {
            fail_appends: true,
            ..Self::new()
        }
    }

    /// Records exactly as handed to `append`.
    pub fn received(&self) -> Vec<NewMessage> {
        self.lock().received.clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, message: NewMessage) -> Result<String, StoreError> {
        if self.fail_appends {
            return Err(StoreError::Rejected {
                status: 503,
                body: "store unavailable".to_string(),
            });
        }

        let mut inner = self.lock();
        let now = Utc::now();
        // Server time never goes backwards within one store.
        let created_at = match inner.messages.last().and_then(|m| m.created_at.resolved()) {
            Some(previous) if previous >= now => previous + ChronoDuration::microseconds(1),
            _ => now,
        };
        let id = Uuid::new_v4().simple().to_string();

        inner.received.push(message.clone());
        inner.messages.push(ChatMessage {
            id: id.clone(),
            uid: message.uid,
            display_name: message.display_name,
            photo_url: message.photo_url,
            text: message.text,
            created_at: Timestamp::Resolved(created_at),
        });
        self.changes.send_replace(inner.messages.clone());
        Ok(id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for MemoryStore {
    fn subscribe(&self, query: RoomQuery, sink: mpsc::Sender<SnapshotResult>) -> Subscription {
        let mut changes = self.changes.subscribe();
        Subscription::new(tokio::spawn(async move {
            loop {
                let mut snapshot = changes.borrow_and_update().clone();
                if query.direction == Direction::Descending {
                    snapshot.reverse();
                }
                if sink.send(Ok(snapshot)).await.is_err() || changes.changed().await.is_err() {
                    break;
                }
            }
        }))
    }

    fn append(&self, message: NewMessage) -> BoxFuture<'_, Result<String, StoreError>> {
        Box::pin(async move { self.insert(message) })
    }
}

/// Session that signs in a fixed identity without any consent page.
pub struct MemorySession {
    identity: Identity,
    state: watch::Sender<Option<Identity>>,
    sign_in_calls: AtomicUsize,
    fail_sign_in: bool,
}

impl MemorySession {
    pub fn new(identity: Identity) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            identity,
            state,
            sign_in_calls: AtomicUsize::new(0),
            fail_sign_in: false,
        }
    }

    /// Session whose consent flow is always cancelled.
    pub fn cancelling(identity: Identity) -> Self {
        Self {
            fail_sign_in: true,
            ..Self::new(identity)
        }
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }
}

impl SessionProvider for MemorySession {
    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    fn sign_in(&self, _consent: mpsc::Sender<String>) -> BoxFuture<'_, Result<Identity, AuthError>> {
        Box::pin(async move {
            self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_sign_in {
                return Err(AuthError::Cancelled("closed by user".to_string()));
            }
            self.state.send_replace(Some(self.identity.clone()));
            Ok(self.identity.clone())
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(async move {
            self.state.send_replace(None);
            Ok(())
        })
    }

    fn id_token(&self) -> BoxFuture<'_, Result<String, AuthError>> {
        Box::pin(async move {
            match self.current() {
                Some(identity) => Ok(format!("local-{}", identity.uid)),
                None => Err(AuthError::NotSignedIn),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            uid: "U1".into(),
            display_name: Some("Alice".into()),
            photo_url: Some("p.png".into()),
        }
    }

    #[tokio::test]
    async fn store_receives_the_server_timestamp_sentinel() {
        let store = MemoryStore::new();
        store
            .append(NewMessage::compose(&alice(), "hello"))
            .await
            .unwrap();

        let received = store.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].uid, "U1");
        assert_eq!(received[0].display_name.as_deref(), Some("Alice"));
        assert_eq!(received[0].photo_url.as_deref(), Some("p.png"));
        assert_eq!(received[0].text, "hello");
        assert_eq!(received[0].created_at, Timestamp::Pending);
    }

    #[tokio::test]
    async fn appended_message_comes_back_through_the_subscription() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::channel(8);
        let _subscription = store.subscribe(RoomQuery::messages_by_creation(), tx);
        assert!(rx.recv().await.unwrap().unwrap().is_empty());

        let before = Utc::now();
        let id = store
            .append(NewMessage::compose(&alice(), "hello"))
            .await
            .unwrap();

        let snapshot = rx.recv().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].uid, "U1");
        assert_eq!(snapshot[0].text, "hello");
        assert!(snapshot[0].created_at.resolved().unwrap() >= before);
    }

    #[tokio::test]
    async fn creation_times_strictly_increase() {
        let store = MemoryStore::new();
        for text in ["a", "b", "c", "d"] {
            store.append(NewMessage::compose(&alice(), text)).await.unwrap();
        }
        let messages = store.messages();
        assert!(messages.windows(2).all(|pair| pair[0].created_at < pair[1].created_at));
    }

    #[tokio::test]
    async fn dropping_the_subscription_stops_delivery() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::channel(8);
        let subscription = store.subscribe(RoomQuery::messages_by_creation(), tx);
        rx.recv().await.unwrap().unwrap();
        assert!(subscription.is_active());

        drop(subscription);
        store.append(NewMessage::compose(&alice(), "late")).await.unwrap();

        // The aborted task drops its sender, which closes the channel.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn session_counts_sign_in_attempts() {
        let session = MemorySession::cancelling(alice());
        let (tx, _rx) = mpsc::channel(1);
        assert!(session.sign_in(tx.clone()).await.is_err());
        assert!(session.sign_in(tx).await.is_err());
        assert_eq!(session.sign_in_calls(), 2);
        assert!(session.current().is_none());
    }
}
