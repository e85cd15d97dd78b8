use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{BackendCommand, BackendEvent, Identity, NewMessage};

use super::auth::SessionProvider;
use super::avatar::AvatarLoader;
use super::store::{MessageStore, RoomQuery, SnapshotResult, Subscription};

/// Backend event loop. Owns every call to the session provider and the
/// message store; the UI only sees `BackendEvent`s.
pub struct ChatClient {
    session: Arc<dyn SessionProvider>,
    store: Arc<dyn MessageStore>,
    avatars: Option<AvatarLoader>,
    event_sender: mpsc::Sender<BackendEvent>,
    command_receiver: mpsc::Receiver<BackendCommand>,
    subscription: Option<Subscription>,
    pending_sign_in: Option<JoinHandle<()>>,
}

impl ChatClient {
    pub fn new(
        session: Arc<dyn SessionProvider>,
        store: Arc<dyn MessageStore>,
        event_sender: mpsc::Sender<BackendEvent>,
        command_receiver: mpsc::Receiver<BackendCommand>,
    ) -> Self {
        Self {
            session,
            store,
            avatars: None,
            event_sender,
            command_receiver,
            subscription: None,
            pending_sign_in: None,
        }
    }

    pub fn with_avatars(mut self, loader: AvatarLoader) -> Self {
        self.avatars = Some(loader);
        self
    }

    pub async fn run(mut self) {
        let mut identity = self.session.watch();
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel::<SnapshotResult>(16);
        let (consent_tx, mut consent_rx) = mpsc::channel::<String>(4);

        let initial = identity.borrow_and_update().clone();
        self.on_identity_changed(initial, &snapshot_tx).await;
        log::info!("Backend event loop started");

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command, &consent_tx).await;
                    } else {
                        break;
                    }
                }
                changed = identity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = identity.borrow_and_update().clone();
                    self.on_identity_changed(current, &snapshot_tx).await;
                }
                Some(snapshot) = snapshot_rx.recv() => {
                    self.handle_snapshot(snapshot).await;
                }
                Some(url) = consent_rx.recv() => {
                    self.emit(BackendEvent::OpenConsentUrl(url)).await;
                }
            }
        }

        if let Some(task) = self.pending_sign_in.take() {
            task.abort();
        }
        log::info!("Backend event loop stopped");
    }

    async fn on_identity_changed(
        &mut self,
        identity: Option<Identity>,
        snapshot_tx: &mpsc::Sender<SnapshotResult>,
    ) {
        match &identity {
            Some(user) if self.subscription.is_none() => {
                log::info!("Opening message subscription for {}", user.uid);
                self.subscription = Some(
                    self.store
                        .subscribe(RoomQuery::messages_by_creation(), snapshot_tx.clone()),
                );
            }
            Some(_) => {}
            None => {
                if self.subscription.take().is_some() {
                    log::info!("Message subscription released");
                }
            }
        }
        self.emit(BackendEvent::SessionChanged(identity)).await;
    }

    async fn handle_command(&mut self, command: BackendCommand, consent_tx: &mpsc::Sender<String>) {
        match command {
            BackendCommand::SignIn => {
                if let Some(previous) = self.pending_sign_in.take() {
                    previous.abort();
                }
                let session = Arc::clone(&self.session);
                let events = self.event_sender.clone();
                let consent = consent_tx.clone();
                self.pending_sign_in = Some(tokio::spawn(async move {
                    if let Err(err) = session.sign_in(consent).await {
                        log::warn!("Sign-in did not complete: {err}");
                        let _ = events.send(BackendEvent::SignInFailed(err.to_string())).await;
                    }
                }));
            }
            BackendCommand::SignOut => {
                if let Err(err) = self.session.sign_out().await {
                    log::warn!("Sign-out failed: {err}");
                }
            }
            BackendCommand::SendMessage(text) => {
                let Some(author) = self.session.current() else {
                    self.emit(BackendEvent::SendFailed {
                        reason: "not signed in".to_string(),
                    })
                    .await;
                    return;
                };
                let store = Arc::clone(&self.store);
                let events = self.event_sender.clone();
                tokio::spawn(async move {
                    let event = match store.append(NewMessage::compose(&author, text)).await {
                        Ok(id) => BackendEvent::MessageSent { id },
                        Err(err) => {
                            log::error!("Failed to append message: {err}");
                            BackendEvent::SendFailed {
                                reason: err.to_string(),
                            }
                        }
                    };
                    let _ = events.send(event).await;
                });
            }
        }
    }

    async fn handle_snapshot(&mut self, snapshot: SnapshotResult) {
        // Snapshots still queued from a released subscription.
        if self.subscription.is_none() {
            return;
        }
        match snapshot {
            Ok(messages) => {
                if let Some(avatars) = self.avatars.as_mut() {
                    avatars.load_for(&messages, &self.event_sender);
                }
                self.emit(BackendEvent::Snapshot(messages)).await;
            }
            Err(err) => {
                self.emit(BackendEvent::SubscriptionFailed(err.to_string())).await;
            }
        }
    }

    async fn emit(&self, event: BackendEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::common::Timestamp;
    use crate::network::memory::{MemorySession, MemoryStore};

    fn alice() -> Identity {
        Identity {
            uid: "U1".into(),
            display_name: Some("Alice".into()),
            photo_url: Some("p.png".into()),
        }
    }

    struct Harness {
        commands: mpsc::Sender<BackendCommand>,
        events: mpsc::Receiver<BackendEvent>,
    }

    impl Harness {
        fn start(session: Arc<dyn SessionProvider>, store: Arc<dyn MessageStore>) -> Self {
            let (cmd_tx, cmd_rx) = mpsc::channel(16);
            let (event_tx, event_rx) = mpsc::channel(64);
            tokio::spawn(ChatClient::new(session, store, event_tx, cmd_rx).run());
            Self {
                commands: cmd_tx,
                events: event_rx,
            }
        }

        async fn send(&self, command: BackendCommand) {
            self.commands.send(command).await.unwrap();
        }

        async fn next(&mut self) -> BackendEvent {
            tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("backend went quiet")
                .expect("backend stopped")
        }

        async fn next_matching(&mut self, wanted: impl Fn(&BackendEvent) -> bool) -> BackendEvent {
            loop {
                let event = self.next().await;
                if wanted(&event) {
                    return event;
                }
            }
        }
    }

    #[tokio::test]
    async fn starts_signed_out() {
        let mut harness = Harness::start(
            Arc::new(MemorySession::new(alice())),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(harness.next().await, BackendEvent::SessionChanged(None)));
    }

    #[tokio::test]
    async fn sign_in_opens_the_room_and_streams_history() {
        let store = Arc::new(MemoryStore::new());
        store
            .append(NewMessage::compose(&alice(), "earlier"))
            .await
            .unwrap();
        let mut harness = Harness::start(Arc::new(MemorySession::new(alice())), store);

        harness.send(BackendCommand::SignIn).await;

        let session = harness
            .next_matching(|e| matches!(e, BackendEvent::SessionChanged(Some(_))))
            .await;
        assert!(matches!(session, BackendEvent::SessionChanged(Some(user)) if user.uid == "U1"));
        let BackendEvent::Snapshot(messages) = harness
            .next_matching(|e| matches!(e, BackendEvent::Snapshot(_)))
            .await
        else {
            unreachable!()
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "earlier");
    }

    #[tokio::test]
    async fn each_sign_in_command_runs_the_flow_once() {
        let session = Arc::new(MemorySession::cancelling(alice()));
        let mut harness = Harness::start(session.clone(), Arc::new(MemoryStore::new()));

        harness.send(BackendCommand::SignIn).await;
        harness
            .next_matching(|e| matches!(e, BackendEvent::SignInFailed(_)))
            .await;
        harness.send(BackendCommand::SignIn).await;
        harness
            .next_matching(|e| matches!(e, BackendEvent::SignInFailed(_)))
            .await;

        assert_eq!(session.sign_in_calls(), 2);
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn sent_message_is_acknowledged_and_echoed() {
        let store = Arc::new(MemoryStore::new());
        let mut harness = Harness::start(Arc::new(MemorySession::new(alice())), store.clone());
        harness.send(BackendCommand::SignIn).await;
        harness
            .next_matching(|e| matches!(e, BackendEvent::Snapshot(_)))
            .await;

        harness.send(BackendCommand::SendMessage("hello".into())).await;

        harness
            .next_matching(|e| matches!(e, BackendEvent::MessageSent { .. }))
            .await;
        let received = store.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].uid, "U1");
        assert_eq!(received[0].text, "hello");
        assert_eq!(received[0].created_at, Timestamp::Pending);

        let BackendEvent::Snapshot(messages) = harness
            .next_matching(|e| matches!(e, BackendEvent::Snapshot(m) if !m.is_empty()))
            .await
        else {
            unreachable!()
        };
        assert_eq!(messages[0].text, "hello");
        assert!(messages[0].created_at.resolved().is_some());
    }

    #[tokio::test]
    async fn rejected_append_is_reported() {
        let mut harness = Harness::start(
            Arc::new(MemorySession::new(alice())),
            Arc::new(MemoryStore::rejecting()),
        );
        harness.send(BackendCommand::SignIn).await;
        harness
            .next_matching(|e| matches!(e, BackendEvent::SessionChanged(Some(_))))
            .await;

        harness.send(BackendCommand::SendMessage("hello".into())).await;

        let event = harness
            .next_matching(|e| matches!(e, BackendEvent::SendFailed { .. }))
            .await;
        assert!(matches!(event, BackendEvent::SendFailed { reason } if reason.contains("503")));
    }

    #[tokio::test]
    async fn send_without_identity_fails() {
        let mut harness = Harness::start(
            Arc::new(MemorySession::new(alice())),
            Arc::new(MemoryStore::new()),
        );
        harness.send(BackendCommand::SendMessage("hello".into())).await;
        let event = harness
            .next_matching(|e| matches!(e, BackendEvent::SendFailed { .. }))
            .await;
        assert!(matches!(event, BackendEvent::SendFailed { reason } if reason == "not signed in"));
    }

    #[tokio::test]
    async fn sign_out_closes_the_room() {
        let store = Arc::new(MemoryStore::new());
        let mut harness = Harness::start(Arc::new(MemorySession::new(alice())), store.clone());
        harness.send(BackendCommand::SignIn).await;
        harness
            .next_matching(|e| matches!(e, BackendEvent::Snapshot(_)))
            .await;

        harness.send(BackendCommand::SignOut).await;
        harness
            .next_matching(|e| matches!(e, BackendEvent::SessionChanged(None)))
            .await;

        store
            .append(NewMessage::compose(&alice(), "after sign-out"))
            .await
            .unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(200), harness.events.recv()).await;
        assert!(quiet.is_err(), "no snapshot expected once the room is closed");
    }
}
