use super::types::{AvatarImage, ChatMessage, Identity};

/// Events the backend pushes up to the UI.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    SessionChanged(Option<Identity>),
    /// The consent page the user has to visit to finish signing in.
    OpenConsentUrl(String),
    SignInFailed(String),
    /// Full ordered contents of the room; replaces whatever the UI holds.
    Snapshot(Vec<ChatMessage>),
    SubscriptionFailed(String),
    MessageSent { id: String },
    SendFailed { reason: String },
    AvatarLoaded(AvatarImage),
}
