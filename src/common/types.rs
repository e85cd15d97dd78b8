use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Creation time of a message. The store assigns it, so a freshly appended
/// record may still carry `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Pending,
    Resolved(DateTime<Utc>),
}

impl Timestamp {
    pub fn resolved(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Pending => None,
            Timestamp::Resolved(at) => Some(*at),
        }
    }
}

// Pending sorts after every resolved time: an unresolved server timestamp is
// always "now or later".
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Timestamp::Pending, Timestamp::Pending) => Ordering::Equal,
            (Timestamp::Pending, Timestamp::Resolved(_)) => Ordering::Greater,
            (Timestamp::Resolved(_), Timestamp::Pending) => Ordering::Less,
            (Timestamp::Resolved(a), Timestamp::Resolved(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A message record as delivered by the store.
///
/// Author fields are a copy taken when the message was written, so old
/// messages keep the name and avatar the author had at that time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub text: String,
    pub created_at: Timestamp,
}

/// Record handed to the store on send. `created_at` is always the
/// server-timestamp sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub text: String,
    pub created_at: Timestamp,
}

impl NewMessage {
    pub fn compose(author: &Identity, text: impl Into<String>) -> Self {
        Self {
            uid: author.uid.clone(),
            display_name: author.display_name.clone(),
            photo_url: author.photo_url.clone(),
            text: text.into(),
            created_at: Timestamp::Pending,
        }
    }
}

/// Avatar decoded to RGBA8, ready to upload as a texture.
#[derive(Debug, Clone)]
pub struct AvatarImage {
    pub url: String,
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn compose_copies_author_and_leaves_time_to_the_server() {
        let alice = Identity {
            uid: "U1".into(),
            display_name: Some("Alice".into()),
            photo_url: Some("p.png".into()),
        };

        let message = NewMessage::compose(&alice, "hello");

        assert_eq!(message.uid, "U1");
        assert_eq!(message.display_name.as_deref(), Some("Alice"));
        assert_eq!(message.photo_url.as_deref(), Some("p.png"));
        assert_eq!(message.text, "hello");
        assert_eq!(message.created_at, Timestamp::Pending);
    }

    #[test]
    fn pending_sorts_after_resolved() {
        let at = Timestamp::Resolved(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(at < Timestamp::Pending);
        assert_eq!(Timestamp::Pending.resolved(), None);
    }
}
