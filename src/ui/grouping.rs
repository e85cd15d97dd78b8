use crate::common::ChatMessage;

/// How one message sits in the rendered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    /// Authored by the signed-in user.
    pub sent: bool,
    /// Closes a run of consecutive messages from the same author.
    pub last_of_run: bool,
}

/// Classifies every message of an ordered list. Only affects rendering.
pub fn classify(messages: &[ChatMessage], current_uid: &str) -> Vec<MessageLayout> {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| MessageLayout {
            sent: message.uid == current_uid,
            last_of_run: messages
                .get(index + 1)
                .is_none_or(|next| next.uid != message.uid),
        })
        .collect()
}

/// Name shown when hovering a row's avatar slot. Spacer rows carry it too.
pub fn avatar_tooltip(message: &ChatMessage) -> Option<&str> {
    message.display_name.as_deref()
}
