use crate::common::{ChatMessage, Identity};

/// Which screen the session gate selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    ChatRoom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sign-in did not complete; shown under the sign-in button.
    SignIn(String),
    /// The last send was rejected; the draft is kept.
    SendFailed(String),
    /// The live message feed reported an error.
    Feed(String),
}

/// Local UI state.
pub struct AppState {
    pub identity: Option<Identity>,
    pub messages: Vec<ChatMessage>,
    pub input_text: String,
    pub scroll_to_bottom: bool,
    pub consent_url: Option<String>,
    pub notice: Option<Notice>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            identity: None,
            messages: Vec::new(),
            input_text: String::new(),
            scroll_to_bottom: false,
            consent_url: None,
            notice: None,
        }
    }

    pub fn screen(&self) -> Screen {
        if self.identity.is_some() {
            Screen::ChatRoom
        } else {
            Screen::SignIn
        }
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        if identity.is_none() {
            self.messages.clear();
            self.input_text.clear();
        } else {
            self.consent_url = None;
        }
        self.notice = None;
        self.identity = identity;
    }

    /// Snapshots carry the whole room, so the local list is swapped out as is.
    pub fn replace_messages(&mut self, messages: Vec<ChatMessage>) {
        if matches!(self.notice, Some(Notice::Feed(_))) {
            self.notice = None;
        }
        self.messages = messages;
    }

    /// Submit is only possible with a non-empty draft while signed in.
    pub fn can_submit(&self) -> bool {
        self.identity.is_some() && !self.input_text.is_empty()
    }

    pub fn on_message_sent(&mut self) {
        self.input_text.clear();
        self.scroll_to_bottom = true;
        if matches!(self.notice, Some(Notice::SendFailed(_))) {
            self.notice = None;
        }
    }

    pub fn on_send_failed(&mut self, reason: String) {
        self.notice = Some(Notice::SendFailed(reason));
    }

    pub fn on_sign_in_failed(&mut self, reason: String) {
        if self.identity.is_none() {
            self.notice = Some(Notice::SignIn(reason));
        }
    }

    pub fn on_feed_failed(&mut self, reason: String) {
        self.notice = Some(Notice::Feed(reason));
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Timestamp;

    fn alice() -> Identity {
        Identity {
            uid: "U1".into(),
            display_name: Some("Alice".into()),
            photo_url: None,
        }
    }

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            uid: "U1".into(),
            display_name: None,
            photo_url: None,
            text: id.into(),
            created_at: Timestamp::Pending,
        }
    }

    #[test]
    fn gate_follows_identity() {
        let mut state = AppState::new();
        assert_eq!(state.screen(), Screen::SignIn);
        state.set_identity(Some(alice()));
        assert_eq!(state.screen(), Screen::ChatRoom);
        state.set_identity(None);
        assert_eq!(state.screen(), Screen::SignIn);
    }

    #[test]
    fn empty_draft_cannot_be_submitted() {
        let mut state = AppState::new();
        state.set_identity(Some(alice()));
        assert!(!state.can_submit());
        state.input_text = " ".into();
        assert!(state.can_submit());
        state.input_text = "hi".into();
        assert!(state.can_submit());
    }

    #[test]
    fn signed_out_user_cannot_submit() {
        let mut state = AppState::new();
        state.input_text = "hi".into();
        assert!(!state.can_submit());
    }

    #[test]
    fn successful_send_clears_whatever_the_draft_holds() {
        let mut state = AppState::new();
        state.set_identity(Some(alice()));
        state.input_text = "typed after submitting".into();

        state.on_message_sent();

        assert_eq!(state.input_text, "");
        assert!(state.scroll_to_bottom);
    }

    #[test]
    fn failed_send_keeps_the_draft() {
        let mut state = AppState::new();
        state.set_identity(Some(alice()));
        state.input_text = "hello".into();

        state.on_send_failed("offline".into());

        assert_eq!(state.input_text, "hello");
        assert_eq!(state.notice, Some(Notice::SendFailed("offline".into())));
        state.on_message_sent();
        assert_eq!(state.notice, None);
    }

    #[test]
    fn snapshot_replaces_the_whole_list() {
        let mut state = AppState::new();
        state.replace_messages(vec![message("a"), message("b")]);
        state.replace_messages(vec![message("c")]);
        assert_eq!(state.messages, vec![message("c")]);
    }

    #[test]
    fn feed_error_clears_on_next_snapshot() {
        let mut state = AppState::new();
        state.on_feed_failed("503".into());
        state.replace_messages(Vec::new());
        assert_eq!(state.notice, None);
    }

    #[test]
    fn sign_out_drops_room_contents() {
        let mut state = AppState::new();
        state.set_identity(Some(alice()));
        state.replace_messages(vec![message("a")]);
        state.input_text = "draft".into();

        state.set_identity(None);

        assert!(state.messages.is_empty());
        assert!(state.input_text.is_empty());
    }

    #[test]
    fn sign_in_failure_stays_on_sign_in_screen() {
        let mut state = AppState::new();
        state.on_sign_in_failed("cancelled".into());
        assert_eq!(state.screen(), Screen::SignIn);
        assert_eq!(state.notice, Some(Notice::SignIn("cancelled".into())));
    }
}
