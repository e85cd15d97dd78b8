/// Commands the UI sends down to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    /// Start the interactive Google consent flow.
    SignIn,
    SignOut,
    /// Append a message authored by the current identity.
    SendMessage(String),
}
