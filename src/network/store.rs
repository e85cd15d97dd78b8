use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{ChatMessage, NewMessage};

use super::auth::AuthError;

pub const MESSAGES_COLLECTION: &str = "messages";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed record: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// The one query this client issues: the whole room ordered by creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomQuery {
    pub collection: String,
    pub order_by: String,
    pub direction: Direction,
}

impl RoomQuery {
    pub fn messages_by_creation() -> Self {
        Self {
            collection: MESSAGES_COLLECTION.to_string(),
            order_by: "createdAt".to_string(),
            direction: Direction::Ascending,
        }
    }
}

pub type SnapshotResult = Result<Vec<ChatMessage>, StoreError>;

/// Live query handle. The feed task stops as soon as this is dropped.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Ordered, subscribable message collection.
pub trait MessageStore: Send + Sync {
    /// Pushes the full ordered result set into `sink` on every change.
    fn subscribe(&self, query: RoomQuery, sink: mpsc::Sender<SnapshotResult>) -> Subscription;

    /// Appends one record and returns its store-assigned id.
    fn append(&self, message: NewMessage) -> BoxFuture<'_, Result<String, StoreError>>;
}
