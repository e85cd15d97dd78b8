pub mod auth;
pub mod avatar;
pub mod client;
pub mod firestore;
pub mod memory;
pub mod store;

pub use auth::{GoogleSession, SessionProvider};
pub use avatar::AvatarLoader;
pub use client::ChatClient;
pub use firestore::FirestoreStore;
pub use memory::{MemorySession, MemoryStore};
pub use store::MessageStore;
