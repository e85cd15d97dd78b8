//! Real-time chat room client: Google sign-in through Firebase Authentication
//! and a single Cloud Firestore message collection, rendered with egui.

pub mod common;
pub mod config;
pub mod network;
pub mod ui;
