mod app;
mod components;
pub mod grouping;
pub mod state;
mod theme;

pub use app::ChatApp;
