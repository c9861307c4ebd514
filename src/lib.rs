pub mod app;
pub mod config;
pub mod counters;
pub mod error;
pub mod kv;
pub mod lease;
pub mod metrics;
pub mod models;
pub mod mutex;
pub mod sessions;
pub mod store;

pub use app::{router, AppState};
