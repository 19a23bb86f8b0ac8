//! Client-side state sync and auto-save for quest logs.
//!
//! [`session::QuestLogSession`] is the entry point: it owns the in-memory
//! collection, debounces saves and mirrors every save into a local cache
//! so edits survive a missing server.

pub mod autosave;
pub mod cli;
pub mod client;
pub mod clock;
pub mod error;
pub mod metadata;
pub mod notify;
pub mod persistence;
pub mod session;
pub mod shell;
pub mod storage;
pub mod store;
pub mod testing;
pub mod transfer;
pub mod types;
pub mod view;

pub use error::{ServiceError, ServiceResult};
pub use session::{QuestLogSession, SessionConfig};
