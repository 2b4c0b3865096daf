//! Two-party chat for the event organizer app: conversations keyed by the
//! participant pair, a live message log, unread counters and a small
//! egui desktop front end.

pub mod chat;
pub mod common;
pub mod config;
pub mod error;
pub mod storage;
pub mod ui;
pub mod worker;

pub use chat::{ChatService, ChatSession, conversation_key};
pub use error::{ChatError, Result};
