//! Terminal chat client for backends that stream replies as NDJSON.
//!
//! The chat logic ([`session`], [`client`], [`decode`], [`history`]) does not
//! depend on the terminal UI; [`app`], [`handler`], [`tui`] and [`ui`] adapt it
//! to ratatui.

pub mod app;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod handler;
pub mod history;
pub mod layout;
pub mod render;
pub mod session;
pub mod store;
pub mod tui;
pub mod ui;

pub use client::{ReplyEvent, StreamingChatClient};
pub use config::Config;
pub use error::{ChatError, StoreError};
pub use history::{History, Role, Turn};
pub use render::{RenderSurface, Transcript};
pub use session::ChatSession;
pub use store::{FileStore, MemoryStore, SessionStore};
