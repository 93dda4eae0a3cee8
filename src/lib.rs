//! Support chat session client.
//!
//! Customers and support agents exchange messages on a shared STOMP topic
//! over WebSocket. [`ChatSession`] is the only type a presentation layer
//! needs: it connects, sends, disconnects, and publishes the message history
//! and connection flag as observable channels.

pub mod common;
pub mod config;
pub mod error;
pub mod history;
pub mod network;
pub mod session;

pub use common::{ChatMessage, MessageKind, SenderRole, Subscription};
pub use config::AppConfig;
pub use error::SessionError;
pub use session::ChatSession;
