pub mod commands;
pub mod observable;
pub mod types;

pub use commands::SessionCommand;
pub use observable::{Observable, Subscription};
pub use types::{ChatMessage, Identity, MessageKind, SenderRole};
