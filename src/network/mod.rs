pub mod client;
pub mod codec;
pub mod frame;
pub mod transport;

pub use client::StompClient;
