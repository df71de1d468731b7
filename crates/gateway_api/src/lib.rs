//! LLM gateway client: request payloads, NDJSON stream decoding, and the
//! HTTP transport implementing the shared `chat_backend` stream contract.

mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod payload;
pub mod url;

pub use client::GatewayClient;
pub use config::GatewayConfig;
pub use decoder::NdjsonDecoder;
pub use error::GatewayError;
pub use events::StreamEvent;
pub use payload::{GatewayMessage, GatewayRequest};
