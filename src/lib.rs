//! Client-side streaming core for a web chat application.
//!
//! The crate is organized around four cooperating parts:
//!
//! - [`TranscriptStore`] (re-exported from `transcript_store`): the single
//!   observable source of truth for conversations, messages, and stream
//!   leases.
//! - The NDJSON decoder and gateway transport in `gateway_api`, consumed
//!   here through the [`StreamTransport`] trait.
//! - The streaming session manager, which drives one assistant response
//!   per lease with throttled flushing, retry with linear backoff, and
//!   last-send-wins supersession.
//! - The [`ReconciliationEngine`], which merges authoritative server
//!   snapshots into local state without corrupting in-flight streams.
//!
//! [`ChatClient`] ties these together behind one facade.

mod client;
mod config;
mod error;
mod reconcile;
mod session;

pub use chat_backend::{
    Attachment, AttachmentKind, BackendError, ByteStream, Conversation, ConversationId, Message,
    MessageContent, MessagePart, OutboundMessage, Role, StreamRequest, StreamTransport,
    SystemOfRecord, TransportError,
};
pub use client::{ChatClient, SendOutcome, SendStatus};
pub use config::{ChatConfig, ChatContext};
pub use error::ChatError;
pub use reconcile::ReconciliationEngine;
pub use session::SessionState;
pub use transcript_store::{StoreSnapshot, StreamLease, Subscription, TranscriptStore};
