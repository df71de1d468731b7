//! In-memory, subscribable transcript state: the single source of UI truth
//! for conversations and their ordered message lists.
//!
//! Every mutation is one atomic state transition behind a single lock;
//! subscribers observe each committed state, never an intermediate one.

mod lease;
mod store;

pub use lease::StreamLease;
pub use store::{StoreSnapshot, Subscription, TranscriptStore};
