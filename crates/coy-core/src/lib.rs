//! coy-core - Core library for COY one-to-one messaging
//!
//! This crate contains the relationship state machine that gates a
//! conversation, the message sync engine that keeps an ordered timeline in
//! step with the server, and the optimistic update coordinator used by every
//! local mutation. The external stores are traits with in-memory
//! implementations for tests and tooling.

pub mod config;
pub mod conversation;
pub mod error;
pub mod export;
pub mod models;
pub mod optimistic;
pub mod relationship;
pub mod store;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use conversation::{Conversation, ConversationEvent};
pub use error::{Error, Result};
pub use models::{
    AddIntent, ConversationId, DeleteScope, Message, MessageId, MessageKind, OutgoingMessage,
    RelationshipGate, RelationshipStatus, RelationshipView, UserId,
};
