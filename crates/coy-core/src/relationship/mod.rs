//! Relationship gating between two users

mod machine;
mod service;
mod store;

pub use machine::{can_send, intent_for_add_action, resolve, RelationshipSnapshot};
pub use service::RelationshipService;
pub use store::{InMemoryRelationshipStore, RelationshipStore};
