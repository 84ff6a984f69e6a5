//! Data models for COY

mod ids;
mod message;
mod relationship;

pub use ids::{ConversationId, MessageId, UserId};
pub use message::{DeleteScope, Message, MessageKind, OutgoingMessage};
pub use relationship::{AddIntent, RelationshipGate, RelationshipStatus, RelationshipView};
