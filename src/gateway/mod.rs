//! Gateway identity and the bus topics scoped to it.

pub mod identity;
pub mod topics;

pub use identity::{resolve_identity, GatewayIdentity, IdentityError};
pub use topics::{resolve_topics, TopicError, TopicRecord, TopicSet, TopicSource, TopicStore};
