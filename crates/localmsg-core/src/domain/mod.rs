//! Domain model (messages, destinations, errors).

pub mod destination;
pub mod errors;
pub mod message;

pub use self::destination::Destination;
pub use self::errors::{BoxError, BrokerError, OutboxError, RoutingError, StoreError};
pub use self::message::{Message, MessageDraft, MessageId, MessageStatus};
