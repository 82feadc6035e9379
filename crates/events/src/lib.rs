//! `courier-events`: inbound hub message model and handler dispatch.
//!
//! Transport-agnostic: nothing here knows how messages arrive or where failed
//! ones are persisted. See `courier-infra` for the processor that wires these
//! together with durable stores.

pub mod context;
pub mod handler;
pub mod message;

pub use context::MessageContext;
pub use handler::{handler_fn, FnHandler, HandlerRegistry, MessageHandler};
pub use message::{DecodeError, LastError, RawMessage, DEFAULT_MAX_ATTEMPTS, MESSAGE_ID_KEY};
