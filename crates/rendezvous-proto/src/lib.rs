//! Rendezvous wire protocol
//!
//! JSON frames exchanged over the persistent chat connection. Outbound frames
//! are tagged by `action`, inbound frames by `type`.
//!
//! # Components
//!
//! - [`OutboundFrame`]: client to server actions
//! - [`InboundEvent`]: server to client events
//! - [`WireMessage`]: message object shared by push events and REST responses
//! - [`ConversationId`], [`MessageId`], [`MessageType`]: identifiers
//!
//! The bearer token is never part of a frame body. It travels only as a query
//! parameter on the connection URL.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod event;
mod frame;
mod ids;
mod message;

pub use errors::{ProtocolError, Result};
pub use event::InboundEvent;
pub use frame::OutboundFrame;
pub use ids::{ConversationId, MessageId, MessageType};
pub use message::WireMessage;
