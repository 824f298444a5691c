//! # vcm-transport
//!
//! In-process delivery of vector messages between agents.
//!
//! Each agent owns an [`AgentTransport`] with bounded inbound and outbound
//! queues. Sending never blocks: a full queue drops the message and counts it.
//! A background loop routes outbound messages
//!
//! - to the destination agent (unicast),
//! - to every broadcast subscriber when the message has no destination,
//! - to every member of a group for [`AgentTransport::send_multicast`],
//!
//! retrying with linear backoff before giving up. Targets are looked up among
//! directly connected peers first, then through an optional [`MessageBroker`].
//!
//! A second loop hands inbound messages to the handlers registered for their
//! intent, or to the mailbox read by [`AgentTransport::receive`].

#![deny(unsafe_code)]

pub mod agent;
pub mod broker;
pub mod config;
pub mod error;
pub mod handler;
pub mod stats;

pub use agent::AgentTransport;
pub use broker::{BrokerStats, MessageBroker};
pub use config::TransportConfig;
pub use error::TransportError;
pub use handler::{handler_fn, FnHandler, MessageHandler};
pub use stats::{TransportStats, TransportStatsSnapshot};
