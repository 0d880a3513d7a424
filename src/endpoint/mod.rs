//! Endpoint contract
//!
//! The engine never talks to a transport directly. Send and receive actions
//! hand messages to an [`Endpoint`] and treat both calls as potentially
//! blocking and fallible.

mod channel;

pub use channel::ChannelEndpoint;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::message::Message;

/// Failure reported by an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("no message within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("endpoint closed")]
    Closed,

    #[error("{0}")]
    Transport(String),
}

/// Send/receive primitives of an external collaborator
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    /// Hand a message to the transport
    async fn send(&self, message: Message) -> Result<(), EndpointError>;

    /// Wait up to `timeout` for the next inbound message
    async fn receive(&self, timeout: Duration) -> Result<Message, EndpointError>;
}
