//! In-process endpoint backed by tokio channels
//!
//! `ChannelEndpoint::pair` returns two connected endpoints: what one sends
//! the other receives. Used as the loopback collaborator in tests.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::message::Message;

use super::{Endpoint, EndpointError};

/// One side of an in-process message channel
pub struct ChannelEndpoint {
    name: String,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl ChannelEndpoint {
    /// Create two endpoints wired to each other
    pub fn pair(a: impl Into<String>, b: impl Into<String>) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = Self {
            name: a.into(),
            outbound: a_tx,
            inbound: Mutex::new(a_rx),
        };
        let b = Self {
            name: b.into(),
            outbound: b_tx,
            inbound: Mutex::new(b_rx),
        };
        (a, b)
    }

    /// A single endpoint that receives what it sends
    pub fn loopback(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            outbound: tx,
            inbound: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl Endpoint for ChannelEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message) -> Result<(), EndpointError> {
        tracing::trace!(endpoint = %self.name, id = message.id(), "channel send");
        self.outbound
            .send(message)
            .map_err(|_| EndpointError::Closed)
    }

    async fn receive(&self, timeout: Duration) -> Result<Message, EndpointError> {
        let mut inbound = self.inbound.lock().await;
        match tokio::time::timeout(timeout, inbound.recv()).await {
            Ok(Some(message)) => {
                tracing::trace!(endpoint = %self.name, id = message.id(), "channel receive");
                Ok(message)
            }
            Ok(None) => Err(EndpointError::Closed),
            Err(_) => Err(EndpointError::Timeout(timeout)),
        }
    }
}
