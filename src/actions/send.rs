//! Send action

use std::sync::Arc;

use crate::builder::MessageContentBuilder;
use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::correlation::{self, CorrelationKeySource};
use crate::endpoint::Endpoint;
use crate::message::MessageType;

/// Build a message and hand it to an endpoint
#[derive(Clone)]
pub struct SendAction {
    endpoint: Arc<dyn Endpoint>,
    message_type: MessageType,
    builder: MessageContentBuilder,
    message_name: Option<String>,
    correlation: Option<CorrelationKeySource>,
}

impl std::fmt::Debug for SendAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendAction")
            .field("endpoint", &self.endpoint.name())
            .field("message_type", &self.message_type)
            .field("builder", &self.builder)
            .field("message_name", &self.message_name)
            .field("correlation", &self.correlation)
            .finish()
    }
}

impl SendAction {
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        message_type: MessageType,
        builder: MessageContentBuilder,
    ) -> Self {
        Self {
            endpoint,
            message_type,
            builder,
            message_name: None,
            correlation: None,
        }
    }

    /// Name under which the sent message is stored (defaults to the endpoint name)
    pub fn message_name(mut self, name: impl Into<String>) -> Self {
        self.message_name = Some(name.into());
        self
    }

    /// Register a correlation key for the outgoing message
    pub fn correlate(mut self, source: CorrelationKeySource) -> Self {
        self.correlation = Some(source);
        self
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.name()
    }

    pub(crate) async fn execute(&self, context: &TestContext) -> Result<()> {
        let message = self.builder.build(context, self.message_type)?;

        let key = match &self.correlation {
            Some(CorrelationKeySource::Header(header)) => {
                Some(correlation::key_from_message(&message, header)?)
            }
            Some(CorrelationKeySource::Variable(name)) => Some(context.variable(name)?),
            None => None,
        };

        let name = self
            .message_name
            .as_deref()
            .unwrap_or_else(|| self.endpoint.name());
        context.store_message(name, message.clone());

        let id = message.id().to_string();
        self.endpoint
            .send(message)
            .await
            .map_err(|source| Error::Send {
                endpoint: self.endpoint.name().to_string(),
                source,
            })?;

        // Registered only once the transport accepted the message
        if let Some(key) = key {
            tracing::debug!(key = %key, id = %id, "registering correlation key");
            context.correlation().register(key, id.as_str());
        }

        tracing::info!(endpoint = self.endpoint.name(), id = %id, "message sent");
        Ok(())
    }
}
