//! Receive action
//!
//! Builds the expected message, waits for the actual one, validates it and
//! only then stores it and extracts variables from it.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::builder::MessageContentBuilder;
use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::correlation;
use crate::endpoint::{Endpoint, EndpointError};
use crate::message::{Message, MessageType};
use crate::validation::{self, ValidationContext};

/// A value copied from the received message into a variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Header { header: String, variable: String },
    Payload { path: String, variable: String },
}

impl Extraction {
    pub fn header(header: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::Header {
            header: header.into(),
            variable: variable.into(),
        }
    }

    pub fn payload(path: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::Payload {
            path: path.into(),
            variable: variable.into(),
        }
    }
}

/// Wait for a message on an endpoint and validate it
#[derive(Clone)]
pub struct ReceiveAction {
    endpoint: Arc<dyn Endpoint>,
    builder: MessageContentBuilder,
    validation: ValidationContext,
    message_name: Option<String>,
    timeout: Option<Duration>,
    correlation_header: Option<String>,
    extractions: Vec<Extraction>,
}

impl std::fmt::Debug for ReceiveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveAction")
            .field("endpoint", &self.endpoint.name())
            .field("builder", &self.builder)
            .field("validation", &self.validation)
            .field("timeout", &self.timeout)
            .field("correlation_header", &self.correlation_header)
            .field("extractions", &self.extractions)
            .finish()
    }
}

impl ReceiveAction {
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        message_type: MessageType,
        builder: MessageContentBuilder,
    ) -> Self {
        Self {
            endpoint,
            builder,
            validation: ValidationContext::new(message_type),
            message_name: None,
            timeout: None,
            correlation_header: None,
            extractions: Vec::new(),
        }
    }

    /// Replace the validation settings (the message type comes with them)
    pub fn validation(mut self, validation: ValidationContext) -> Self {
        self.validation = validation;
        self
    }

    pub fn ignore(mut self, path: impl Into<String>) -> Self {
        self.validation = self.validation.ignore(path);
        self
    }

    pub fn validate_element(mut self, path: impl Into<String>, expected: impl Into<String>) -> Self {
        self.validation = self.validation.validate_element(path, expected);
        self
    }

    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.validation = self.validation.namespace(prefix, uri);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Only accept messages whose `header` resolves a pending correlation entry
    pub fn correlate(mut self, header: impl Into<String>) -> Self {
        self.correlation_header = Some(header.into());
        self
    }

    pub fn message_name(mut self, name: impl Into<String>) -> Self {
        self.message_name = Some(name.into());
        self
    }

    pub fn extract(mut self, extraction: Extraction) -> Self {
        self.extractions.push(extraction);
        self
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.name()
    }

    pub(crate) async fn execute(&self, context: &TestContext) -> Result<()> {
        let message_type = self.validation.message_type;
        let expected = self.builder.build(context, message_type)?;
        let timeout = self
            .timeout
            .unwrap_or_else(|| context.config().timeouts.receive());

        let actual = match &self.correlation_header {
            Some(header) => self.receive_correlated(context, header, timeout).await?,
            None => match context.correlation().take_parked(self.endpoint.name()) {
                Some(message) => {
                    tracing::debug!(id = message.id(), "taking parked message");
                    message
                }
                None => self
                    .endpoint
                    .receive(timeout)
                    .await
                    .map_err(|source| self.receive_error(source))?,
            },
        };
        tracing::info!(endpoint = self.endpoint.name(), id = actual.id(), "message received");

        let resolved = self.validation.resolve(context)?;
        validation::validate_message(&actual, &expected, &resolved, context)?;

        let name = self
            .message_name
            .as_deref()
            .unwrap_or_else(|| self.endpoint.name());
        context.store_message(name, actual.clone());

        for extraction in &self.extractions {
            let (variable, value) = match extraction {
                Extraction::Header { header, variable } => {
                    let value = actual.get_header(header).map(ToString::to_string).ok_or_else(|| {
                        Error::validation_failed(&format!("header:{header}"), "<present>", "<missing>")
                    })?;
                    (variable, value)
                }
                Extraction::Payload { path, variable } => {
                    let path = context.resolve(path)?;
                    let value = validation::extract_payload_value(
                        &actual,
                        message_type,
                        &path,
                        &resolved.namespaces,
                    )?;
                    (variable, value)
                }
            };
            context.set_variable(variable, value)?;
        }
        Ok(())
    }

    async fn receive_correlated(
        &self,
        context: &TestContext,
        header: &str,
        timeout: Duration,
    ) -> Result<Message> {
        let manager = context.correlation();
        let deadline = Instant::now() + timeout;

        loop {
            if let Some((message, request)) = manager.claim_parked(self.endpoint.name(), header) {
                tracing::debug!(request = %request, "claimed parked message");
                return Ok(message);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(correlation::timeout(header, timeout));
            }
            let wait = (deadline - now).min(manager.poll_interval());

            match self.endpoint.receive(wait).await {
                Ok(message) => match manager.resolve(&message, header) {
                    Some(request) => {
                        tracing::debug!(request = %request, "correlated message received");
                        return Ok(message);
                    }
                    None => {
                        tracing::warn!(
                            endpoint = self.endpoint.name(),
                            id = message.id(),
                            "parking uncorrelated message"
                        );
                        manager.park(self.endpoint.name(), message);
                    }
                },
                Err(EndpointError::Timeout(_)) => continue,
                Err(source) => return Err(self.receive_error(source)),
            }
        }
    }

    fn receive_error(&self, source: EndpointError) -> Error {
        Error::Receive {
            endpoint: self.endpoint.name().to_string(),
            source,
        }
    }
}
