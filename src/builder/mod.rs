//! Message construction
//!
//! A [`MessageContentBuilder`] turns a payload source and header templates
//! into a concrete [`Message`] for one context: placeholders are resolved,
//! typed headers parsed, interceptors applied and header data attached. Send
//! actions build the outgoing message with it, receive actions the expected
//! one.

mod dictionary;
mod interceptor;

pub use dictionary::DataDictionary;
pub use interceptor::MessageConstructionInterceptor;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::message::{parse_typed_header, Message, MessageType, Payload};

/// Where the payload comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PayloadSource {
    /// Inline text with placeholders
    Template(String),
    /// File read at build time; text files are resolved like templates
    Resource(PathBuf),
    Binary(Vec<u8>),
    #[default]
    Empty,
}

/// Where the raw header data block comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSource {
    Inline(String),
    Resource(PathBuf),
}

#[derive(Clone, Default)]
pub struct MessageContentBuilder {
    payload: PayloadSource,
    headers: BTreeMap<String, String>,
    header_data: Option<HeaderSource>,
    data_dictionary: Option<Arc<DataDictionary>>,
    interceptors: Vec<Arc<dyn MessageConstructionInterceptor>>,
}

impl std::fmt::Debug for MessageContentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContentBuilder")
            .field("payload", &self.payload)
            .field("headers", &self.headers)
            .field("header_data", &self.header_data)
            .field("data_dictionary", &self.data_dictionary.as_ref().map(|d| d.name()))
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl MessageContentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with an inline payload template
    pub fn template(text: impl Into<String>) -> Self {
        Self::new().payload(PayloadSource::Template(text.into()))
    }

    /// Builder reading its payload from a file
    pub fn resource(path: impl Into<PathBuf>) -> Self {
        Self::new().payload(PayloadSource::Resource(path.into()))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new().payload(PayloadSource::Binary(bytes.into()))
    }

    pub fn payload(mut self, source: PayloadSource) -> Self {
        self.payload = source;
        self
    }

    /// Add a header template; `(type) literal` values become typed headers
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header_data(mut self, source: HeaderSource) -> Self {
        self.header_data = Some(source);
        self
    }

    pub fn data_dictionary(mut self, dictionary: DataDictionary) -> Self {
        self.data_dictionary = Some(Arc::new(dictionary));
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn MessageConstructionInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Build the message for `context`
    ///
    /// Any failure is reported as `MessageConstructionFailed` carrying the
    /// underlying cause.
    pub fn build(&self, context: &TestContext, message_type: MessageType) -> Result<Message> {
        self.build_message(context, message_type)
            .map_err(Error::construction)
    }

    fn build_message(&self, context: &TestContext, message_type: MessageType) -> Result<Message> {
        let payload = self.build_payload(context, message_type)?;

        let mut headers = BTreeMap::new();
        for (name, value) in context.resolve_map(&self.headers)? {
            headers.insert(name, parse_typed_header(&value)?);
        }

        let mut message = Message::with_headers(payload, headers);

        if !message.payload().is_empty() {
            if let Some(dictionary) = &self.data_dictionary {
                message = dictionary.intercept(message, message_type, context)?;
            }
            for interceptor in context.interceptors() {
                message = interceptor.intercept(message, message_type, context)?;
            }
            for interceptor in &self.interceptors {
                message = interceptor.intercept(message, message_type, context)?;
            }
        }

        if let Some(source) = &self.header_data {
            let raw = match source {
                HeaderSource::Inline(text) => text.clone(),
                HeaderSource::Resource(path) => read_text(path)?,
            };
            let data = context.resolve(&raw)?;
            if !data.trim().is_empty() {
                message.add_header_data(data);
            }
        }

        tracing::debug!(
            id = message.id(),
            %message_type,
            headers = message.headers().len(),
            "built message"
        );
        Ok(message)
    }

    fn build_payload(&self, context: &TestContext, message_type: MessageType) -> Result<Payload> {
        Ok(match &self.payload {
            PayloadSource::Template(text) => Payload::Text(context.resolve(text)?),
            PayloadSource::Resource(path) if message_type == MessageType::Binary => {
                Payload::Binary(std::fs::read(path).map_err(|e| file_error(path, e))?)
            }
            PayloadSource::Resource(path) => Payload::Text(context.resolve(&read_text(path)?)?),
            PayloadSource::Binary(bytes) => Payload::Binary(bytes.clone()),
            PayloadSource::Empty => Payload::default(),
        })
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| file_error(path, e))
}

fn file_error(path: &Path, error: std::io::Error) -> Error {
    Error::FileRead {
        path: path.display().to_string(),
        error: error.to_string(),
    }
}
