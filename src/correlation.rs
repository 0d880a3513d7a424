//! Request/response correlation
//!
//! A send registers the correlation key of its outgoing message. A
//! correlated receive looks the same field up on incoming messages; a hit
//! consumes the entry. Inbound messages that match nothing are parked under
//! the endpoint they arrived on, so a later receive on that endpoint, plain
//! or waiting for a different key, can still claim them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::message::Message;

/// Where a correlation key is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationKeySource {
    /// A header of the message
    Header(String),
    /// A context variable (send side only)
    Variable(String),
}

/// Pending correlation entries plus parked inbound messages
#[derive(Debug)]
pub struct CorrelationManager {
    pending: Mutex<HashMap<String, String>>,
    /// (endpoint name, message) in arrival order
    parked: Mutex<Vec<(String, Message)>>,
    poll_interval: Duration,
}

impl CorrelationManager {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            parked: Mutex::new(Vec::new()),
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Register a pending request under its key
    ///
    /// A key registered twice keeps only the newest request.
    pub fn register(&self, key: impl Into<String>, pending_request_id: impl Into<String>) {
        let key = key.into();
        let id = pending_request_id.into();
        if let Some(previous) = self.pending.lock().insert(key.clone(), id) {
            tracing::warn!(key = %key, previous = %previous, "correlation key re-registered");
        }
    }

    /// Consume the entry for `key`
    pub fn resolve_key(&self, key: &str) -> Option<String> {
        self.pending.lock().remove(key)
    }

    /// Consume the entry matching the message's `header`
    pub fn resolve(&self, message: &Message, header: &str) -> Option<String> {
        let key = message.get_header(header)?.to_string();
        self.resolve_key(&key)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Keep a message that arrived on `endpoint` for a later receive there
    pub fn park(&self, endpoint: &str, message: Message) {
        self.parked.lock().push((endpoint.to_string(), message));
    }

    /// Claim the first message parked for `endpoint` whose `header` resolves
    /// a pending entry
    ///
    /// Returns the message together with the pending request id it consumed.
    pub fn claim_parked(&self, endpoint: &str, header: &str) -> Option<(Message, String)> {
        let mut parked = self.parked.lock();
        let mut pending = self.pending.lock();
        let (index, id) = parked.iter().enumerate().find_map(|(i, (from, m))| {
            if from != endpoint {
                return None;
            }
            let key = m.get_header(header)?.to_string();
            pending.remove(&key).map(|id| (i, id))
        })?;
        Some((parked.remove(index).1, id))
    }

    /// Take the oldest message parked for `endpoint`
    pub fn take_parked(&self, endpoint: &str) -> Option<Message> {
        let mut parked = self.parked.lock();
        let index = parked.iter().position(|(from, _)| from == endpoint)?;
        Some(parked.remove(index).1)
    }

    pub fn parked_count(&self) -> usize {
        self.parked.lock().len()
    }
}

/// Read a correlation key from a message header
pub(crate) fn key_from_message(message: &Message, header: &str) -> Result<String> {
    message
        .get_header(header)
        .map(ToString::to_string)
        .ok_or_else(|| Error::MissingCorrelationKey(header.to_string()))
}

/// Timeout error for a correlated receive
pub(crate) fn timeout(key: &str, timeout: Duration) -> Error {
    Error::CorrelationTimeout {
        key: key.to_string(),
        timeout,
    }
}
