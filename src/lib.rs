//! relaytest - integration-test orchestration engine
//!
//! Drives declared sequences of message send/receive actions against
//! endpoints, validates received content against expected templates with
//! partial-match semantics, and binds runtime variables across steps.

pub mod actions;
pub mod builder;
pub mod common;
pub mod context;
pub mod correlation;
pub mod endpoint;
pub mod message;
pub mod testcase;
pub mod validation;

// Re-export commonly used types
pub use actions::{Extraction, Iterate, IterateCondition, ReceiveAction, SendAction, TestAction};
pub use builder::{DataDictionary, MessageContentBuilder};
pub use common::{Config, Error, Result};
pub use context::TestContext;
pub use correlation::{CorrelationKeySource, CorrelationManager};
pub use endpoint::{ChannelEndpoint, Endpoint, EndpointError};
pub use message::{HeaderValue, Message, MessageType, Payload};
pub use testcase::{TestCase, TestCaseState, TestResult};
pub use validation::{MessageValidator, ValidationContext};
