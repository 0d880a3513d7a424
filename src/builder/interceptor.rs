//! Message construction interceptors

use crate::common::Result;
use crate::context::TestContext;
use crate::message::{Message, MessageType};

/// Transform applied to a freshly built message
///
/// Interceptors run only for non-empty payloads, in the order: data
/// dictionary, context-global interceptors, builder-local interceptors.
pub trait MessageConstructionInterceptor: Send + Sync {
    fn intercept(
        &self,
        message: Message,
        message_type: MessageType,
        context: &TestContext,
    ) -> Result<Message>;
}

impl<F> MessageConstructionInterceptor for F
where
    F: Fn(Message, MessageType, &TestContext) -> Result<Message> + Send + Sync,
{
    fn intercept(
        &self,
        message: Message,
        message_type: MessageType,
        context: &TestContext,
    ) -> Result<Message> {
        self(message, message_type, context)
    }
}
