//! Test actions
//!
//! A test case is a tree of [`TestAction`]s executed against one shared
//! context. Leaf actions report failures wrapped in `ActionFailed` with
//! their name; containers pass the failure of their child through.

mod condition;
mod container;
mod receive;
mod send;

pub use condition::{IterateCondition, IteratePredicate};
pub use container::Iterate;
pub use receive::{Extraction, ReceiveAction};
pub use send::SendAction;

use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::context::TestContext;

/// Closure run by a custom action
pub type CustomFn = Arc<dyn Fn(&TestContext) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub enum TestAction {
    Send(SendAction),
    Receive(ReceiveAction),
    /// Resolve and assign variables in order
    CreateVariables(Vec<(String, String)>),
    /// Resolve a text and log it
    Echo(String),
    Sleep(Duration),
    Custom { name: String, action: CustomFn },
    Sequence(Vec<TestAction>),
    Parallel(Vec<TestAction>),
    Iterate(Iterate),
}

impl std::fmt::Debug for TestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(action) => std::fmt::Debug::fmt(action, f),
            Self::Receive(action) => std::fmt::Debug::fmt(action, f),
            Self::CreateVariables(variables) => {
                f.debug_tuple("CreateVariables").field(variables).finish()
            }
            Self::Echo(text) => f.debug_tuple("Echo").field(text).finish(),
            Self::Sleep(duration) => f.debug_tuple("Sleep").field(duration).finish(),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
            Self::Sequence(actions) => f.debug_tuple("Sequence").field(actions).finish(),
            Self::Parallel(actions) => f.debug_tuple("Parallel").field(actions).finish(),
            Self::Iterate(iterate) => std::fmt::Debug::fmt(iterate, f),
        }
    }
}

impl TestAction {
    pub fn create_variables<I, K, V>(variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::CreateVariables(
            variables
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn echo(text: impl Into<String>) -> Self {
        Self::Echo(text.into())
    }

    pub fn sleep(duration: Duration) -> Self {
        Self::Sleep(duration)
    }

    pub fn custom<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&TestContext) -> Result<()> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            action: Arc::new(action),
        }
    }

    pub fn sequence(actions: Vec<TestAction>) -> Self {
        Self::Sequence(actions)
    }

    pub fn parallel(actions: Vec<TestAction>) -> Self {
        Self::Parallel(actions)
    }

    pub fn iterate(iterate: Iterate) -> Self {
        Self::Iterate(iterate)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Send(_) => "send",
            Self::Receive(_) => "receive",
            Self::CreateVariables(_) => "create-variables",
            Self::Echo(_) => "echo",
            Self::Sleep(_) => "sleep",
            Self::Custom { name, .. } => name,
            Self::Sequence(_) => "sequential",
            Self::Parallel(_) => "parallel",
            Self::Iterate(_) => "iterate",
        }
    }

    /// Whether this action only groups other actions
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Sequence(_) | Self::Parallel(_) | Self::Iterate(_))
    }

    /// Run the action against `context`
    pub fn execute<'a>(&'a self, context: &'a Arc<TestContext>) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::info!(action = self.name(), "executing action");
            let result = match self {
                Self::Send(action) => action.execute(context).await,
                Self::Receive(action) => action.execute(context).await,
                Self::CreateVariables(variables) => create_variables(variables, context),
                Self::Echo(text) => context.resolve(text).map(|message| {
                    tracing::info!("{}", message);
                }),
                Self::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
                Self::Custom { action, .. } => action(context.as_ref()),
                Self::Sequence(actions) => return container::run_sequence(actions, context).await,
                Self::Parallel(actions) => return container::run_parallel(actions, context).await,
                Self::Iterate(iterate) => return iterate.execute(context).await,
            };
            result.map_err(|e| Error::in_action(self.name(), e))
        }
        .boxed()
    }
}

impl From<SendAction> for TestAction {
    fn from(action: SendAction) -> Self {
        Self::Send(action)
    }
}

impl From<ReceiveAction> for TestAction {
    fn from(action: ReceiveAction) -> Self {
        Self::Receive(action)
    }
}

impl From<Iterate> for TestAction {
    fn from(iterate: Iterate) -> Self {
        Self::Iterate(iterate)
    }
}

fn create_variables(variables: &[(String, String)], context: &TestContext) -> Result<()> {
    for (name, value) in variables {
        let value = context.resolve(value)?;
        context.set_variable(name, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MessageContentBuilder;
    use crate::correlation::CorrelationKeySource;
    use crate::endpoint::{ChannelEndpoint, Endpoint};
    use crate::message::{Message, MessageType};
    use parking_lot::Mutex;

    fn counter(name: &str, hits: &Arc<Mutex<Vec<String>>>) -> TestAction {
        let hits = Arc::clone(hits);
        TestAction::custom(name, move |context| {
            hits.lock().push(context.variable("i").unwrap_or_default());
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_create_variables_resolves_in_order() {
        let context = Arc::new(TestContext::new());
        TestAction::create_variables([("a", "1"), ("b", "${a}-2"), ("c", "core:upperCase('${b}x')")])
            .execute(&context)
            .await
            .unwrap();
        assert_eq!(context.variable("b").unwrap(), "1-2");
        assert_eq!(context.variable("c").unwrap(), "1-2X");
    }

    #[tokio::test]
    async fn test_leaf_failure_names_the_action() {
        let context = Arc::new(TestContext::new());
        let err = TestAction::echo("${missing}")
            .execute(&context)
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::ActionFailed { action, .. } if action == "echo"));
        assert!(matches!(err.root_cause(), Error::UnknownVariable { .. }));
    }

    #[tokio::test]
    async fn test_sequence_stops_at_first_failure() {
        let context = Arc::new(TestContext::new());
        let hits = Arc::new(Mutex::new(Vec::new()));
        let err = TestAction::sequence(vec![
            counter("first", &hits),
            TestAction::custom("broken", |_| Err(Error::Internal("boom".to_string()))),
            counter("never", &hits),
        ])
        .execute(&context)
        .await
        .unwrap_err();

        assert!(matches!(&err, Error::ActionFailed { action, .. } if action == "broken"));
        assert_eq!(hits.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_iterate_from_zero() {
        let context = Arc::new(TestContext::new());
        let hits = Arc::new(Mutex::new(Vec::new()));
        Iterate::new(IterateCondition::expression("i < 5"), vec![counter("count", &hits)])
            .start(0)
            .execute(&context)
            .await
            .unwrap();

        assert_eq!(*hits.lock(), ["0", "1", "2", "3", "4"]);
        assert_eq!(context.variable("i").unwrap(), "4");
    }

    #[tokio::test]
    async fn test_iterate_alias_condition() {
        let context = Arc::new(TestContext::new());
        let hits = Arc::new(Mutex::new(Vec::new()));
        TestAction::iterate(Iterate::new(
            IterateCondition::expression("i lt= 3"),
            vec![counter("count", &hits)],
        ))
        .execute(&context)
        .await
        .unwrap();

        assert_eq!(hits.lock().len(), 3);
        assert_eq!(context.variable("i").unwrap(), "3");
    }

    #[tokio::test]
    async fn test_iterate_false_condition_runs_nothing() {
        let context = Arc::new(TestContext::new());
        let hits = Arc::new(Mutex::new(Vec::new()));
        Iterate::new(IterateCondition::expression("i > 10"), vec![counter("count", &hits)])
            .execute(&context)
            .await
            .unwrap();
        assert!(hits.lock().is_empty());
        assert!(!context.has_variable("i"));
    }

    #[tokio::test]
    async fn test_iterate_with_predicate_and_step() {
        let context = Arc::new(TestContext::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        Iterate::new(
            IterateCondition::predicate(|index, _| index <= 10),
            vec![TestAction::custom("record", move |context| {
                sink.lock().push(context.variable("n")?);
                Ok(())
            })],
        )
        .index("n")
        .start(2)
        .step(4)
        .execute(&context)
        .await
        .unwrap();
        assert_eq!(*seen.lock(), ["2", "6", "10"]);
    }

    #[tokio::test]
    async fn test_iterate_zero_step_is_rejected() {
        let context = Arc::new(TestContext::new());
        let result = Iterate::new(IterateCondition::expression("i < 5"), Vec::new())
            .step(0)
            .execute(&context)
            .await;
        assert!(matches!(result, Err(Error::InvalidCondition { .. })));
    }

    #[tokio::test]
    async fn test_parallel_waits_for_all_branches() {
        let context = Arc::new(TestContext::new());
        let err = TestAction::parallel(vec![
            TestAction::custom("fails", |_| Err(Error::Internal("boom".to_string()))),
            TestAction::sequence(vec![
                TestAction::sleep(Duration::from_millis(50)),
                TestAction::create_variables([("slow", "done")]),
            ]),
        ])
        .execute(&context)
        .await
        .unwrap_err();

        assert!(matches!(&err, Error::ActionFailed { action, .. } if action == "fails"));
        assert_eq!(context.variable("slow").unwrap(), "done");
    }

    #[tokio::test]
    async fn test_parallel_branches_share_context() {
        let context = Arc::new(TestContext::new());
        let branches = (0..4)
            .map(|n| TestAction::create_variables([(format!("v{n}"), n.to_string())]))
            .collect();
        TestAction::parallel(branches).execute(&context).await.unwrap();
        for n in 0..4 {
            assert_eq!(context.variable(&format!("v{n}")).unwrap(), n.to_string());
        }
    }

    #[tokio::test]
    async fn test_send_then_receive_on_loopback() {
        let context = Arc::new(TestContext::new());
        context.set_variable("user", "Christoph").unwrap();
        let endpoint: Arc<dyn Endpoint> = Arc::new(ChannelEndpoint::loopback("loop"));

        let send = SendAction::new(
            Arc::clone(&endpoint),
            MessageType::Xml,
            MessageContentBuilder::template("<Hello><user>${user}</user></Hello>")
                .header("operation", "greet"),
        )
        .message_name("request");
        let receive = ReceiveAction::new(
            Arc::clone(&endpoint),
            MessageType::Xml,
            MessageContentBuilder::template("<Hello><user>@ignore@</user></Hello>")
                .header("operation", "greet"),
        )
        .message_name("response")
        .extract(Extraction::payload("//user", "received_user"))
        .extract(Extraction::header("operation", "received_operation"));

        TestAction::sequence(vec![send.into(), receive.into()])
            .execute(&context)
            .await
            .unwrap();

        assert_eq!(context.variable("received_user").unwrap(), "Christoph");
        assert_eq!(context.variable("received_operation").unwrap(), "greet");
        assert!(context.message("request").is_some());
        assert!(context.message("response").is_some());
    }

    #[tokio::test]
    async fn test_failed_validation_extracts_nothing() {
        let context = Arc::new(TestContext::new());
        let endpoint: Arc<dyn Endpoint> = Arc::new(ChannelEndpoint::loopback("loop"));
        endpoint.send(Message::new("<a>1</a>")).await.unwrap();

        let err = TestAction::from(
            ReceiveAction::new(
                Arc::clone(&endpoint),
                MessageType::Xml,
                MessageContentBuilder::template("<a>2</a>"),
            )
            .extract(Extraction::payload("/a", "value")),
        )
        .execute(&context)
        .await
        .unwrap_err();

        assert!(err.is_validation_failure());
        assert!(!context.has_variable("value"));
        assert!(context.message("loop").is_none());
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let context = Arc::new(TestContext::new());
        let endpoint: Arc<dyn Endpoint> = Arc::new(ChannelEndpoint::loopback("idle"));
        let err = TestAction::from(
            ReceiveAction::new(endpoint, MessageType::Plaintext, MessageContentBuilder::new())
                .timeout(Duration::from_millis(20)),
        )
        .execute(&context)
        .await
        .unwrap_err();
        assert!(matches!(err.root_cause(), Error::Receive { .. }));
    }

    #[tokio::test]
    async fn test_correlated_send_registers_key() {
        let context = Arc::new(TestContext::new());
        let endpoint: Arc<dyn Endpoint> = Arc::new(ChannelEndpoint::loopback("loop"));
        TestAction::from(
            SendAction::new(
                endpoint,
                MessageType::Plaintext,
                MessageContentBuilder::template("ping").header("cid", "c-1"),
            )
            .correlate(CorrelationKeySource::Header("cid".to_string())),
        )
        .execute(&context)
        .await
        .unwrap();
        assert!(context.correlation().is_pending("c-1"));
    }

    #[tokio::test]
    async fn test_correlation_header_missing_fails_send() {
        let context = Arc::new(TestContext::new());
        let endpoint: Arc<dyn Endpoint> = Arc::new(ChannelEndpoint::loopback("loop"));
        let err = TestAction::from(
            SendAction::new(endpoint, MessageType::Plaintext, MessageContentBuilder::template("x"))
                .correlate(CorrelationKeySource::Header("cid".to_string())),
        )
        .execute(&context)
        .await
        .unwrap_err();
        assert!(matches!(err.root_cause(), Error::MissingCorrelationKey(_)));
    }

    #[tokio::test]
    async fn test_failed_send_registers_no_key() {
        let context = Arc::new(TestContext::new());
        let (client, service) = ChannelEndpoint::pair("client", "service");
        drop(service);

        let err = TestAction::from(
            SendAction::new(
                Arc::new(client),
                MessageType::Plaintext,
                MessageContentBuilder::template("ping").header("cid", "c-1"),
            )
            .correlate(CorrelationKeySource::Header("cid".to_string())),
        )
        .execute(&context)
        .await
        .unwrap_err();

        assert!(matches!(err.root_cause(), Error::Send { .. }));
        assert!(!context.correlation().is_pending("c-1"));
        assert_eq!(context.correlation().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_plain_receive_takes_message_parked_by_correlated_one() {
        let context = Arc::new(TestContext::new());
        let endpoint: Arc<dyn Endpoint> = Arc::new(ChannelEndpoint::loopback("loop"));
        endpoint
            .send(Message::new("notification").header("cid", "none"))
            .await
            .unwrap();

        let request = SendAction::new(
            Arc::clone(&endpoint),
            MessageType::Plaintext,
            MessageContentBuilder::template("request").header("cid", "k1"),
        )
        .correlate(CorrelationKeySource::Header("cid".to_string()));
        let reply = ReceiveAction::new(
            Arc::clone(&endpoint),
            MessageType::Plaintext,
            MessageContentBuilder::template("request"),
        )
        .correlate("cid")
        .timeout(Duration::from_millis(200));
        TestAction::sequence(vec![request.into(), reply.into()])
            .execute(&context)
            .await
            .unwrap();
        assert_eq!(context.correlation().parked_count(), 1);

        TestAction::from(
            ReceiveAction::new(
                Arc::clone(&endpoint),
                MessageType::Plaintext,
                MessageContentBuilder::template("notification"),
            )
            .timeout(Duration::from_millis(200)),
        )
        .execute(&context)
        .await
        .unwrap();
        assert_eq!(context.correlation().parked_count(), 0);
    }
}
