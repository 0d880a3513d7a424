//! Test context
//!
//! One context lives for one test case run. It owns the variables, function
//! libraries, validators, global construction interceptors, the message
//! store and the correlation table. Parallel branches of the same run share
//! it through an `Arc`; writes to distinct variable names from concurrent
//! branches are safe, writes to the same name race.

mod functions;
mod variables;

pub use functions::{FunctionFn, FunctionLibrary};
pub use variables::VariableStore;

pub(crate) use functions::java_date_format;
pub(crate) use variables::{split_arguments, unquote};

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::builder::MessageConstructionInterceptor;
use crate::common::{Config, Result};
use crate::correlation::CorrelationManager;
use crate::message::{Message, MessageType};
use crate::validation::{self, MessageValidator};

use variables::Resolver;

/// Shared state of one test case run
pub struct TestContext {
    config: Config,
    variables: VariableStore,
    libraries: Vec<FunctionLibrary>,
    validators: Vec<Arc<dyn MessageValidator>>,
    interceptors: Vec<Arc<dyn MessageConstructionInterceptor>>,
    messages: RwLock<HashMap<String, Message>>,
    correlation: CorrelationManager,
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("variables", &self.variables.snapshot())
            .field("libraries", &self.libraries)
            .field("validators", &self.validators.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Create a context with default settings
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a context from engine settings
    ///
    /// Seeds the configured global variables, the built-in function library
    /// and the default validators.
    pub fn with_config(config: Config) -> Self {
        let variables = VariableStore::new();
        for (name, value) in &config.variables {
            if let Err(e) = variables.set(name, value.clone()) {
                tracing::warn!("Skipping global variable: {}", e);
            }
        }

        Self {
            libraries: vec![FunctionLibrary::core(&config.functions.prefix)],
            validators: validation::default_validators(),
            interceptors: Vec::new(),
            messages: RwLock::new(HashMap::new()),
            correlation: CorrelationManager::new(config.timeouts.poll_interval()),
            variables,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Variables ===

    pub fn set_variable(&self, name: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        tracing::debug!(name, value = %value, "set variable");
        self.variables.set(name, value)
    }

    /// Value of a variable, with placeholders inside it resolved
    pub fn variable(&self, name: &str) -> Result<String> {
        Resolver::new(&self.variables, &self.libraries).variable(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Replace every placeholder and function call in `text`
    pub fn resolve(&self, text: &str) -> Result<String> {
        Resolver::new(&self.variables, &self.libraries).resolve(text)
    }

    /// Resolve every value of a map, keeping its keys
    pub fn resolve_map(&self, map: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        let resolver = Resolver::new(&self.variables, &self.libraries);
        map.iter()
            .map(|(k, v)| Ok((k.clone(), resolver.resolve(v)?)))
            .collect()
    }

    // === Functions ===

    pub fn add_function_library(&mut self, library: FunctionLibrary) {
        self.libraries.retain(|l| l.prefix() != library.prefix());
        self.libraries.push(library);
    }

    pub fn function_library_mut(&mut self, prefix: &str) -> Option<&mut FunctionLibrary> {
        self.libraries.iter_mut().find(|l| l.prefix() == prefix)
    }

    // === Validators ===

    /// Register a validator; later registrations take precedence
    pub fn add_validator(&mut self, validator: Arc<dyn MessageValidator>) {
        self.validators.insert(0, validator);
    }

    /// First registered validator supporting `message_type`
    pub fn validator_for(&self, message_type: MessageType) -> Option<&Arc<dyn MessageValidator>> {
        self.validators.iter().find(|v| v.supports(message_type))
    }

    // === Construction interceptors ===

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn MessageConstructionInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn interceptors(&self) -> &[Arc<dyn MessageConstructionInterceptor>] {
        &self.interceptors
    }

    // === Message store ===

    /// Remember the last message sent or received under `name`
    pub fn store_message(&self, name: &str, message: Message) {
        self.messages.write().insert(name.to_string(), message);
    }

    pub fn message(&self, name: &str) -> Option<Message> {
        self.messages.read().get(name).cloned()
    }

    // === Correlation ===

    pub fn correlation(&self) -> &CorrelationManager {
        &self.correlation
    }
}
