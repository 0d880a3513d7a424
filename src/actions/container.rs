//! Container actions: sequence, parallel, iterate

use std::sync::Arc;
use tokio::task::JoinSet;

use crate::common::{Error, Result};
use crate::context::TestContext;

use super::{IterateCondition, TestAction};

/// Run actions in order, stopping at the first failure
pub(crate) async fn run_sequence(actions: &[TestAction], context: &Arc<TestContext>) -> Result<()> {
    for action in actions {
        action.execute(context).await?;
    }
    Ok(())
}

/// Run every action as its own task on the shared context
///
/// All branches run to completion. The first failure observed is returned;
/// later ones are logged.
pub(crate) async fn run_parallel(actions: &[TestAction], context: &Arc<TestContext>) -> Result<()> {
    let mut branches = JoinSet::new();
    for action in actions {
        let action = action.clone();
        let context = Arc::clone(context);
        branches.spawn(async move { action.execute(&context).await });
    }

    let mut first_error: Option<Error> = None;
    while let Some(joined) = branches.join_next().await {
        let result = joined
            .map_err(|e| Error::Internal(format!("parallel branch aborted: {e}")))
            .and_then(|result| result);
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            } else {
                tracing::warn!(error = %e, "additional parallel branch failure");
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Counting loop over nested actions
#[derive(Debug, Clone)]
pub struct Iterate {
    index_name: String,
    start: i64,
    step: i64,
    condition: IterateCondition,
    actions: Vec<TestAction>,
}

impl Iterate {
    /// Loop with index `i` starting at 1, step 1
    pub fn new(condition: IterateCondition, actions: Vec<TestAction>) -> Self {
        Self {
            index_name: "i".to_string(),
            start: 1,
            step: 1,
            condition,
            actions,
        }
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub(crate) async fn execute(&self, context: &Arc<TestContext>) -> Result<()> {
        if self.step == 0 {
            return Err(Error::InvalidCondition {
                expression: format!("{:?}", self.condition),
                reason: "step must not be zero".to_string(),
            });
        }

        let mut index = self.start;
        let mut passes = 0usize;
        while self.condition.evaluate(&self.index_name, index, context)? {
            context.set_variable(&self.index_name, index.to_string())?;
            run_sequence(&self.actions, context).await?;
            passes += 1;
            index = index.checked_add(self.step).ok_or_else(|| Error::InvalidCondition {
                expression: format!("{:?}", self.condition),
                reason: "index overflow".to_string(),
            })?;
        }

        tracing::debug!(index = %self.index_name, passes, "iteration finished");
        Ok(())
    }
}
