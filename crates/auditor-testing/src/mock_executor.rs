//! Mock action executor for testing the orchestrator/executor without a
//! real side-effect engine.

use std::sync::Arc;

use async_trait::async_trait;
use auditor_core::executor::{ActionExecutor, ExecutorError};
use auditor_core::model::{ActionOutcome, ExecutionAction};
use parking_lot::Mutex;
use serde_json::Value;

/// Handler function type for scripted executor responses.
pub type MockExecutorHandler =
    Arc<dyn Fn(&ExecutionAction) -> Result<ActionOutcome, ExecutorError> + Send + Sync>;

/// A configurable mock `ActionExecutor` for testing the planner/executor
/// pipeline end to end without a real side-effect engine.
///
/// # Example
///
/// ```rust,ignore
/// use auditor_testing::MockExecutor;
///
/// let executor = MockExecutor::new()
///     .with_response(serde_json::json!({"updateInProgress": false}));
/// ```
#[derive(Clone)]
pub struct MockExecutor {
    handler: Option<MockExecutorHandler>,
    fixed_after: Option<Value>,
    call_history: Arc<Mutex<Vec<ExecutionAction>>>,
    fail_next_n: Arc<Mutex<u32>>,
    transient_on_fail: bool,
    error_message: String,
}

impl std::fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExecutor")
            .field("call_count", &self.call_count())
            .finish()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    /// Create a new `MockExecutor` that succeeds every call with `after: None`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handler: None,
            fixed_after: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
            fail_next_n: Arc::new(Mutex::new(0)),
            transient_on_fail: true,
            error_message: "mock executor error".to_string(),
        }
    }

    /// Return a fixed `after` payload on every successful call.
    #[must_use]
    pub fn with_response(mut self, after: Value) -> Self {
        self.fixed_after = Some(after);
        self
    }

    /// Supply a handler computing the outcome (or error) per action.
    #[must_use]
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExecutionAction) -> Result<ActionOutcome, ExecutorError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the message used for scripted failures.
    #[must_use]
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Scripted failures are permanent (not retried) rather than transient.
    #[must_use]
    pub fn with_permanent_failures(mut self) -> Self {
        self.transient_on_fail = false;
        self
    }

    /// Fail the next `n` calls, then resume succeeding (or delegating to
    /// the handler/fixed response).
    pub fn fail_next(&self, n: u32) {
        *self.fail_next_n.lock() = n;
    }

    /// Number of times `execute_action` was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock().len()
    }

    /// Actions dispatched so far, in order.
    #[must_use]
    pub fn call_history(&self) -> Vec<ExecutionAction> {
        self.call_history.lock().clone()
    }

    /// Whether any dispatched action targeted the given resource id.
    #[must_use]
    pub fn was_called_with_resource(&self, resource_id: &str) -> bool {
        self.call_history
            .lock()
            .iter()
            .any(|a| a.target.resource_id == resource_id)
    }

    /// Clear call history and failure scripting.
    pub fn reset(&self) {
        self.call_history.lock().clear();
        *self.fail_next_n.lock() = 0;
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn execute_action(
        &self,
        action: &ExecutionAction,
    ) -> Result<ActionOutcome, ExecutorError> {
        self.call_history.lock().push(action.clone());

        {
            let mut remaining = self.fail_next_n.lock();
            if *remaining > 0 {
                *remaining -= 1;
                let message = self.error_message.clone();
                return Err(if self.transient_on_fail {
                    ExecutorError::Transient(message)
                } else {
                    ExecutorError::Permanent(message)
                });
            }
        }

        if let Some(handler) = &self.handler {
            return handler(action);
        }

        Ok(ActionOutcome {
            action_id: action.id.clone(),
            after: self.fixed_after.clone(),
        })
    }
}

/// A builder for constructing `MockExecutor`s with specific behaviors,
/// mirroring the fluent style of this crate's CSV fixture builders.
pub struct MockExecutorBuilder {
    executor: MockExecutor,
}

impl MockExecutorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            executor: MockExecutor::new(),
        }
    }

    #[must_use]
    pub fn response(mut self, after: Value) -> Self {
        self.executor = self.executor.with_response(after);
        self
    }

    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExecutionAction) -> Result<ActionOutcome, ExecutorError> + Send + Sync + 'static,
    {
        self.executor = self.executor.with_handler(handler);
        self
    }

    #[must_use]
    pub fn build(self) -> MockExecutor {
        self.executor
    }
}

impl Default for MockExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
