//! Runs one box body and normalizes the outcome.
//!
//! `StepExecutor` never returns an error: every way a box can go wrong
//! (engine error, wrong result shape, panic, timeout) becomes a
//! `RunResult::Failure` for that box alone.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use flowbox_types::run::RunResult;
use flowbox_types::workflow::ValueMap;
use serde_json::Value;

use super::engine::BoxEngine;

/// Default wall-clock limit for a box body.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes box bodies on blocking threads under a wall-clock limit.
#[derive(Clone)]
pub struct StepExecutor {
    engine: Arc<dyn BoxEngine>,
    step_timeout: Duration,
}

impl StepExecutor {
    pub fn new(engine: Arc<dyn BoxEngine>, step_timeout: Duration) -> Self {
        Self {
            engine,
            step_timeout,
        }
    }

    /// Evaluate `code` against `inputs`.
    ///
    /// The caller's inputs are never mutated; the engine works on its own copy.
    /// A body that outlives the timeout is abandoned on its thread.
    pub async fn run(&self, box_id: &str, code: &str, inputs: &ValueMap) -> RunResult {
        tracing::debug!(box_id, inputs = inputs.len(), "executing box");

        let engine = Arc::clone(&self.engine);
        let code = code.to_string();
        let inputs = inputs.clone();
        let task = tokio::task::spawn_blocking(move || engine.invoke(&code, &inputs));

        let result = match tokio::time::timeout(self.step_timeout, task).await {
            Err(_) => RunResult::failure(format!(
                "box timed out after {}s",
                self.step_timeout.as_secs_f64()
            )),
            Ok(Err(join_err)) if join_err.is_panic() => RunResult::failure(format!(
                "box panicked: {}",
                panic_message(join_err.into_panic())
            )),
            Ok(Err(join_err)) => RunResult::failure(format!("box was cancelled: {join_err}")),
            Ok(Ok(Err(e))) => RunResult::failure(format!("error during execution: {e}")),
            Ok(Ok(Ok(Value::Object(output)))) => RunResult::Success { output },
            Ok(Ok(Ok(other))) => RunResult::failure(format!(
                "output was not a serializable mapping (got {})",
                value_kind(&other)
            )),
        };

        match &result {
            RunResult::Success { output } => {
                tracing::info!(box_id, keys = output.len(), "box succeeded");
            }
            RunResult::Failure { message } => {
                tracing::warn!(box_id, error = %message, "box failed");
            }
        }

        result
    }
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("step_timeout", &self.step_timeout)
            .finish_non_exhaustive()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::engine::{EngineError, JexlEngine};
    use serde_json::json;

    fn map(value: Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    fn jexl() -> StepExecutor {
        StepExecutor::new(Arc::new(JexlEngine::new()), DEFAULT_STEP_TIMEOUT)
    }

    /// Engine whose behavior is chosen by the code string.
    struct ScriptedEngine;

    impl BoxEngine for ScriptedEngine {
        fn invoke(&self, code: &str, inputs: &ValueMap) -> Result<Value, EngineError> {
            match code {
                "panic" => panic!("kaboom"),
                "sleep" => {
                    std::thread::sleep(Duration::from_millis(400));
                    Ok(json!({}))
                }
                "raise" => Err(EngineError::Eval("bad things".to_string())),
                "echo" => Ok(Value::Object(inputs.clone())),
                _ => Ok(json!({"ok": true})),
            }
        }
    }

    fn scripted(timeout: Duration) -> StepExecutor {
        StepExecutor::new(Arc::new(ScriptedEngine), timeout)
    }

    #[tokio::test]
    async fn success_returns_mapping() {
        let result = jexl()
            .run("b", r#"{"y": nums.x + 1}"#, &map(json!({"nums": {"x": 1.0}})))
            .await;
        assert_eq!(
            result,
            RunResult::Success {
                output: map(json!({"y": 2}))
            }
        );
    }

    #[tokio::test]
    async fn engine_error_becomes_failure() {
        let result = scripted(DEFAULT_STEP_TIMEOUT)
            .run("b", "raise", &ValueMap::new())
            .await;
        assert_eq!(
            result,
            RunResult::failure("error during execution: bad things")
        );
    }

    #[tokio::test]
    async fn jexl_fail_transform_becomes_failure() {
        let result = jexl().run("b", "'nope'|fail", &ValueMap::new()).await;
        let message = result.message().unwrap();
        assert!(message.starts_with("error during execution"), "{message}");
    }

    #[tokio::test]
    async fn non_mapping_result_is_rejected() {
        let result = jexl().run("b", "[1, 2]", &ValueMap::new()).await;
        assert_eq!(
            result,
            RunResult::failure("output was not a serializable mapping (got array)")
        );

        let result = jexl().run("b", "'text'", &ValueMap::new()).await;
        assert_eq!(
            result.message(),
            Some("output was not a serializable mapping (got string)")
        );
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let result = scripted(DEFAULT_STEP_TIMEOUT)
            .run("b", "panic", &ValueMap::new())
            .await;
        assert_eq!(result, RunResult::failure("box panicked: kaboom"));
    }

    #[tokio::test]
    async fn slow_box_times_out() {
        let result = scripted(Duration::from_millis(50))
            .run("b", "sleep", &ValueMap::new())
            .await;
        let message = result.message().unwrap();
        assert!(message.starts_with("box timed out after"), "{message}");
    }

    #[tokio::test]
    async fn inputs_are_not_mutated() {
        let inputs = map(json!({"a": {"k": 1}}));
        let before = inputs.clone();
        let result = scripted(DEFAULT_STEP_TIMEOUT)
            .run("b", "echo", &inputs)
            .await;
        assert!(result.is_success());
        assert_eq!(inputs, before);
    }
}
