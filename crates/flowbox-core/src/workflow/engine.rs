//! Box evaluation engines.
//!
//! A box body is opaque to the rest of the engine; `BoxEngine` is the seam
//! that turns `(code, inputs)` into a value. The default `JexlEngine`
//! evaluates the body as one JEXL expression whose context is the box's
//! input mapping.
//!
//! Inputs are always passed as the evaluation context, never interpolated
//! into the expression string.
//!
//! JEXL does its arithmetic in `f64`. Integral results within the exactly
//! representable range are turned back into integers, so `{"x": 1}` yields
//! `1` and not `1.0`.

use flowbox_types::workflow::ValueMap;
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while evaluating a box body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Eval(String),
}

// ---------------------------------------------------------------------------
// BoxEngine
// ---------------------------------------------------------------------------

/// Evaluates box bodies.
///
/// Implementations run on a blocking thread and may take as long as they
/// need; the executor enforces the wall-clock limit. They must not mutate
/// shared state between invocations.
pub trait BoxEngine: Send + Sync + 'static {
    fn invoke(&self, code: &str, inputs: &ValueMap) -> Result<Value, EngineError>;
}

// ---------------------------------------------------------------------------
// JexlEngine
// ---------------------------------------------------------------------------

/// JEXL-backed engine with the standard transforms registered.
///
/// A fresh evaluator is built per invocation, so no state carries over from
/// one box to the next.
#[derive(Debug, Default, Clone, Copy)]
pub struct JexlEngine;

impl JexlEngine {
    pub fn new() -> Self {
        Self
    }

    fn evaluator() -> jexl_eval::Evaluator<'static> {
        jexl_eval::Evaluator::new()
            // String transforms
            .with_transform("lower", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| Ok(json!(str_arg(args, 0).trim())))
            .with_transform("split", |args: &[Value]| {
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let parts: Vec<&str> = str_arg(args, 0).split(delimiter).collect();
                Ok(json!(parts))
            })
            .with_transform("contains", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).contains(str_arg(args, 1))))
            })
            .with_transform("startsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).starts_with(str_arg(args, 1))))
            })
            .with_transform("endsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).ends_with(str_arg(args, 1))))
            })
            .with_transform("toString", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(match val {
                    Value::String(s) => json!(s),
                    other => json!(other.to_string()),
                })
            })
            // Boolean transforms
            .with_transform("not", |args: &[Value]| {
                Ok(json!(!truthy(args.first().unwrap_or(&Value::Null))))
            })
            // Collection transforms
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("keys", |args: &[Value]| match args.first() {
                Some(Value::Object(o)) => Ok(json!(o.keys().collect::<Vec<_>>())),
                _ => Ok(json!([])),
            })
            .with_transform("values", |args: &[Value]| match args.first() {
                Some(Value::Object(o)) => Ok(json!(o.values().collect::<Vec<_>>())),
                _ => Ok(json!([])),
            })
            .with_transform("sum", |args: &[Value]| {
                let total: f64 = match args.first() {
                    Some(Value::Array(items)) => items.iter().filter_map(Value::as_f64).sum(),
                    _ => 0.0,
                };
                Ok(json!(total))
            })
            // Numeric transforms
            .with_transform("round", |args: &[Value]| {
                let n = args.first().and_then(Value::as_f64).unwrap_or(0.0);
                let places = args.get(1).and_then(Value::as_f64).unwrap_or(0.0) as i32;
                let factor = 10f64.powi(places);
                Ok(json!((n * factor).round() / factor))
            })
            .with_transform("toNumber", |args: &[Value]| match args.first() {
                Some(Value::Number(n)) => Ok(json!(n.as_f64().unwrap_or(0.0))),
                Some(Value::String(s)) => s
                    .trim()
                    .parse::<f64>()
                    .map(|n| json!(n))
                    .map_err(|_| anyhow::anyhow!("cannot convert '{s}' to a number")),
                Some(Value::Bool(b)) => Ok(json!(if *b { 1.0 } else { 0.0 })),
                _ => Ok(Value::Null),
            })
            // Raise an error from inside an expression
            .with_transform("fail", |args: &[Value]| {
                let message = match args.first() {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => "box failed".to_string(),
                };
                Err(anyhow::anyhow!(message))
            })
    }
}

impl BoxEngine for JexlEngine {
    fn invoke(&self, code: &str, inputs: &ValueMap) -> Result<Value, EngineError> {
        let context = Value::Object(inputs.clone());
        Self::evaluator()
            .eval_in_context(code.trim(), &context)
            .map(integral_floats_to_ints)
            .map_err(|e| EngineError::Eval(e.to_string()))
    }
}

/// Largest integer an `f64` holds exactly (2^53 - 1).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_991.0;

fn integral_floats_to_ints(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => {
                json!(f as i64)
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => {
            Value::Array(items.into_iter().map(integral_floats_to_ints).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, integral_floats_to_ints(v)))
                .collect(),
        ),
        other => other,
    }
}

fn str_arg(args: &[Value], idx: usize) -> &str {
    args.get(idx).and_then(|v| v.as_str()).unwrap_or("")
}

/// JavaScript-like truthiness.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
