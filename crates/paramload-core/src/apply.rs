//! Transforms applied to each candidate before the pick

use crate::context::ApplyContext;
use crate::value::Origin;
use crate::{Error, Result};
use serde_json::{Number, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One transform step
pub type ApplyFn = Arc<dyn Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync>;

/// Ordered list of transforms, run first to last
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<ApplyFn>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, step: F)
    where
        F: Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.steps.push(Arc::new(step));
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(&self, value: Value, ctx: &ApplyContext<'_>) -> Result<Value> {
        self.steps.iter().try_fold(value, |value, step| step(value, ctx))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// Parse a string or number into an integer
pub fn integer() -> impl Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static {
    |value, _| match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::from(f as i64)),
            _ => Err(Error::invalid_value(format!("{} is not an integer", n))),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| Error::invalid_value(format!("'{}' is not an integer", s))),
        other => Err(Error::invalid_value(format!("{} is not an integer", other))),
    }
}

/// Parse a string or number into a float
pub fn float() -> impl Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static {
    |value, _| {
        let parsed = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| Error::invalid_value(format!("{} is not a number", value)))
    }
}

/// Accept booleans, `0`/`1`, and the usual yes/no spellings
pub fn boolean() -> impl Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static {
    |value, _| {
        let parsed = match &value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed
            .map(Value::Bool)
            .ok_or_else(|| Error::invalid_value(format!("{} is not a boolean", value)))
    }
}

/// Resolve a relative path against the directory of the file it was read from.
///
/// Values that did not come from a file, and absolute paths, pass through.
pub fn relpath() -> impl Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static {
    |value, ctx| {
        let raw = match value {
            Value::String(raw) => raw,
            other => return Err(Error::invalid_value(format!("{} is not a path", other))),
        };
        let base = match ctx.provenance().origin() {
            Some(Origin::File { path, .. }) => path.parent(),
            _ => None,
        };
        match base {
            Some(base) if !Path::new(&raw).is_absolute() => {
                Ok(Value::String(base.join(&raw).to_string_lossy().into_owned()))
            }
            _ => Ok(Value::String(raw)),
        }
    }
}
