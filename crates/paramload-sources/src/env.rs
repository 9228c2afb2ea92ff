//! [`EnvConfig`]: values from environment variables

use paramload_core::{Config, DictFinder, Finder, KeyPath, Loader, Origin};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::rc::Rc;
use tracing::{debug, trace};

/// Reads values from the process environment.
///
/// The environment is captured when the config is loaded, so changes made
/// after that point are not seen until the next load. With a prefix, the key
/// `port` is looked up as the variable `{prefix}port`.
pub struct EnvConfig {
    prefix: String,
    vars: Option<Vec<(String, String)>>,
    finder: Option<Rc<DictFinder>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvConfig {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            vars: None,
            finder: None,
        }
    }

    /// Only consider variables starting with `prefix`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Read from a fixed set of variables instead of the process environment
    pub fn with_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn snapshot(&self) -> Map<String, Value> {
        let vars: Box<dyn Iterator<Item = (String, String)>> = match &self.vars {
            Some(vars) => Box::new(vars.iter().cloned()),
            None => Box::new(unicode_vars(std::env::vars_os())),
        };

        vars.filter_map(|(name, value)| {
            let key = name.strip_prefix(self.prefix.as_str())?;
            (!key.is_empty()).then(|| (key.to_string(), Value::String(value)))
        })
        .collect()
    }
}

/// Variables whose name and value are both valid unicode; others are skipped
fn unicode_vars(
    vars: impl Iterator<Item = (OsString, OsString)>,
) -> impl Iterator<Item = (String, String)> {
    vars.filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
        (Ok(name), Ok(value)) => Some((name, value)),
        (name, _) => {
            trace!(var = ?name, "skipping non-unicode environment variable");
            None
        }
    })
}

impl Config for EnvConfig {
    fn name(&self) -> String {
        if self.prefix.is_empty() {
            "environment".to_string()
        } else {
            format!("environment ({}*)", self.prefix)
        }
    }

    fn load(&mut self, _loader: &Loader) -> paramload_core::Result<()> {
        let values = self.snapshot();
        debug!(prefix = %self.prefix, vars = values.len(), "captured environment");

        let prefix = self.prefix.clone();
        let finder = DictFinder::new(self.name(), Value::Object(values)).with_origin(
            move |key: &KeyPath, value: &Value| Origin::Env {
                var: format!("{}{}", prefix, key),
                value: value.as_str().unwrap_or_default().to_string(),
            },
        );
        self.finder = Some(Rc::new(finder));
        Ok(())
    }

    fn finders(&self) -> Vec<Rc<dyn Finder>> {
        self.finder
            .iter()
            .map(|finder| Rc::clone(finder) as Rc<dyn Finder>)
            .collect()
    }
}
