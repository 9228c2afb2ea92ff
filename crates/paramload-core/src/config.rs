//! Config and finder traits, plus an in-memory implementation
//!
//! A [`Config`] is one ranked source of raw values. It is loaded at most once
//! per [`Loader::load`] call, and exposes [`Finder`]s that look values up by
//! key. The loader never performs I/O itself; configs that read files or the
//! environment live in other crates.

use crate::app::{AppRef, AsAny};
use crate::loader::Loader;
use crate::value::{KeyPath, Origin, Provenance};
use crate::{Error, Result};
use serde_json::Value;
use std::borrow::Cow;
use std::rc::Rc;
use std::sync::Arc;

/// Key/value lookup helper owned by a config
pub trait Finder {
    /// Every value stored under `key`, most preferred first
    fn lookup(&self, app: &AppRef, key: &KeyPath) -> Result<Vec<(Value, Provenance)>>;
}

/// A ranked source of raw values
pub trait Config: AsAny {
    /// Name used in diagnostics
    fn name(&self) -> String {
        crate::app::short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// Prepare the config for lookups.
    ///
    /// May read already-resolved parameters through `loader`; those values are
    /// computed from earlier configs only.
    fn load(&mut self, _loader: &Loader) -> Result<()> {
        Ok(())
    }

    fn finders(&self) -> Vec<Rc<dyn Finder>>;
}

impl dyn Config {
    pub fn is<C: Config>(&self) -> bool {
        self.as_any().is::<C>()
    }

    pub fn downcast_ref<C: Config>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }
}

/// Computes the origin of a value found under a key
pub type OriginFn = Arc<dyn Fn(&KeyPath, &Value) -> Origin + Send + Sync>;

/// Transforms the whole mapping before each lookup
pub type SchemaFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Finder over an in-memory mapping
#[derive(Clone)]
pub struct DictFinder {
    source: String,
    values: Value,
    root_key: Option<KeyPath>,
    schema: Option<SchemaFn>,
    origin: Option<OriginFn>,
}

impl DictFinder {
    /// Create a finder named `source` over `values`
    pub fn new(source: impl Into<String>, values: Value) -> Self {
        Self {
            source: source.into(),
            values,
            root_key: None,
            schema: None,
            origin: None,
        }
    }

    /// Only look for keys below `root_key`
    pub fn with_root_key(mut self, root_key: impl Into<KeyPath>) -> Self {
        self.root_key = Some(root_key.into());
        self
    }

    /// Validate or reshape the mapping before lookups
    pub fn with_schema<F>(mut self, schema: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Describe found values with a custom origin
    pub fn with_origin<F>(mut self, origin: F) -> Self
    where
        F: Fn(&KeyPath, &Value) -> Origin + Send + Sync + 'static,
    {
        self.origin = Some(Arc::new(origin));
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn values(&self) -> &Value {
        &self.values
    }

    fn origin_of(&self, key: &KeyPath, value: &Value) -> Origin {
        match &self.origin {
            Some(origin) => origin(key, value),
            None => Origin::Config {
                source: self.source.clone(),
                key: key.to_string(),
            },
        }
    }
}

impl Finder for DictFinder {
    fn lookup(&self, _app: &AppRef, key: &KeyPath) -> Result<Vec<(Value, Provenance)>> {
        let mut values = Cow::Borrowed(&self.values);

        if let Some(root_key) = &self.root_key {
            let Some(root) = root_key.lookup(&values).cloned() else {
                return Ok(Vec::new());
            };
            values = Cow::Owned(root);
        }

        if let Some(schema) = &self.schema {
            values = Cow::Owned(
                schema(&values).map_err(|e| Error::config(self.source.clone(), e))?,
            );
        }

        Ok(key
            .lookup(&values)
            .map(|value| {
                let origin = self.origin_of(key, value);
                (value.clone(), Provenance::Origin(origin))
            })
            .into_iter()
            .collect())
    }
}

/// Config wrapping a single [`DictFinder`]
pub struct DictConfig {
    finder: Rc<DictFinder>,
}

impl DictConfig {
    pub fn new(source: impl Into<String>, values: Value) -> Self {
        Self::from_finder(DictFinder::new(source, values))
    }

    pub fn from_finder(finder: DictFinder) -> Self {
        Self {
            finder: Rc::new(finder),
        }
    }
}

impl Config for DictConfig {
    fn name(&self) -> String {
        self.finder.source().to_string()
    }

    fn finders(&self) -> Vec<Rc<dyn Finder>> {
        vec![Rc::clone(&self.finder) as Rc<dyn Finder>]
    }
}
