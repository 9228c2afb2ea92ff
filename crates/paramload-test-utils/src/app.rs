//! [`TestApp`]: an app assembled at runtime.

use paramload_core::{
    App, AppRef, Config, FieldKey, Fields, Parameter, Provenance, ProvenanceMap, ProvenanceSink,
    Result, ValueSink,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// An app whose parameters and configs are supplied by the test.
///
/// Values land in [`Fields`], provenance in a [`ProvenanceMap`]. Configs
/// given with [`with_config`](Self::with_config) are handed out by the first
/// call to [`App::configs`].
///
/// # Example
///
/// ```rust
/// use paramload_core::{DictConfig, Key, Parameter};
/// use paramload_test_utils::TestApp;
/// use serde_json::json;
///
/// let app = TestApp::new()
///     .with_param("x", Parameter::builder().getter(Key::any("x")).build())
///     .with_config(DictConfig::new("defaults", json!({"x": 1})))
///     .into_rc();
/// paramload_core::load(&app).unwrap();
/// assert_eq!(app.get::<i64>("x"), 1);
/// ```
pub struct TestApp {
    name: &'static str,
    params: Vec<(String, Arc<Parameter>)>,
    configs: RefCell<Vec<Box<dyn Config>>>,
    fields: Fields,
    provenance: Rc<ProvenanceMap>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            name: "TestApp",
            params: Vec::new(),
            configs: RefCell::new(Vec::new()),
            fields: Fields::new(),
            provenance: Rc::new(ProvenanceMap::new()),
        }
    }

    /// Type name shown in attribute labels, e.g. `Server` for `Server.port`
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_param(mut self, name: &str, param: Arc<Parameter>) -> Self {
        self.params.push((name.to_string(), param));
        self
    }

    pub fn with_config(self, config: impl Config) -> Self {
        self.configs.borrow_mut().push(Box::new(config));
        self
    }

    pub fn into_rc(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// The declared parameter called `name`.
    ///
    /// Panics if there is none.
    pub fn param(&self, name: &str) -> &Arc<Parameter> {
        self.params
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, param)| param)
            .unwrap_or_else(|| panic!("TestApp has no parameter '{}'", name))
    }

    /// Deserialize a loaded field, panicking if it has no value
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> T {
        self.fields
            .get(name)
            .unwrap_or_else(|e| panic!("TestApp::get({:?}): {}", name, e))
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Raw value of a field
    pub fn value(&self, name: &str) -> Result<Value> {
        self.fields.value(name)
    }

    /// Recorded provenance of a field
    pub fn provenance_of(&self, name: &str) -> Option<Provenance> {
        self.provenance.get(name)
    }

    /// Upcast a shared handle for use with the loader API
    pub fn app_ref(self: &Rc<Self>) -> AppRef {
        Rc::clone(self) as AppRef
    }
}

impl App for TestApp {
    fn parameters(&self) -> Result<Vec<(FieldKey, Arc<Parameter>)>> {
        Ok(self
            .params
            .iter()
            .map(|(name, param)| (FieldKey::name(name.as_str()), Arc::clone(param)))
            .collect())
    }

    fn store(&self) -> &dyn ValueSink {
        &self.fields
    }

    fn configs(self: Rc<Self>) -> Result<Vec<Box<dyn Config>>> {
        Ok(std::mem::take(&mut *self.configs.borrow_mut()))
    }

    fn provenance(&self) -> Option<Rc<dyn ProvenanceSink>> {
        Some(Rc::clone(&self.provenance) as Rc<dyn ProvenanceSink>)
    }

    fn type_name(&self) -> &'static str {
        self.name
    }
}
