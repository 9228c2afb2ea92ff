//! Attributes and the storage locations they write to
//!
//! An [`Attribute`] binds one parameter to one storage location on one app,
//! plus a parallel location in a provenance carrier.

use crate::app::{AppId, AppRef};
use crate::parameter::{ParamId, Parameter};
use crate::value::{FieldKey, Provenance};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

/// Storage for resolved values
pub trait ValueSink {
    fn set_value(&self, key: &FieldKey, value: Value) -> Result<()>;
    fn delete_value(&self, key: &FieldKey) -> Result<()>;
}

/// Storage for provenance records, addressed like values
pub trait ProvenanceSink {
    fn set_provenance(&self, key: &FieldKey, provenance: Provenance);
    fn delete_provenance(&self, key: &FieldKey);
}

/// Named-field value storage for struct-like apps
#[derive(Debug, Default)]
pub struct Fields {
    values: RefCell<BTreeMap<String, Value>>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw value of a field.
    ///
    /// Fails with a usage error if the field has not been loaded.
    pub fn value(&self, name: &str) -> Result<Value> {
        self.values.borrow().get(name).cloned().ok_or_else(|| {
            Error::usage(format!(
                "parameter '{}' has no value; did you forget to call load()?",
                name
            ))
        })
    }

    /// Deserialize a field into `T`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Ok(serde_json::from_value(self.value(name)?)?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.borrow().contains_key(name)
    }

    /// Copy of every stored field
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.borrow().clone()
    }
}

impl ValueSink for Fields {
    fn set_value(&self, key: &FieldKey, value: Value) -> Result<()> {
        let name = field_name(key)?;
        self.values.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn delete_value(&self, key: &FieldKey) -> Result<()> {
        let name = field_name(key)?;
        self.values.borrow_mut().remove(name);
        Ok(())
    }
}

fn field_name(key: &FieldKey) -> Result<&str> {
    key.as_name()
        .ok_or_else(|| Error::usage(format!("expected a field name, not {}", key)))
}

/// Provenance carrier keeping one record per field key
#[derive(Debug, Default)]
pub struct ProvenanceMap {
    records: RefCell<BTreeMap<FieldKey, Provenance>>,
}

impl ProvenanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: impl Into<FieldKey>) -> Option<Provenance> {
        self.records.borrow().get(&key.into()).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<FieldKey, Provenance> {
        self.records.borrow().clone()
    }
}

impl ProvenanceSink for ProvenanceMap {
    fn set_provenance(&self, key: &FieldKey, provenance: Provenance) {
        self.records.borrow_mut().insert(key.clone(), provenance);
    }

    fn delete_provenance(&self, key: &FieldKey) {
        self.records.borrow_mut().remove(key);
    }
}

/// Provenance carrier that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardProvenance;

impl ProvenanceSink for DiscardProvenance {
    fn set_provenance(&self, _key: &FieldKey, _provenance: Provenance) {}

    fn delete_provenance(&self, _key: &FieldKey) {}
}

/// Identity of an attribute: the (app, parameter) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AttrKey {
    app: AppId,
    param: ParamId,
}

impl AttrKey {
    pub(crate) fn new(app: &AppRef, param: &Arc<Parameter>) -> Self {
        Self {
            app: AppId::of(app),
            param: ParamId::of(param),
        }
    }
}

/// One parameter bound to one storage location on one app
#[derive(Clone)]
pub struct Attribute {
    app: AppRef,
    key: FieldKey,
    param: Arc<Parameter>,
    provenance: Rc<dyn ProvenanceSink>,
}

impl Attribute {
    pub fn new(
        app: AppRef,
        key: FieldKey,
        param: Arc<Parameter>,
        provenance: Rc<dyn ProvenanceSink>,
    ) -> Self {
        Self {
            app,
            key,
            param,
            provenance,
        }
    }

    /// One attribute per parameter the app declares
    pub fn scan(app: &AppRef, provenance: &Rc<dyn ProvenanceSink>) -> Result<Vec<Self>> {
        Ok(app
            .parameters()?
            .into_iter()
            .map(|(key, param)| Self::new(Rc::clone(app), key, param, Rc::clone(provenance)))
            .collect())
    }

    pub fn app(&self) -> &AppRef {
        &self.app
    }

    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn param(&self) -> &Arc<Parameter> {
        &self.param
    }

    /// Human-readable name, e.g. `Server.port` or `collection[0]`
    pub fn label(&self) -> String {
        match &self.key {
            FieldKey::Name(name) => format!("{}.{}", self.app.type_name(), name),
            path @ FieldKey::Path(_) => format!("{}{}", self.app.type_name(), path),
        }
    }

    pub(crate) fn id(&self) -> AttrKey {
        AttrKey::new(&self.app, &self.param)
    }

    pub(crate) fn store(&self, value: Value, provenance: Provenance) -> Result<()> {
        self.app.store().set_value(&self.key, value)?;
        self.provenance.set_provenance(&self.key, provenance);
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<()> {
        self.app.store().delete_value(&self.key)?;
        self.provenance.delete_provenance(&self.key);
        Ok(())
    }
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("label", &self.label())
            .finish()
    }
}
