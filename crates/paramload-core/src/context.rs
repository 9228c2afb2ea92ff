//! Context handed to getters, transforms and on-load hooks

use crate::app::{App, AppRef};
use crate::config::Config;
use crate::loader::Loader;
use crate::parameter::Parameter;
use crate::value::Provenance;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::Ref;
use std::sync::Arc;

/// Everything a getter may look at while one attribute is being resolved
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    loader: &'a Loader,
    app: &'a AppRef,
    label: &'a str,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(loader: &'a Loader, app: &'a AppRef, label: &'a str) -> Self {
        Self { loader, app, label }
    }

    pub fn loader(&self) -> &'a Loader {
        self.loader
    }

    pub fn app(&self) -> &'a AppRef {
        self.app
    }

    /// Label of the attribute being resolved, e.g. `Server.port`
    pub fn label(&self) -> &'a str {
        self.label
    }

    /// The app being resolved, as its concrete type
    pub fn app_as<A: App>(&self) -> Result<&'a A> {
        self.app.downcast_ref::<A>().ok_or_else(|| {
            Error::usage(format!(
                "{} belongs to {}, not {}",
                self.label,
                self.app.type_name(),
                crate::app::short_type_name(std::any::type_name::<A>())
            ))
        })
    }

    /// Configs that have finished loading, in rank order
    pub fn configs(&self) -> impl Iterator<Item = Ref<'a, dyn Config + 'static>> + 'a {
        self.loader.loaded_configs()
    }

    /// Resolved value of another field on the same app
    pub fn field(&self, name: &str) -> Result<Value> {
        self.loader.field(self.app, name)
    }

    /// Deserialize another field on the same app into `T`
    pub fn field_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Ok(serde_json::from_value(self.field(name)?)?)
    }

    /// Resolved value of `param` on the same app
    pub fn value(&self, param: &Arc<Parameter>) -> Result<Value> {
        self.loader.value(self.app, param)
    }
}

/// Context for one apply step: the resolve context plus the candidate's provenance
#[derive(Clone, Copy)]
pub struct ApplyContext<'a> {
    resolve: &'a ResolveContext<'a>,
    provenance: &'a Provenance,
}

impl<'a> ApplyContext<'a> {
    pub(crate) fn new(resolve: &'a ResolveContext<'a>, provenance: &'a Provenance) -> Self {
        Self {
            resolve,
            provenance,
        }
    }

    pub fn resolve(&self) -> &'a ResolveContext<'a> {
        self.resolve
    }

    pub fn app(&self) -> &'a AppRef {
        self.resolve.app()
    }

    pub fn loader(&self) -> &'a Loader {
        self.resolve.loader()
    }

    /// Provenance of the candidate being transformed
    pub fn provenance(&self) -> &'a Provenance {
        self.provenance
    }
}

/// Arguments of an on-load hook, run right after a value is stored
pub struct OnLoad<'a> {
    pub loader: &'a Loader,
    pub app: &'a AppRef,
    pub value: &'a Value,
    pub provenance: &'a Provenance,
}
