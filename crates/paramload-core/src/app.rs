//! Application objects and their parameter declarations
//!
//! An [`App`] is any object whose fields are filled in by a [`Loader`]. Rust
//! has no attribute interception, so apps declare their parameters
//! explicitly, usually through a [`Descriptor`] built once per app type:
//!
//! ```
//! use paramload_core::{App, Descriptor, Fields, FieldKey, Parameter, Static, ValueSink, Result};
//! use std::rc::Rc;
//! use std::sync::{Arc, LazyLock};
//!
//! struct Server {
//!     fields: Fields,
//! }
//!
//! static SERVER: LazyLock<Descriptor<Server>> = LazyLock::new(|| {
//!     Descriptor::builder()
//!         .param("port", Parameter::builder().getter(Static::new(8080)).build())
//!         .build()
//!         .expect("valid descriptor")
//! });
//!
//! impl App for Server {
//!     fn parameters(&self) -> Result<Vec<(FieldKey, Arc<Parameter>)>> {
//!         Ok(SERVER.parameters())
//!     }
//!
//!     fn store(&self) -> &dyn ValueSink {
//!         &self.fields
//!     }
//! }
//!
//! let server = Rc::new(Server { fields: Fields::new() });
//! paramload_core::load(&server).unwrap();
//! assert_eq!(server.fields.get::<u16>("port").unwrap(), 8080);
//! ```
//!
//! [`Loader`]: crate::Loader

use crate::attribute::{ProvenanceSink, ValueSink};
use crate::config::Config;
use crate::parameter::Parameter;
use crate::value::FieldKey;
use crate::{Error, Result};
use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

/// Upcast helper so trait objects can be downcast to their concrete type
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared handle to an app taking part in a load
pub type AppRef = Rc<dyn App>;

/// An object whose declared parameters are resolved by a loader
pub trait App: AsAny {
    /// The parameters of this app, keyed by where their values are stored
    fn parameters(&self) -> Result<Vec<(FieldKey, Arc<Parameter>)>>;

    /// Where resolved values are written
    fn store(&self) -> &dyn ValueSink;

    /// Configs to use when the caller of [`load`](crate::load) supplies none
    fn configs(self: Rc<Self>) -> Result<Vec<Box<dyn Config>>> {
        Ok(Vec::new())
    }

    /// Default provenance carrier for this app
    fn provenance(&self) -> Option<Rc<dyn ProvenanceSink>> {
        None
    }

    /// Short type name used in diagnostics
    fn type_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

impl dyn App {
    /// Downcast to the concrete app type
    pub fn downcast_ref<A: App>(&self) -> Option<&A> {
        self.as_any().downcast_ref::<A>()
    }
}

/// Identity of an app for the lifetime of its registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AppId(usize);

impl AppId {
    pub(crate) fn of(app: &AppRef) -> Self {
        Self(Rc::as_ptr(app) as *const () as usize)
    }
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Builds the config list for an app instance
pub type ConfigFactory<A> = Arc<dyn Fn(&Rc<A>) -> Result<Vec<Box<dyn Config>>> + Send + Sync>;

/// Builds the provenance carrier for an app instance
pub type ProvenanceFactory<A> = Arc<dyn Fn(&A) -> Rc<dyn ProvenanceSink> + Send + Sync>;

/// Parameter declarations for one app type.
///
/// Fields declared directly on a descriptor shadow fields of the same name
/// inherited through [`DescriptorBuilder::extends`].
pub struct Descriptor<A> {
    type_name: &'static str,
    fields: Vec<(String, Arc<Parameter>)>,
    configs: Vec<ConfigFactory<A>>,
    provenance: Option<ProvenanceFactory<A>>,
}

impl<A: App> Descriptor<A> {
    pub fn builder() -> DescriptorBuilder<A> {
        DescriptorBuilder {
            fields: Vec::new(),
            inherited: Vec::new(),
            configs: Vec::new(),
            provenance: Vec::new(),
        }
    }

    /// Declared fields, own fields first, then inherited ones
    pub fn parameters(&self) -> Vec<(FieldKey, Arc<Parameter>)> {
        self.fields
            .iter()
            .map(|(name, param)| (FieldKey::name(name.as_str()), Arc::clone(param)))
            .collect()
    }

    /// Look up the parameter declared under `name`
    pub fn parameter(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, param)| param)
    }

    /// Run every config factory in declaration order and chain the results
    pub fn configs(&self, app: &Rc<A>) -> Result<Vec<Box<dyn Config>>> {
        let mut configs = Vec::new();
        for factory in &self.configs {
            configs.extend(factory(app)?);
        }
        Ok(configs)
    }

    pub fn provenance(&self, app: &A) -> Option<Rc<dyn ProvenanceSink>> {
        self.provenance.as_ref().map(|factory| factory(app))
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Builder for [`Descriptor`]
pub struct DescriptorBuilder<A> {
    fields: Vec<(String, Arc<Parameter>)>,
    inherited: Vec<(String, Arc<Parameter>)>,
    configs: Vec<ConfigFactory<A>>,
    provenance: Vec<ProvenanceFactory<A>>,
}

impl<A: App> DescriptorBuilder<A> {
    /// Declare a field
    pub fn param(mut self, name: impl Into<String>, param: Arc<Parameter>) -> Self {
        self.fields.push((name.into(), param));
        self
    }

    /// Inherit the fields of a more general descriptor.
    ///
    /// When several parents declare the same name, the parent passed first
    /// wins. Only fields are inherited: the parent's config factories take a
    /// `&Rc<P>` and cannot run on an `A`, so declare them again with
    /// [`configs`](Self::configs) if this app should use them.
    pub fn extends<P>(mut self, parent: &Descriptor<P>) -> Self {
        self.inherited.extend(
            parent
                .fields
                .iter()
                .map(|(name, param)| (name.clone(), Arc::clone(param))),
        );
        self
    }

    /// Add a config factory; factories run in declaration order
    pub fn configs<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Rc<A>) -> Result<Vec<Box<dyn Config>>> + Send + Sync + 'static,
    {
        self.configs.push(Arc::new(factory));
        self
    }

    /// Set the provenance carrier factory; at most one may be declared
    pub fn provenance<F>(mut self, factory: F) -> Self
    where
        F: Fn(&A) -> Rc<dyn ProvenanceSink> + Send + Sync + 'static,
    {
        self.provenance.push(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<Descriptor<A>> {
        let type_name = short_type_name(std::any::type_name::<A>());

        if self.provenance.len() > 1 {
            return Err(Error::usage(format!(
                "{} declares more than one provenance factory",
                type_name
            )));
        }

        let mut fields: Vec<(String, Arc<Parameter>)> = Vec::new();
        for (name, param) in self.fields {
            if fields.iter().any(|(existing, _)| *existing == name) {
                return Err(Error::usage(format!(
                    "field '{}' is declared twice on {}",
                    name, type_name
                )));
            }
            fields.push((name, param));
        }
        for (name, param) in self.inherited {
            if !fields.iter().any(|(existing, _)| *existing == name) {
                fields.push((name, param));
            }
        }

        Ok(Descriptor {
            type_name,
            fields,
            configs: self.configs,
            provenance: self.provenance.into_iter().next(),
        })
    }
}
