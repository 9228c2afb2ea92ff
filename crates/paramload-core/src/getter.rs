//! Getters: strategies producing candidate values for a parameter
//!
//! Every getter yields a lazy sequence. The pick policy may stop after the
//! first candidate, in which case later lookups (and their side effects) never
//! run.

use crate::Result;
use crate::app::{App, short_type_name};
use crate::apply::Pipeline;
use crate::config::Config;
use crate::context::{ApplyContext, ResolveContext};
use crate::pick::CandidateIter;
use crate::value::{KeyPath, Origin, Provenance};
use serde_json::Value;
use std::any::TypeId;
use std::iter;
use std::marker::PhantomData;
use std::sync::Arc;

/// Source of candidate values for one parameter
pub trait Getter: Send + Sync {
    /// Candidates, most preferred first
    fn iter_values<'a>(&'a self, ctx: &'a ResolveContext<'_>) -> CandidateIter<'a>;

    /// Short description used in logs
    fn describe(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }
}

#[derive(Debug, Clone)]
enum ConfigFilter {
    Any,
    Type { id: TypeId, name: &'static str },
}

impl ConfigFilter {
    fn matches(&self, config: &dyn Config) -> bool {
        match self {
            Self::Any => true,
            Self::Type { id, .. } => config.as_any().type_id() == *id,
        }
    }
}

/// Look a key up in every loaded config of a given type
#[derive(Debug, Clone)]
pub struct Key {
    filter: ConfigFilter,
    key: KeyPath,
    apply: Pipeline,
}

impl Key {
    /// Look `key` up in configs of type `C` only
    pub fn new<C: Config>(key: impl Into<KeyPath>) -> Self {
        Self {
            filter: ConfigFilter::Type {
                id: TypeId::of::<C>(),
                name: short_type_name(std::any::type_name::<C>()),
            },
            key: key.into(),
            apply: Pipeline::new(),
        }
    }

    /// Look `key` up in every config
    pub fn any(key: impl Into<KeyPath>) -> Self {
        Self {
            filter: ConfigFilter::Any,
            key: key.into(),
            apply: Pipeline::new(),
        }
    }

    /// Transform values found by this getter only
    pub fn apply<F>(mut self, step: F) -> Self
    where
        F: Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.apply.push(step);
        self
    }
}

impl Getter for Key {
    fn iter_values<'a>(&'a self, ctx: &'a ResolveContext<'_>) -> CandidateIter<'a> {
        let found = ctx
            .configs()
            .filter(move |config| self.filter.matches(&**config))
            .flat_map(|config| config.finders())
            .flat_map(move |finder| match finder.lookup(ctx.app(), &self.key) {
                Ok(found) => found.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            });

        Box::new(found.map(move |item| {
            let (value, provenance) = item?;
            if self.apply.is_empty() {
                return Ok((value, provenance));
            }
            let value = self.apply.run(value, &ApplyContext::new(ctx, &provenance))?;
            Ok((value, provenance))
        }))
    }

    fn describe(&self) -> String {
        match &self.filter {
            ConfigFilter::Any => format!("Key({})", self.key),
            ConfigFilter::Type { name, .. } => format!("Key({}, {})", name, self.key),
        }
    }
}

type MethodFn = Arc<dyn Fn(&ResolveContext<'_>) -> Result<Value> + Send + Sync>;

/// Call a function of the app being resolved
#[derive(Clone)]
pub struct Method {
    call: MethodFn,
    origin: Origin,
}

impl Method {
    /// `call` receives the app downcast to `A`; resolving an attribute of any
    /// other app type is a usage error.
    #[track_caller]
    pub fn new<A, F>(call: F) -> Self
    where
        A: App,
        F: Fn(&A, &ResolveContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            call: Arc::new(move |ctx: &ResolveContext<'_>| call(ctx.app_as::<A>()?, ctx)),
            origin: Origin::caller(),
        }
    }
}

impl Getter for Method {
    fn iter_values<'a>(&'a self, ctx: &'a ResolveContext<'_>) -> CandidateIter<'a> {
        Box::new(iter::once_with(move || {
            let value = (self.call)(ctx)?;
            Ok((value, Provenance::Origin(self.origin.clone())))
        }))
    }
}

/// Call a free function
#[derive(Clone)]
pub struct Func {
    call: Arc<dyn Fn() -> Result<Value> + Send + Sync>,
    origin: Origin,
}

impl Func {
    #[track_caller]
    pub fn new<F>(call: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            call: Arc::new(call),
            origin: Origin::caller(),
        }
    }
}

impl Getter for Func {
    fn iter_values<'a>(&'a self, _ctx: &'a ResolveContext<'_>) -> CandidateIter<'a> {
        Box::new(iter::once_with(move || {
            let value = (self.call)()?;
            Ok((value, Provenance::Origin(self.origin.clone())))
        }))
    }
}

/// A literal value, attributed to where it was declared
#[derive(Debug, Clone)]
pub struct Static {
    value: Value,
    origin: Origin,
}

impl Static {
    #[track_caller]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            origin: Origin::caller(),
        }
    }
}

impl Getter for Static {
    fn iter_values<'a>(&'a self, _ctx: &'a ResolveContext<'_>) -> CandidateIter<'a> {
        Box::new(iter::once_with(move || {
            Ok((self.value.clone(), Provenance::Origin(self.origin.clone())))
        }))
    }

    fn describe(&self) -> String {
        format!("Static({})", self.value)
    }
}

/// Read a value straight off every loaded config of type `C`
pub struct ConfigAttr<C> {
    name: String,
    read: Arc<dyn Fn(&C) -> Option<Value> + Send + Sync>,
    _config: PhantomData<fn(&C)>,
}

impl<C: Config> ConfigAttr<C> {
    /// `read` returns `None` when a config has nothing to offer
    pub fn new<F>(name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&C) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            read: Arc::new(read),
            _config: PhantomData,
        }
    }
}

impl<C: Config> Getter for ConfigAttr<C> {
    fn iter_values<'a>(&'a self, ctx: &'a ResolveContext<'_>) -> CandidateIter<'a> {
        Box::new(ctx.configs().filter_map(move |config| {
            let typed = config.downcast_ref::<C>()?;
            let value = (self.read)(typed)?;
            let origin = Origin::Config {
                source: config.name(),
                key: self.name.clone(),
            };
            Some(Ok((value, Provenance::Origin(origin))))
        }))
    }

    fn describe(&self) -> String {
        format!(
            "ConfigAttr({}.{})",
            short_type_name(std::any::type_name::<C>()),
            self.name
        )
    }
}
