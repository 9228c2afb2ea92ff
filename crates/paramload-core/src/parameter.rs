//! Parameters: recipes for computing one value
//!
//! A [`Parameter`] chains its getters, runs every candidate through its apply
//! pipeline, and hands the lazy result to its pick policy. While a load is in
//! progress a parameter is bound to exactly one [`Loader`](crate::Loader);
//! resolving it from anywhere else is a usage error.

use crate::apply::Pipeline;
use crate::context::{ApplyContext, OnLoad, ResolveContext};
use crate::getter::Getter;
use crate::loader::LoaderId;
use crate::pick::{Candidates, Pick};
use crate::value::Provenance;
use crate::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hook run right after a parameter's value is stored
pub type OnLoadFn = Arc<dyn Fn(&OnLoad<'_>) -> Result<()> + Send + Sync>;

#[derive(Debug, Default)]
struct Binding {
    loader: Option<LoaderId>,
    count: usize,
}

/// A declared, configurable value and the recipe for resolving it
pub struct Parameter {
    name: Option<String>,
    getters: Vec<Box<dyn Getter>>,
    apply: Pipeline,
    pick: Pick,
    on_load: Option<OnLoadFn>,
    binding: Mutex<Binding>,
}

impl Parameter {
    pub fn builder() -> ParameterBuilder {
        ParameterBuilder::default()
    }

    /// Display name, if one was given
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pick(&self) -> &Pick {
        &self.pick
    }

    /// The loader this parameter is currently bound to
    pub fn bound_loader(&self) -> Option<LoaderId> {
        self.binding().loader
    }

    /// Attach to `loader`.
    ///
    /// Binding again from the same loader nests; binding from a different one
    /// fails.
    pub(crate) fn bind(&self, loader: LoaderId) -> Result<()> {
        let mut binding = self.binding();
        match binding.loader {
            Some(current) if current != loader => Err(Error::usage(format!(
                "{} is already bound to another loader",
                self.describe()
            ))),
            _ => {
                binding.loader = Some(loader);
                binding.count += 1;
                Ok(())
            }
        }
    }

    /// Undo one [`bind`](Self::bind); detaches when the count reaches zero
    pub(crate) fn unbind(&self) -> Result<()> {
        let mut binding = self.binding();
        if binding.count == 0 {
            return Err(Error::usage(format!("{} is not bound", self.describe())));
        }
        binding.count -= 1;
        if binding.count == 0 {
            binding.loader = None;
        }
        Ok(())
    }

    /// Compute this parameter's value for the attribute described by `ctx`
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<(Value, Provenance)> {
        if self.bound_loader() != Some(ctx.loader().id()) {
            return Err(Error::usage(format!(
                "cannot use {} outside of load()",
                ctx.label()
            )));
        }

        let candidates = self
            .getters
            .iter()
            .flat_map(move |getter| getter.iter_values(ctx))
            .map(move |item| {
                let (value, provenance) = item?;
                if self.apply.is_empty() {
                    return Ok((value, provenance));
                }
                let value = self.apply.run(value, &ApplyContext::new(ctx, &provenance))?;
                Ok((value, provenance))
            });

        let mut candidates = Candidates::new(ctx.label(), Box::new(candidates));
        let value = self
            .pick
            .pick(&mut candidates)
            .map_err(|e| e.for_param(ctx.label()))?;
        let provenance = candidates.into_provenance().unwrap_or_default();
        Ok((value, provenance))
    }

    pub(crate) fn run_on_load(&self, args: &OnLoad<'_>) -> Result<()> {
        match &self.on_load {
            Some(hook) => hook(args),
            None => Ok(()),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("parameter '{}'", name),
            None => "parameter".to_string(),
        }
    }

    fn binding(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field(
                "getters",
                &self.getters.iter().map(|g| g.describe()).collect::<Vec<_>>(),
            )
            .field("apply", &self.apply)
            .field("pick", &self.pick)
            .field("on_load", &self.on_load.is_some())
            .finish()
    }
}

/// Builder for [`Parameter`]
#[derive(Default)]
pub struct ParameterBuilder {
    name: Option<String>,
    getters: Vec<Box<dyn Getter>>,
    apply: Pipeline,
    pick: Pick,
    on_load: Option<OnLoadFn>,
}

impl ParameterBuilder {
    /// Name shown in diagnostics
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a getter; getters are consulted in the order they are added
    pub fn getter(mut self, getter: impl Getter + 'static) -> Self {
        self.getters.push(Box::new(getter));
        self
    }

    /// Add a transform applied to every candidate
    pub fn apply<F>(mut self, step: F) -> Self
    where
        F: Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.apply.push(step);
        self
    }

    pub fn pick(mut self, pick: Pick) -> Self {
        self.pick = pick;
        self
    }

    /// Shorthand for `pick(Pick::First(Some(default)))`
    pub fn default_value(self, default: impl Into<Value>) -> Self {
        self.pick(Pick::First(Some(default.into())))
    }

    pub fn on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OnLoad<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Arc<Parameter> {
        Arc::new(Parameter {
            name: self.name,
            getters: self.getters,
            apply: self.apply,
            pick: self.pick,
            on_load: self.on_load,
            binding: Mutex::new(Binding::default()),
        })
    }
}

/// Identity of a parameter, used to key attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ParamId(usize);

impl ParamId {
    pub(crate) fn of(param: &Arc<Parameter>) -> Self {
        Self(Arc::as_ptr(param) as usize)
    }
}
