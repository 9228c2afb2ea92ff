//! The loader: multi-phase orchestration and dependency resolution
//!
//! Each config is loaded in rank order. Before every config load, and once
//! more before the final pass, transient state is reset: values computed so
//! far are discarded and attributes discovered along the way are forgotten.
//! A config therefore only ever observes values computed from the configs
//! ranked before it, and nothing computed mid-load survives into the final
//! pass.
//!
//! Attributes are resolved depth-first on demand. The loader keeps a stack of
//! attributes currently being computed; requesting one that is already on the
//! stack is a [`CircularDependency`](crate::Error::CircularDependency).

use crate::app::{AppId, AppRef};
use crate::attribute::{AttrKey, Attribute};
use crate::config::Config;
use crate::context::{OnLoad, ResolveContext};
use crate::parameter::{ParamId, Parameter};
use crate::value::{FieldKey, Provenance};
use crate::{Error, Result};
use serde_json::Value;
use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Identity of a loader, used by parameters to track who they are bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(u64);

impl LoaderId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable index of a registered attribute; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct AttrHandle(usize);

#[derive(Debug)]
enum Status {
    Pending,
    Locked,
    Loaded { value: Value, provenance: Provenance },
}

#[derive(Debug)]
struct Entry {
    attribute: Attribute,
    status: Status,
    discovered_mid_load: bool,
}

struct ParamUse {
    param: Arc<Parameter>,
    attributes: usize,
}

#[derive(Default)]
struct State {
    entries: Vec<Option<Entry>>,
    handles: HashMap<AttrKey, AttrHandle>,
    pending: BTreeSet<AttrHandle>,
    locked: Vec<AttrHandle>,
    params: HashMap<ParamId, ParamUse>,
    running: bool,
}

impl State {
    fn entry(&self, handle: AttrHandle) -> Result<&Entry> {
        self.entries
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::usage("attribute was forgotten while in use"))
    }

    fn entry_mut(&mut self, handle: AttrHandle) -> Result<&mut Entry> {
        self.entries
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::usage("attribute was forgotten while in use"))
    }

    fn label(&self, handle: AttrHandle) -> String {
        self.entry(handle)
            .map(|entry| entry.attribute.label())
            .unwrap_or_else(|_| format!("<attribute {}>", handle.0))
    }

    fn bound_params(&self) -> Vec<Arc<Parameter>> {
        self.params
            .values()
            .map(|usage| Arc::clone(&usage.param))
            .collect()
    }
}

/// Owns a set of attributes and an ordered list of configs, and resolves the
/// former from the latter
pub struct Loader {
    id: LoaderId,
    configs: Vec<RefCell<Box<dyn Config>>>,
    loaded_configs: Cell<usize>,
    state: RefCell<State>,
}

impl Loader {
    /// Create a loader over `attributes`, reading from `configs` in rank order
    pub fn new(attributes: Vec<Attribute>, configs: Vec<Box<dyn Config>>) -> Result<Self> {
        let loader = Self {
            id: LoaderId::next(),
            configs: configs.into_iter().map(RefCell::new).collect(),
            loaded_configs: Cell::new(0),
            state: RefCell::new(State::default()),
        };
        loader.add_attributes(attributes)?;
        Ok(loader)
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    /// True while [`load`](Self::load) is executing
    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Number of attributes currently registered
    pub fn len(&self) -> usize {
        self.state.borrow().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every attribute.
    ///
    /// Any error aborts the whole load. Values stored before the error keep
    /// their last assignment.
    pub fn load(&self) -> Result<()> {
        self.begin()?;
        let result = self.run_phases();
        let finished = self.finish();
        result.and(finished)
    }

    fn begin(&self) -> Result<()> {
        let params = {
            let state = self.state.borrow();
            if state.running {
                return Err(Error::usage("load() is already running on this loader"));
            }
            state.bound_params()
        };

        for (i, param) in params.iter().enumerate() {
            if let Err(e) = param.bind(self.id) {
                for bound in &params[..i] {
                    let _ = bound.unbind();
                }
                return Err(e);
            }
        }

        self.state.borrow_mut().running = true;
        self.loaded_configs.set(0);
        Ok(())
    }

    fn run_phases(&self) -> Result<()> {
        for (i, cell) in self.configs.iter().enumerate() {
            self.reset()?;
            let mut config = cell.borrow_mut();
            let name = config.name();
            debug!(config = %name, phase = i, "loading config");
            config.load(self)?;
            debug!(config = %name, phase = i, "config loaded");
            drop(config);
            self.loaded_configs.set(i + 1);
        }

        self.reset()?;
        debug!(attributes = self.len(), "final pass");
        while let Some(handle) = self.next_pending() {
            self.resolve_handle(handle)?;
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let params = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            state.running = false;
            for handle in state.locked.drain(..) {
                if let Some(Some(entry)) = state.entries.get_mut(handle.0) {
                    entry.status = Status::Pending;
                }
            }
            state.bound_params()
        };

        let mut result = Ok(());
        for param in params {
            if let Err(e) = param.unbind() {
                result = result.and(Err(e));
            }
        }
        result
    }

    fn next_pending(&self) -> Option<AttrHandle> {
        self.state.borrow().pending.first().copied()
    }

    /// Discard values computed so far and forget attributes discovered since
    /// `load()` began
    fn reset(&self) -> Result<()> {
        let mut cleared = Vec::new();
        let mut unbound = Vec::new();
        let mut forgotten = 0;
        {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            for index in 0..state.entries.len() {
                let handle = AttrHandle(index);
                let Some(entry) = state.entries[index].as_mut() else {
                    continue;
                };

                if entry.discovered_mid_load {
                    let Some(entry) = state.entries[index].take() else {
                        continue;
                    };
                    state.handles.remove(&entry.attribute.id());
                    state.pending.remove(&handle);
                    let id = ParamId::of(entry.attribute.param());
                    if let Some(usage) = state.params.get_mut(&id) {
                        usage.attributes -= 1;
                        if usage.attributes == 0 {
                            if let Some(usage) = state.params.remove(&id) {
                                if state.running {
                                    unbound.push(usage.param);
                                }
                            }
                        }
                    }
                    if matches!(entry.status, Status::Loaded { .. }) {
                        cleared.push(entry.attribute);
                    }
                    forgotten += 1;
                } else if matches!(entry.status, Status::Loaded { .. }) {
                    entry.status = Status::Pending;
                    state.pending.insert(handle);
                    cleared.push(entry.attribute.clone());
                }
            }
        }

        if forgotten > 0 {
            debug!(forgotten, "forgot attributes discovered mid-load");
        }
        trace!(cleared = cleared.len(), "reset transient state");

        for attribute in cleared {
            attribute.clear()?;
        }
        for param in unbound {
            param.unbind()?;
        }
        Ok(())
    }

    /// Register more attributes.
    ///
    /// Fails without registering anything if any `(app, parameter)` pair is
    /// already known. Attributes added while a load is running are forgotten
    /// at the next phase boundary.
    pub fn add_attributes(&self, attributes: Vec<Attribute>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;

        let mut seen = HashSet::new();
        for attribute in &attributes {
            let key = attribute.id();
            if state.handles.contains_key(&key) || !seen.insert(key) {
                return Err(Error::usage(format!(
                    "{} is already registered with this loader",
                    attribute.label()
                )));
            }
        }

        let running = state.running;
        if running {
            let mut bound: Vec<&Arc<Parameter>> = Vec::new();
            for attribute in &attributes {
                let param = attribute.param();
                let id = ParamId::of(param);
                if state.params.contains_key(&id) || bound.iter().any(|p| Arc::ptr_eq(p, param)) {
                    continue;
                }
                if let Err(e) = param.bind(self.id) {
                    for param in bound {
                        let _ = param.unbind();
                    }
                    return Err(e);
                }
                bound.push(param);
            }
        }

        let added = attributes.len();
        for attribute in attributes {
            let handle = AttrHandle(state.entries.len());
            let param = Arc::clone(attribute.param());
            state.handles.insert(attribute.id(), handle);
            state.pending.insert(handle);
            state
                .params
                .entry(ParamId::of(&param))
                .or_insert(ParamUse {
                    param,
                    attributes: 0,
                })
                .attributes += 1;
            state.entries.push(Some(Entry {
                attribute,
                status: Status::Pending,
                discovered_mid_load: running,
            }));
        }

        if added > 0 {
            debug!(added, mid_load = running, "registered attributes");
        }
        Ok(())
    }

    fn handle_of(&self, app: &AppRef, param: &Arc<Parameter>) -> Result<AttrHandle> {
        self.state
            .borrow()
            .handles
            .get(&AttrKey::new(app, param))
            .copied()
            .ok_or_else(|| {
                Error::usage(format!(
                    "{} of {} is not registered with this loader",
                    param.describe(),
                    app.type_name()
                ))
            })
    }

    /// Compute and store the value of one pending attribute
    pub fn resolve_attribute(&self, app: &AppRef, param: &Arc<Parameter>) -> Result<()> {
        let handle = self.handle_of(app, param)?;
        self.resolve_handle(handle)
    }

    fn resolve_handle(&self, handle: AttrHandle) -> Result<()> {
        let attribute = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            match state.entry(handle)?.status {
                Status::Pending => {}
                Status::Locked => {
                    let chain = state
                        .locked
                        .iter()
                        .chain(std::iter::once(&handle))
                        .map(|h| state.label(*h))
                        .collect();
                    return Err(Error::CircularDependency { chain });
                }
                Status::Loaded { .. } => {
                    return Err(Error::usage(format!(
                        "{} is already loaded",
                        state.label(handle)
                    )));
                }
            }
            let entry = state.entry_mut(handle)?;
            entry.status = Status::Locked;
            let attribute = entry.attribute.clone();
            state.locked.push(handle);
            attribute
        };

        let label = attribute.label();
        trace!(attribute = %label, "resolving");
        let ctx = ResolveContext::new(self, attribute.app(), &label);
        let result = attribute.param().resolve(&ctx);

        {
            let mut state = self.state.borrow_mut();
            if let Some(pos) = state.locked.iter().rposition(|h| *h == handle) {
                state.locked.remove(pos);
            }
            if result.is_err() {
                if let Ok(entry) = state.entry_mut(handle) {
                    entry.status = Status::Pending;
                }
            }
        }

        let (value, provenance) = result?;
        trace!(attribute = %label, value = %value, "resolved");
        if let Err(e) = attribute.store(value.clone(), provenance.clone()) {
            if let Ok(entry) = self.state.borrow_mut().entry_mut(handle) {
                entry.status = Status::Pending;
            }
            return Err(e);
        }

        {
            let mut state = self.state.borrow_mut();
            state.entry_mut(handle)?.status = Status::Loaded {
                value: value.clone(),
                provenance: provenance.clone(),
            };
            state.pending.remove(&handle);
        }

        attribute.param().run_on_load(&OnLoad {
            loader: self,
            app: attribute.app(),
            value: &value,
            provenance: &provenance,
        })
    }

    /// The value of `param` on `app`, resolving it first if necessary.
    ///
    /// Resolution is only possible while this loader is running; a value
    /// stored by an earlier load is returned as is.
    pub fn value(&self, app: &AppRef, param: &Arc<Parameter>) -> Result<Value> {
        let handle = self.handle_of(app, param)?;
        if let Some(value) = self.loaded_value(handle)? {
            return Ok(value);
        }

        if param.bound_loader() != Some(self.id) {
            let label = self.state.borrow().label(handle);
            return Err(Error::usage(format!(
                "cannot use {} outside of load()",
                label
            )));
        }

        self.resolve_handle(handle)?;
        self.loaded_value(handle)?
            .ok_or_else(|| Error::usage("attribute was reset while it was being read"))
    }

    /// The value of the field called `name` on `app`
    pub fn field(&self, app: &AppRef, name: &str) -> Result<Value> {
        let param = {
            let state = self.state.borrow();
            let id = AppId::of(app);
            let wanted = FieldKey::name(name);
            state
                .entries
                .iter()
                .flatten()
                .find(|entry| {
                    AppId::of(entry.attribute.app()) == id && *entry.attribute.key() == wanted
                })
                .map(|entry| Arc::clone(entry.attribute.param()))
        };

        match param {
            Some(param) => self.value(app, &param),
            None => Err(Error::usage(format!(
                "{} has no parameter '{}'",
                app.type_name(),
                name
            ))),
        }
    }

    /// Provenance of the value of `param` on `app`, if it has been loaded
    pub fn provenance(&self, app: &AppRef, param: &Arc<Parameter>) -> Result<Option<Provenance>> {
        let handle = self.handle_of(app, param)?;
        let state = self.state.borrow();
        Ok(match &state.entry(handle)?.status {
            Status::Loaded { provenance, .. } => Some(provenance.clone()),
            _ => None,
        })
    }

    fn loaded_value(&self, handle: AttrHandle) -> Result<Option<Value>> {
        let state = self.state.borrow();
        Ok(match &state.entry(handle)?.status {
            Status::Loaded { value, .. } => Some(value.clone()),
            _ => None,
        })
    }

    /// Configs that have finished loading during the current load, in rank
    /// order
    pub(crate) fn loaded_configs(&self) -> impl Iterator<Item = Ref<'_, dyn Config + 'static>> + '_ {
        self.configs[..self.loaded_configs.get()]
            .iter()
            .map(|cell| Ref::map(cell.borrow(), |config| &**config))
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Loader")
            .field("id", &self.id)
            .field("configs", &self.configs.len())
            .field("loaded_configs", &self.loaded_configs.get())
            .field("attributes", &state.handles.len())
            .field("pending", &state.pending.len())
            .field("running", &state.running)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::App;
    use crate::attribute::{DiscardProvenance, Fields, ProvenanceSink, ValueSink};
    use crate::getter::Static;
    use serde_json::json;
    use std::rc::Rc;

    struct One {
        fields: Fields,
    }

    impl App for One {
        fn parameters(&self) -> Result<Vec<(FieldKey, Arc<Parameter>)>> {
            Ok(Vec::new())
        }

        fn store(&self) -> &dyn ValueSink {
            &self.fields
        }
    }

    fn attribute(app: &AppRef, name: &str, param: &Arc<Parameter>) -> Attribute {
        let provenance: Rc<dyn ProvenanceSink> = Rc::new(DiscardProvenance);
        Attribute::new(Rc::clone(app), FieldKey::name(name), Arc::clone(param), provenance)
    }

    #[test]
    fn test_handles_are_not_reused_after_forgetting() {
        let app: AppRef = Rc::new(One {
            fields: Fields::new(),
        });
        let a = Parameter::builder().getter(Static::new(1)).build();
        let loader = Loader::new(vec![attribute(&app, "a", &a)], Vec::new()).unwrap();

        loader.state.borrow_mut().running = true;
        let b = Parameter::builder().getter(Static::new(2)).build();
        loader.add_attributes(vec![attribute(&app, "b", &b)]).unwrap();
        assert_eq!(loader.len(), 2);
        assert_eq!(b.bound_loader(), Some(loader.id()));

        loader.reset().unwrap();
        assert_eq!(loader.len(), 1);
        assert_eq!(b.bound_loader(), None);

        let c = Parameter::builder().getter(Static::new(3)).build();
        loader.add_attributes(vec![attribute(&app, "c", &c)]).unwrap();
        let state = loader.state.borrow();
        assert_eq!(state.entries.len(), 3);
        assert!(state.entries[1].is_none());
        assert_eq!(state.handles.get(&AttrKey::new(&app, &c)), Some(&AttrHandle(2)));
    }

    #[test]
    fn test_load_resolves_in_registration_order() {
        let app: AppRef = Rc::new(One {
            fields: Fields::new(),
        });
        let a = Parameter::builder().getter(Static::new("a")).build();
        let b = Parameter::builder().getter(Static::new("b")).build();
        let loader =
            Loader::new(vec![attribute(&app, "a", &a), attribute(&app, "b", &b)], Vec::new())
                .unwrap();
        loader.load().unwrap();

        assert_eq!(loader.value(&app, &a).unwrap(), json!("a"));
        assert_eq!(loader.field(&app, "b").unwrap(), json!("b"));
        assert!(!loader.is_running());
        assert_eq!(a.bound_loader(), None);
    }
}
