//! [`RecordingConfig`]: an in-memory config that reports what happens to it.

use paramload_core::{AppRef, Config, DictFinder, Finder, Loader, Result};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared event log; configs append `load <name>` when they are loaded
#[derive(Debug, Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// A dict-backed config that logs its loads and may read a field while
/// loading.
pub struct RecordingConfig {
    finder: Rc<DictFinder>,
    log: Log,
    reads: Option<(AppRef, String)>,
    observed: Rc<RefCell<Vec<Value>>>,
}

impl RecordingConfig {
    pub fn new(name: &str, values: Value, log: &Log) -> Self {
        Self {
            finder: Rc::new(DictFinder::new(name, values)),
            log: log.clone(),
            reads: None,
            observed: Rc::default(),
        }
    }

    /// Read `field` of `app` during every load of this config
    pub fn reading(mut self, app: AppRef, field: &str) -> Self {
        self.reads = Some((app, field.to_string()));
        self
    }

    /// Values of the field read during each load, oldest first
    pub fn observed(&self) -> Rc<RefCell<Vec<Value>>> {
        Rc::clone(&self.observed)
    }
}

impl Config for RecordingConfig {
    fn name(&self) -> String {
        self.finder.source().to_string()
    }

    fn load(&mut self, loader: &Loader) -> Result<()> {
        self.log.push(format!("load {}", self.finder.source()));
        if let Some((app, field)) = &self.reads {
            let value = loader.field(app, field)?;
            self.observed.borrow_mut().push(value);
        }
        Ok(())
    }

    fn finders(&self) -> Vec<Rc<dyn Finder>> {
        vec![Rc::clone(&self.finder) as Rc<dyn Finder>]
    }
}
