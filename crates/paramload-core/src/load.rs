//! Entry points for loading apps and collections

use crate::app::{App, AppRef};
use crate::attribute::{Attribute, DiscardProvenance, ProvenanceSink};
use crate::collection::Collection;
use crate::config::Config;
use crate::loader::Loader;
use crate::{Error, Result};
use std::rc::Rc;
use tracing::debug;

/// Overrides for [`load_with`]
#[derive(Default)]
pub struct LoadOptions {
    configs: Option<Vec<Box<dyn Config>>>,
    provenance: Option<Rc<dyn ProvenanceSink>>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use these configs instead of the ones the app declares
    pub fn configs(mut self, configs: Vec<Box<dyn Config>>) -> Self {
        self.configs = Some(configs);
        self
    }

    /// Record provenance here instead of in the app's own carrier
    pub fn provenance(mut self, provenance: Rc<dyn ProvenanceSink>) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

/// Load every parameter of `app` from the configs it declares
pub fn load<A: App>(app: &Rc<A>) -> Result<()> {
    load_with(app, LoadOptions::default())
}

/// Load every parameter of `app`, with explicit configs or provenance carrier
pub fn load_with<A: App>(app: &Rc<A>, options: LoadOptions) -> Result<()> {
    let configs = match options.configs {
        Some(configs) => configs,
        None => Rc::clone(app).configs()?,
    };
    let provenance = options
        .provenance
        .or_else(|| app.provenance())
        .unwrap_or_else(|| Rc::new(DiscardProvenance));

    let app: AppRef = Rc::clone(app) as AppRef;
    let attributes = Attribute::scan(&app, &provenance)?;
    debug!(
        app = app.type_name(),
        attributes = attributes.len(),
        configs = configs.len(),
        "loading app"
    );
    Loader::new(attributes, configs)?.load()
}

/// Load the parameters found in a list or mapping.
///
/// Every parameter leaf is replaced by its value; read the result back with
/// [`Collection::to_value`].
pub fn load_collection(
    collection: &Rc<Collection>,
    configs: Vec<Box<dyn Config>>,
    provenance: Option<Rc<dyn ProvenanceSink>>,
) -> Result<()> {
    if !collection.is_container() {
        return Err(Error::usage("expected a list or mapping at the root of the collection"));
    }
    let provenance = provenance.unwrap_or_else(|| Rc::new(DiscardProvenance));
    let app: AppRef = Rc::clone(collection) as AppRef;
    let attributes = Attribute::scan(&app, &provenance)?;
    Loader::new(attributes, configs)?.load()
}

/// Register the parameters of `app` with a loader that is already running.
///
/// Meant to be called from an on-load hook, so that values computed by one
/// app can bring further apps into the same load.
pub fn recursive_load(loader: &Loader, app: AppRef) -> Result<()> {
    let provenance = app
        .provenance()
        .unwrap_or_else(|| Rc::new(DiscardProvenance));
    let attributes = Attribute::scan(&app, &provenance)?;
    loader.add_attributes(attributes)
}

/// [`recursive_load`] for every app in a list
pub fn recursive_load_from_list(loader: &Loader, apps: &[AppRef]) -> Result<()> {
    for app in apps {
        recursive_load(loader, Rc::clone(app))?;
    }
    Ok(())
}

/// [`recursive_load`] for every value of a mapping
pub fn recursive_load_from_map<'a, K: 'a>(
    loader: &Loader,
    apps: impl IntoIterator<Item = (&'a K, &'a AppRef)>,
) -> Result<()> {
    for (_, app) in apps {
        recursive_load(loader, Rc::clone(app))?;
    }
    Ok(())
}
