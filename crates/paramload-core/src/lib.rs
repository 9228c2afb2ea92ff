//! Parameter resolution engine
//!
//! This crate resolves the declared parameters of application objects to
//! concrete values drawn from ranked sources, implementing:
//!
//! - **Parameters**: getters, an apply pipeline and a pick policy combined into
//!   one recipe, bound to a single loader while a load runs
//! - **Getters**: key lookups in configs, method and function calls, literals
//! - **Pick policies**: `first`, `list`, `merge_dicts`, or custom
//! - **Loader**: multi-phase config loading, depth-first dependency
//!   resolution, and cycle detection
//!
//! # Architecture
//!
//! ```text
//!        load() / load_collection()
//!                   |
//!                Loader  ----  Config  ----  Finder
//!                   |
//!               Attribute  (app, parameter, provenance carrier)
//!                   |
//!               Parameter
//!                   |
//!     Getter -> Apply pipeline -> Pick
//! ```
//!
//! The engine performs no I/O. Configs that read files or the environment
//! live in `paramload-sources`.

pub mod app;
pub mod apply;
pub mod attribute;
pub mod cast;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod getter;
pub mod load;
pub mod loader;
pub mod parameter;
pub mod pick;
pub mod value;

pub use app::{App, AppRef, AsAny, Descriptor, DescriptorBuilder};
pub use apply::{ApplyFn, Pipeline};
pub use attribute::{Attribute, DiscardProvenance, Fields, ProvenanceMap, ProvenanceSink, ValueSink};
pub use collection::{Collection, Item};
pub use config::{Config, DictConfig, DictFinder, Finder};
pub use context::{ApplyContext, OnLoad, ResolveContext};
pub use error::{Error, Result};
pub use getter::{ConfigAttr, Func, Getter, Key, Method, Static};
pub use load::{
    LoadOptions, load, load_collection, load_with, recursive_load, recursive_load_from_list,
    recursive_load_from_map,
};
pub use loader::{Loader, LoaderId};
pub use parameter::{OnLoadFn, Parameter, ParameterBuilder};
pub use pick::{Candidate, Candidates, Pick};
pub use value::{FieldKey, KeyPath, Origin, Provenance, Segment};
