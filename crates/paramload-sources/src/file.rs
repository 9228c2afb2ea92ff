//! [`FileConfig`]: values from a TOML, JSON or YAML file

use crate::{Error, Format};
use paramload_core::{AppRef, Config, DictFinder, Finder, KeyPath, Loader, Origin};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

type PathFn = Box<dyn Fn(&Loader) -> paramload_core::Result<Option<PathBuf>>>;
type SchemaFn = Arc<dyn Fn(&Value) -> paramload_core::Result<Value> + Send + Sync>;

enum PathSource {
    Fixed(PathBuf),
    Computed(PathFn),
}

/// Reads values from a config file.
///
/// The path is either fixed up front or computed when the config is loaded,
/// in which case it may depend on parameters resolved from higher-ranked
/// configs. The file is read on every load.
pub struct FileConfig {
    name: Option<String>,
    path: PathSource,
    format: Option<Format>,
    optional: bool,
    root_key: Option<KeyPath>,
    schema: Option<SchemaFn>,
    loaded_path: Option<PathBuf>,
    finder: Option<Rc<DictFinder>>,
}

impl FileConfig {
    /// Read the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_source(PathSource::Fixed(path.into()))
    }

    /// Compute the path at load time; `None` means there is no file to read
    pub fn computed<F>(path: F) -> Self
    where
        F: Fn(&Loader) -> paramload_core::Result<Option<PathBuf>> + 'static,
    {
        Self::from_source(PathSource::Computed(Box::new(path)))
    }

    /// Take the path from the field `field` of `app`.
    ///
    /// A null field means there is no file to read.
    pub fn from_field(app: AppRef, field: impl Into<String>) -> Self {
        let field = field.into();
        Self::computed(move |loader| match loader.field(&app, &field)? {
            Value::Null => Ok(None),
            Value::String(path) => Ok(Some(PathBuf::from(path))),
            other => Err(paramload_core::Error::InvalidValue {
                param: format!("{}.{}", app.type_name(), field),
                message: format!("expected a file path, got {}", other),
            }),
        })
    }

    fn from_source(path: PathSource) -> Self {
        Self {
            name: None,
            path,
            format: None,
            optional: false,
            root_key: None,
            schema: None,
            loaded_path: None,
            finder: None,
        }
    }

    /// Name used in diagnostics and [`Origin::Config`] records
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse as `format` regardless of the file extension
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Treat a missing file as an empty one
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Only look for keys below `root_key`, e.g. `tool.myapp`
    pub fn root_key(mut self, root_key: impl Into<KeyPath>) -> Self {
        self.root_key = Some(root_key.into());
        self
    }

    /// Validate or reshape the parsed file before lookups
    pub fn schema<F>(mut self, schema: F) -> Self
    where
        F: Fn(&Value) -> paramload_core::Result<Value> + Send + Sync + 'static,
    {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Path read by the most recent load, if any
    pub fn path(&self) -> Option<&Path> {
        self.loaded_path.as_deref()
    }

    fn resolve_path(&self, loader: &Loader) -> paramload_core::Result<Option<PathBuf>> {
        match &self.path {
            PathSource::Fixed(path) => Ok(Some(path.clone())),
            PathSource::Computed(compute) => compute(loader),
        }
    }

    fn read(&self, path: &Path) -> crate::Result<Option<Value>> {
        let format = match self.format {
            Some(format) => format,
            None => Format::from_path(path)?,
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && self.optional => {
                debug!(path = %path.display(), "optional config file not found");
                return Ok(None);
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        format.parse(&content, path).map(Some)
    }
}

impl Config for FileConfig {
    fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match (&self.loaded_path, &self.path) {
            (Some(path), _) | (None, PathSource::Fixed(path)) => path.display().to_string(),
            (None, PathSource::Computed(_)) => "file".to_string(),
        }
    }

    fn load(&mut self, loader: &Loader) -> paramload_core::Result<()> {
        self.finder = None;
        self.loaded_path = self.resolve_path(loader)?;

        let Some(path) = self.loaded_path.clone() else {
            debug!(config = %self.name(), "no config file to read");
            return Ok(());
        };
        let Some(values) = self.read(&path).map_err(|e| e.into_config(self.name()))? else {
            return Ok(());
        };
        debug!(path = %path.display(), "read config file");

        let origin_path = path.clone();
        let mut finder = DictFinder::new(self.name(), values).with_origin(
            move |key: &KeyPath, _: &Value| Origin::File {
                path: origin_path.clone(),
                key: key.to_string(),
            },
        );
        if let Some(root_key) = &self.root_key {
            finder = finder.with_root_key(root_key.clone());
        }
        if let Some(schema) = &self.schema {
            let schema = Arc::clone(schema);
            finder = finder.with_schema(move |values| schema(values));
        }
        self.finder = Some(Rc::new(finder));
        Ok(())
    }

    fn finders(&self) -> Vec<Rc<dyn Finder>> {
        self.finder
            .iter()
            .map(|finder| Rc::clone(finder) as Rc<dyn Finder>)
            .collect()
    }
}
