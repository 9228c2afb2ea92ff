//! Parameter schemas read from TOML
//!
//! ```toml
//! [params.port]
//! type = "integer"
//! default = 8080
//!
//! [params.config]
//! default = "app.toml"
//!
//! [[files]]
//! path_param = "config"
//! optional = true
//! ```

use crate::error::{CliError, Result};
use paramload_core::{DictConfig, Key, KeyPath, Parameter, Pick, apply, cast};
use paramload_sources::{EnvConfig, FileConfig, Format};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,

    /// Config files, highest ranked first
    #[serde(default)]
    pub files: Vec<FileSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    /// Lookup key, dotted for nested tables; defaults to the parameter name
    pub key: Option<String>,

    /// Environment variable name, without prefix; defaults to the upper-cased key
    pub env: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: ValueKind,

    #[serde(default)]
    pub pick: PickSpec,

    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    /// Relative to the file the value was read from
    Path,
    /// Arithmetic expression evaluated to a number
    Expr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickSpec {
    #[default]
    First,
    List,
    Merge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    /// Fixed path, relative to the schema file
    pub path: Option<PathBuf>,

    /// Name of a parameter holding the path
    pub path_param: Option<String>,

    pub format: Option<FormatSpec>,

    #[serde(default)]
    pub optional: bool,

    pub root_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatSpec {
    Toml,
    Json,
    Yaml,
}

impl From<FormatSpec> for Format {
    fn from(spec: FormatSpec) -> Self {
        match spec {
            FormatSpec::Toml => Format::Toml,
            FormatSpec::Json => Format::Json,
            FormatSpec::Yaml => Format::Yaml,
        }
    }
}

/// Where a schema file gets its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePath {
    Fixed(PathBuf),
    Param(String),
}

impl Schema {
    /// Read and validate a schema file.
    ///
    /// Fixed file paths are made relative to the schema's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut schema: Schema =
            toml::from_str(&content).map_err(|e| CliError::schema(path, e.to_string()))?;

        let base = path.parent().unwrap_or(Path::new(""));
        for file in &mut schema.files {
            if let Some(fixed) = &mut file.path {
                if fixed.is_relative() {
                    *fixed = base.join(&*fixed);
                }
            }
        }

        schema
            .validate()
            .map_err(|message| CliError::schema(path, message))?;
        Ok(schema)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for (name, spec) in &self.params {
            if spec.default.is_some() && spec.pick != PickSpec::First {
                return Err(format!(
                    "parameter '{}': a default is only allowed with pick = \"first\"",
                    name
                ));
            }
        }
        for (i, file) in self.files.iter().enumerate() {
            match (&file.path, &file.path_param) {
                (Some(_), None) => {}
                (None, Some(param)) if self.params.contains_key(param) => {}
                (None, Some(param)) => {
                    return Err(format!("files[{}]: unknown parameter '{}'", i, param));
                }
                _ => {
                    return Err(format!(
                        "files[{}]: exactly one of 'path' and 'path_param' is required",
                        i
                    ));
                }
            }
        }
        Ok(())
    }

    /// Build one parameter per declared entry, in name order
    pub fn parameters(&self) -> Vec<(String, Arc<Parameter>)> {
        self.params
            .iter()
            .map(|(name, spec)| (name.clone(), spec.build(name)))
            .collect()
    }
}

impl ParamSpec {
    fn key(&self, name: &str) -> String {
        self.key.clone().unwrap_or_else(|| name.to_string())
    }

    /// Name of the environment variable, without prefix
    pub fn env_var(&self, name: &str) -> String {
        match &self.env {
            Some(var) => var.clone(),
            None => self.key(name).to_uppercase().replace(['.', '-'], "_"),
        }
    }

    /// Command line first, then the environment, then files
    pub fn build(&self, name: &str) -> Arc<Parameter> {
        let key = KeyPath::dotted(&self.key(name));
        let mut builder = Parameter::builder()
            .named(name)
            .getter(Key::new::<DictConfig>(key.clone()))
            .getter(Key::new::<EnvConfig>(self.env_var(name)))
            .getter(Key::new::<FileConfig>(key));

        builder = match self.kind {
            ValueKind::String => builder,
            ValueKind::Integer => builder.apply(apply::integer()),
            ValueKind::Float => builder.apply(apply::float()),
            ValueKind::Boolean => builder.apply(apply::boolean()),
            ValueKind::Path => builder.apply(apply::relpath()),
            ValueKind::Expr => builder.apply(cast::arithmetic(cast::Vars::new())),
        };

        builder = match (self.pick, &self.default) {
            (PickSpec::First, Some(default)) => builder.default_value(default.clone()),
            (PickSpec::First, None) => builder,
            (PickSpec::List, _) => builder.pick(Pick::List),
            (PickSpec::Merge, _) => builder.pick(Pick::MergeDicts { keep_last: false }),
        };

        builder.build()
    }
}

impl FileSpec {
    /// Where the file's path comes from; `None` if neither is declared
    pub fn source(&self) -> Option<FilePath> {
        match (&self.path, &self.path_param) {
            (Some(path), _) => Some(FilePath::Fixed(path.clone())),
            (None, Some(param)) => Some(FilePath::Param(param.clone())),
            (None, None) => None,
        }
    }
}
