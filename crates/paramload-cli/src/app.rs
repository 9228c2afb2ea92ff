//! [`SchemaApp`]: an app whose parameters come from a schema file

use crate::error::{CliError, Result};
use crate::schema::{FilePath, FileSpec, Schema};
use paramload_core::{
    App, AppRef, Config, DictConfig, FieldKey, Fields, KeyPath, Parameter, Provenance,
    ProvenanceMap, ProvenanceSink, ValueSink,
};
use paramload_sources::{EnvConfig, FileConfig};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

/// Sources requested on the command line, highest ranked first
#[derive(Debug, Default, Clone)]
pub struct Sources {
    /// `--set KEY=VALUE` pairs
    pub set: Vec<(String, String)>,
    /// `--env [PREFIX]`
    pub env: Option<String>,
    /// `--config FILE`
    pub configs: Vec<PathBuf>,
}

pub struct SchemaApp {
    params: Vec<(String, Arc<Parameter>)>,
    command_line: Value,
    env: Option<String>,
    configs: Vec<PathBuf>,
    files: Vec<FileSpec>,
    fields: Fields,
    provenance: Rc<ProvenanceMap>,
}

impl SchemaApp {
    pub fn new(schema: &Schema, sources: Sources) -> Result<Self> {
        Ok(Self {
            params: schema.parameters(),
            command_line: command_line_values(&sources.set)?,
            env: sources.env,
            configs: sources.configs,
            files: schema.files.clone(),
            fields: Fields::new(),
            provenance: Rc::new(ProvenanceMap::new()),
        })
    }

    /// Every loaded value, by parameter name
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.fields.snapshot()
    }

    pub fn provenance_of(&self, name: &str) -> Provenance {
        self.provenance.get(name).unwrap_or_default()
    }
}

impl App for SchemaApp {
    fn parameters(&self) -> paramload_core::Result<Vec<(FieldKey, Arc<Parameter>)>> {
        Ok(self
            .params
            .iter()
            .map(|(name, param)| (FieldKey::name(name.as_str()), Arc::clone(param)))
            .collect())
    }

    fn store(&self) -> &dyn ValueSink {
        &self.fields
    }

    fn configs(self: Rc<Self>) -> paramload_core::Result<Vec<Box<dyn Config>>> {
        let mut configs: Vec<Box<dyn Config>> = vec![Box::new(DictConfig::new(
            "command line",
            self.command_line.clone(),
        ))];

        if let Some(prefix) = &self.env {
            configs.push(Box::new(EnvConfig::new().with_prefix(prefix.as_str())));
        }
        for path in &self.configs {
            configs.push(Box::new(FileConfig::new(path)));
        }

        let app: AppRef = Rc::clone(&self) as AppRef;
        for file in &self.files {
            let mut config = match file.source() {
                Some(FilePath::Fixed(path)) => FileConfig::new(path),
                Some(FilePath::Param(param)) => FileConfig::from_field(Rc::clone(&app), param),
                None => continue,
            };
            if let Some(format) = file.format {
                config = config.format(format.into());
            }
            if file.optional {
                config = config.optional();
            }
            if let Some(root_key) = &file.root_key {
                config = config.root_key(KeyPath::dotted(root_key));
            }
            configs.push(Box::new(config));
        }

        Ok(configs)
    }

    fn provenance(&self) -> Option<Rc<dyn ProvenanceSink>> {
        Some(Rc::clone(&self.provenance) as Rc<dyn ProvenanceSink>)
    }

    fn type_name(&self) -> &'static str {
        "schema"
    }
}

/// Nest `--set` pairs into a mapping; dotted keys become nested tables
fn command_line_values(set: &[(String, String)]) -> Result<Value> {
    let mut root = Map::new();
    for (key, raw) in set {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        let segments: Vec<&str> = key.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };

        let mut table = &mut root;
        for segment in parents {
            let entry = table
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            table = match entry {
                Value::Object(map) => map,
                _ => return Err(conflict(key)),
            };
        }
        if matches!(table.get(*last), Some(Value::Object(_))) {
            return Err(conflict(key));
        }
        table.insert(last.to_string(), value);
    }
    Ok(Value::Object(root))
}

fn conflict(key: &str) -> CliError {
    CliError::Load(paramload_core::Error::usage(format!(
        "--set {}: conflicts with another --set value",
        key
    )))
}
