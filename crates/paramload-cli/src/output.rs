//! Rendering of loaded values

use crate::app::SchemaApp;
use crate::cli::OutputFormat;
use crate::error::Result;
use colored::Colorize;
use serde_json::{Map, Value, json};

pub fn render(app: &SchemaApp, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(app)),
        OutputFormat::Json => render_json(app),
    }
}

/// One `name = value` line per parameter, followed by where the value came from
fn render_text(app: &SchemaApp) -> String {
    let mut out = String::new();
    for (name, value) in app.values() {
        out.push_str(&format!(
            "{} = {}  {}\n",
            name.bold(),
            value,
            format!("# {}", app.provenance_of(&name)).dimmed()
        ));
    }
    out
}

fn render_json(app: &SchemaApp) -> Result<String> {
    let mut params = Map::new();
    for (name, value) in app.values() {
        let provenance = serde_json::to_value(app.provenance_of(&name))?;
        params.insert(name, json!({"value": value, "provenance": provenance}));
    }
    Ok(serde_json::to_string_pretty(&Value::Object(params))? + "\n")
}
