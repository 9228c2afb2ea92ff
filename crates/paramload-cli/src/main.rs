//! paramload CLI
//!
//! Declares parameters from a TOML schema, resolves them from the command
//! line, the environment and config files, and prints each value with its
//! provenance.

mod app;
mod cli;
mod error;
mod logging;
mod output;
mod schema;

use clap::Parser;
use colored::Colorize;
use std::rc::Rc;

use app::{SchemaApp, Sources};
use cli::Cli;
use error::Result;
use schema::Schema;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let schema = Schema::load(&cli.schema)?;
    tracing::debug!(
        schema = %cli.schema.display(),
        params = schema.params.len(),
        files = schema.files.len(),
        "schema loaded"
    );

    let app = Rc::new(SchemaApp::new(
        &schema,
        Sources {
            set: cli.set,
            env: cli.env,
            configs: cli.configs,
        },
    )?);
    paramload_core::load(&app)?;

    print!("{}", output::render(&app, cli.format)?);
    Ok(())
}
