//! CLI argument parsing using clap derive

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Resolve parameters declared in a schema from the command line, the
/// environment and config files
#[derive(Parser, Debug)]
#[command(name = "paramload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Parameter schema (TOML)
    #[arg(short, long, env = "PARAMLOAD_SCHEMA", value_name = "FILE")]
    pub schema: PathBuf,

    /// Set a value, e.g. `--set port=8080` or `--set db.host=localhost`.
    ///
    /// Values are parsed as JSON when possible and kept as strings otherwise.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    /// Read environment variables, optionally only those starting with PREFIX
    #[arg(long, value_name = "PREFIX", num_args = 0..=1, default_missing_value = "")]
    pub env: Option<String>,

    /// Extra config file, ranked below the environment and above schema files
    #[arg(short, long = "config", value_name = "FILE")]
    pub configs: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn parse_assignment(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", arg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_set_splits_on_first_equals() {
        let cli = Cli::parse_from(["paramload", "-s", "app.toml", "--set", "url=a=b"]);
        assert_eq!(cli.set, vec![("url".to_string(), "a=b".to_string())]);
    }

    #[test]
    fn test_set_requires_key() {
        let err = Cli::try_parse_from(["paramload", "-s", "app.toml", "--set", "=1"]).unwrap_err();
        assert!(err.to_string().contains("expected KEY=VALUE"));
    }

    #[test]
    fn test_env_prefix_is_optional() {
        let cli = Cli::parse_from(["paramload", "-s", "app.toml", "--env"]);
        assert_eq!(cli.env.as_deref(), Some(""));

        let cli = Cli::parse_from(["paramload", "-s", "app.toml", "--env", "APP_"]);
        assert_eq!(cli.env.as_deref(), Some("APP_"));

        let cli = Cli::parse_from(["paramload", "-s", "app.toml"]);
        assert_eq!(cli.env, None);
    }
}
