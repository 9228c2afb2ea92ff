//! Config sources that read the outside world
//!
//! [`paramload_core`] never performs I/O. This crate supplies the configs
//! that do:
//!
//! - [`EnvConfig`]: environment variables, optionally under a prefix
//! - [`FileConfig`]: a TOML, JSON or YAML file whose path may be fixed or
//!   computed from parameters resolved earlier in the same load
//!
//! Values carry [`Origin::Env`](paramload_core::Origin::Env) and
//! [`Origin::File`](paramload_core::Origin::File) provenance respectively.

pub mod env;
pub mod error;
pub mod file;
pub mod format;

pub use env::EnvConfig;
pub use error::{Error, Result};
pub use file::FileConfig;
pub use format::Format;
