//! Shared test utilities for the paramload workspace.
//!
//! This crate provides standardised fixtures so the crate test suites don't
//! each grow their own. It is a dev-dependency only and never published.
//!
//! # Modules
//!
//! - [`app`]: [`TestApp`], an app whose fields are declared at runtime
//! - [`config`]: [`RecordingConfig`], a config that logs when it is loaded
//!   and can read a field during its own load
//! - [`dir`]: [`TestDir`], a temporary directory for file-backed configs

pub mod app;
pub mod config;
pub mod dir;

pub use app::TestApp;
pub use config::{Log, RecordingConfig};
pub use dir::TestDir;
