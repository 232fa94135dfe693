//! Sift CLI library.
//!
//! This library provides the core functionality for the `sift` command-line
//! interface: configuration management, a local file text source, and the
//! command implementations that drive the extraction pipeline.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod source;

pub use cli::{Cli, Command};
pub use config::Config;
pub use error::{CliError, Result};
pub use source::FileTextSource;
