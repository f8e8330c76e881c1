//! Configuration loading, validation and env substitution.
//!
//! Config files: `crosstalk.toml`, `crosstalk.yaml`, or `crosstalk.json`
//! Searched in `./` then `~/.config/crosstalk/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{CrosstalkConfig, DatabaseConfig, DiscordConfig, FilterConfig, RelayConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
