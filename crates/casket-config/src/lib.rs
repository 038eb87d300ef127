//! Configuration system for Casket session storage.
//!
//! Provides TOML-based configuration with:
//! - The session key namespace and default timeout (`[session]`)
//! - Lock acquisition retry policy (`[session.lock]`)
//! - Explicit key/value backend selection (`[client]`)
//! - Optional JSON file logging (`[logging]`)
//!
//! Unknown parameters and invalid values are fatal at startup.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_ENV, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
