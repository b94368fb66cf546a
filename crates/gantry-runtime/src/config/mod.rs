//! Configuration for a Gantry application.
//!
//! Settings are layered with figment: built-in defaults, then optional TOML or
//! YAML files, then `GANTRY_` environment variables.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AppConfig, GantryConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ResponseConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
