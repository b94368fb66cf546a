//! Gantry Runtime - application wiring for the Gantry dispatch core.
//!
//! This crate provides:
//! - The [`Application`] collaborator: handler registration at startup and
//!   mapping of dispatch failures to error responses
//! - Layered configuration via figment ([`config`])
//! - Logging setup via tracing-subscriber ([`logging`])
//!
//! ```rust,ignore
//! use gantry_runtime::{Application, config::load_config, logging};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//!
//! let app = Application::from_config(&config);
//! app.route(handler)?;
//! let response = app.handle("get_user", connection).await?;
//! ```

pub mod application;
pub mod config;
pub mod error;
pub mod logging;

pub use application::{Application, root_layer};
pub use config::{ConfigError, ConfigLoader, ConfigResult, GantryConfig, load_config};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
