//! Configuration for the dialagent call engine
//!
//! Settings are layered: `config/default.yaml`, then an optional
//! environment-specific file, then `DIALAGENT__`-prefixed environment
//! variables. The persona configuration is what turns one engine into
//! many differently-voiced agents.

mod persona;
mod settings;

pub use persona::PersonaConfig;
pub use settings::{
    load_settings, EngineConfig, LlmConfig, ObservabilityConfig, ServerConfig, Settings,
    TelephonyConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
