//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, PersonaConfig};

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Telephony provider configuration
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Language-model collaborator configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Conversation engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Agent persona
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.generation_timeout_ms < 500 {
            return Err(ConfigError::InvalidValue {
                field: "engine.generation_timeout_ms".to_string(),
                message: "generation timeout too low (minimum 500ms)".to_string(),
            });
        }

        if self.engine.max_no_input_timeouts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_no_input_timeouts".to_string(),
                message: "must allow at least one no-input re-prompt".to_string(),
            });
        }

        if self.persona.closing_phrases.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "persona.closing_phrases".to_string(),
                message: "closing phrase set must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL the telephony provider can reach us at
    /// (e.g. an ngrok or load-balancer URL). Webhook and media-stream
    /// URLs are derived from it.
    #[serde(default)]
    pub external_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            external_url: String::new(),
        }
    }
}

/// Telephony provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// Account identifier
    #[serde(default)]
    pub account_sid: String,

    /// API auth token (set via DIALAGENT__TELEPHONY__AUTH_TOKEN)
    #[serde(default)]
    pub auth_token: String,

    /// Originating phone number for outbound calls
    #[serde(default)]
    pub from_number: String,

    /// REST API base URL
    #[serde(default = "default_telephony_api_base")]
    pub api_base: String,

    /// Voice name used when the provider renders text to speech
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Ask the provider to record calls
    #[serde(default)]
    pub record_calls: bool,
}

fn default_telephony_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}
fn default_voice() -> String {
    "Polly.Brian".to_string()
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base: default_telephony_api_base(),
            voice: default_voice(),
            record_calls: false,
        }
    }
}

/// Language-model collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (set via DIALAGENT__LLM__API_KEY)
    #[serde(default)]
    pub api_key: String,

    /// Chat completion API base URL
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Chat completion model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Realtime streaming endpoint URL (streaming mode only)
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,

    /// Realtime model name
    #[serde(default = "default_realtime_model")]
    pub realtime_model: String,
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_realtime_url() -> String {
    "wss://api.openai.com/v1/realtime".to_string()
}
fn default_realtime_model() -> String {
    "gpt-4o-realtime-preview".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_llm_api_base(),
            model: default_llm_model(),
            temperature: default_temperature(),
            realtime_url: default_realtime_url(),
            realtime_model: default_realtime_model(),
        }
    }
}

/// Conversation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Drive calls over a duplex audio stream instead of webhook turns
    #[serde(default)]
    pub streaming_enabled: bool,

    /// Hard wall-clock timeout for one generation call
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,

    /// Output token ceiling per reply
    #[serde(default = "default_max_reply_tokens")]
    pub max_reply_tokens: u32,

    /// Prompt history window: most recent exchanges to include
    #[serde(default = "default_history_max_exchanges")]
    pub history_max_exchanges: usize,

    /// Prompt history window: character budget
    #[serde(default = "default_history_char_budget")]
    pub history_char_budget: usize,

    /// Seconds to wait for human speech before a no-input timeout
    #[serde(default = "default_listen_timeout_secs")]
    pub listen_timeout_secs: u64,

    /// Consecutive no-input timeouts before the call is ended
    #[serde(default = "default_max_no_input_timeouts")]
    pub max_no_input_timeouts: u32,

    /// Sessions with no events for this long are evicted
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Registry cleanup sweep interval
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Maximum concurrent call sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Media relay idle timeout (streaming mode)
    #[serde(default = "default_relay_idle_timeout_secs")]
    pub relay_idle_timeout_secs: u64,
}

fn default_generation_timeout_ms() -> u64 {
    5000
}
fn default_max_reply_tokens() -> u32 {
    50
}
fn default_history_max_exchanges() -> usize {
    3
}
fn default_history_char_budget() -> usize {
    1200
}
fn default_listen_timeout_secs() -> u64 {
    5
}
fn default_max_no_input_timeouts() -> u32 {
    3
}
fn default_idle_timeout_secs() -> u64 {
    300
}
fn default_cleanup_interval_secs() -> u64 {
    60
}
fn default_max_sessions() -> usize {
    500
}
fn default_relay_idle_timeout_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            streaming_enabled: false,
            generation_timeout_ms: default_generation_timeout_ms(),
            max_reply_tokens: default_max_reply_tokens(),
            history_max_exchanges: default_history_max_exchanges(),
            history_char_budget: default_history_char_budget(),
            listen_timeout_secs: default_listen_timeout_secs(),
            max_no_input_timeouts: default_max_no_input_timeouts(),
            idle_timeout_secs: default_idle_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_sessions: default_max_sessions(),
            relay_idle_timeout_secs: default_relay_idle_timeout_secs(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (DIALAGENT__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DIALAGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
