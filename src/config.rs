use std::env;
use std::str::FromStr;
use tracing::warn;

pub const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_TEXT_MODEL: &str = "qwen/qwen3-32b";
pub const DEFAULT_VISION_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Settings for the estimation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Name of the variable that holds the OpenRouter key. The key is read at call time.
    pub api_key_env_var: String,
    pub text_model: String,
    pub vision_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key_env_var: API_KEY_ENV_VAR.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl EngineConfig {
    /// Loads `.env` then reads overrides from the process environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_key_env_var: lookup("NUTRI_API_KEY_ENV_VAR").unwrap_or(defaults.api_key_env_var),
            text_model: lookup("NUTRI_TEXT_MODEL").unwrap_or(defaults.text_model),
            vision_model: lookup("NUTRI_VISION_MODEL").unwrap_or(defaults.vision_model),
            temperature: parse_or(&lookup, "NUTRI_TEMPERATURE", defaults.temperature),
            max_tokens: parse_or(&lookup, "NUTRI_MAX_TOKENS", defaults.max_tokens),
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparseable setting, using default");
            default
        }),
        None => default,
    }
}
