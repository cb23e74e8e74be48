//! Typed, validated configuration loaded once from the environment.
//!
//! `Config` is built once at process startup (see `forge-cli::main`) and
//! passed by value to every component. No component other than the loader
//! below reads environment variables directly.

use std::env;

/// Agent-wide configuration. Every field has a documented default so a
/// `Config` can be constructed even when the environment is sparse; only
/// missing credentials are treated as a fatal init error by the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat-completions endpoint base URL (without `/chat/completions`).
    pub model_endpoint: String,
    /// API key for the model endpoint.
    pub api_key: String,
    /// Model identifier sent in requests.
    pub model_name: String,
    /// Context window size of the configured model, in tokens.
    pub model_max_tokens: u32,
    /// Fraction of `model_max_tokens` that triggers automatic compression.
    pub compress_threshold: f32,
    /// Hard context limit used for the `max_tokens` request budget (§6).
    pub context_limit: u32,
    /// Ceiling on requested output tokens.
    pub max_output_tokens: u32,
    /// Tokens reserved as headroom when computing the request's `max_tokens`.
    pub output_buffer_tokens: u32,
    /// Default sampling temperature.
    pub default_temperature: f32,
    /// Skip all approval prompts (non-interactive runs). Never settable by
    /// the model — only by the human operator at startup.
    pub auto_approve: bool,
    /// Skip approval prompts for `write`/`edit` specifically.
    pub auto_approve_writes: bool,
    /// Assistant replies longer than this are never nudged.
    pub nudge_max_text_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model_name: "gpt-4.1".to_string(),
            model_max_tokens: 128_000,
            compress_threshold: 0.8,
            context_limit: 128_000,
            max_output_tokens: 8_000,
            output_buffer_tokens: 1_024,
            default_temperature: 0.2,
            auto_approve: false,
            auto_approve_writes: false,
            nudge_max_text_len: 4_000,
        }
    }
}

impl Config {
    /// Build a `Config` by overlaying environment variables on the defaults.
    ///
    /// `FORGE_API_KEY` falls back to `OPENAI_API_KEY` so the binary works
    /// unmodified against a plain OpenAI setup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_endpoint: env_string("FORGE_MODEL_ENDPOINT", defaults.model_endpoint),
            api_key: env::var("FORGE_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .unwrap_or(defaults.api_key),
            model_name: env_string("FORGE_MODEL", defaults.model_name),
            model_max_tokens: env_parsed("FORGE_MODEL_MAX_TOKENS", defaults.model_max_tokens),
            compress_threshold: env_parsed("FORGE_COMPRESS_THRESHOLD", defaults.compress_threshold),
            context_limit: env_parsed("FORGE_CONTEXT_LIMIT", defaults.context_limit),
            max_output_tokens: env_parsed("FORGE_MAX_OUTPUT_TOKENS", defaults.max_output_tokens),
            output_buffer_tokens: env_parsed(
                "FORGE_OUTPUT_BUFFER_TOKENS",
                defaults.output_buffer_tokens,
            ),
            default_temperature: env_parsed("FORGE_TEMPERATURE", defaults.default_temperature),
            auto_approve: env_parsed("FORGE_AUTO_APPROVE", defaults.auto_approve),
            auto_approve_writes: env_parsed(
                "FORGE_AUTO_APPROVE_WRITES",
                defaults.auto_approve_writes,
            ),
            nudge_max_text_len: defaults.nudge_max_text_len,
        }
    }

    /// Returns an error describing the first missing required field, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("no API key configured (set FORGE_API_KEY or OPENAI_API_KEY)".to_string());
        }
        if self.model_name.trim().is_empty() {
            return Err("no model configured (set FORGE_MODEL)".to_string());
        }
        Ok(())
    }

    /// Compute the request's `max_tokens` budget per §6/§8:
    /// `max(256, min(configured_max_output, context_limit - estimated_input - buffer))`.
    pub fn request_max_tokens(&self, estimated_input_tokens: u32) -> u32 {
        let remaining = self
            .context_limit
            .saturating_sub(estimated_input_tokens)
            .saturating_sub(self.output_buffer_tokens);
        self.max_output_tokens.min(remaining).max(256)
    }
}

/// Estimate token count from serialized byte length: `ceil(bytes / 4)`.
pub fn estimate_tokens(serialized_bytes: usize) -> u32 {
    ((serialized_bytes + 3) / 4) as u32
}

fn env_string(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_tokens_respects_floor() {
        let config = Config {
            context_limit: 1_000,
            output_buffer_tokens: 900,
            max_output_tokens: 8_000,
            ..Default::default()
        };
        assert_eq!(config.request_max_tokens(50), 256);
    }

    #[test]
    fn max_tokens_respects_cap() {
        let config = Config {
            context_limit: 128_000,
            output_buffer_tokens: 1_024,
            max_output_tokens: 8_000,
            ..Default::default()
        };
        assert_eq!(config.request_max_tokens(0), 8_000);
    }

    #[test]
    fn max_tokens_uses_remaining_window_between_floor_and_cap() {
        let config = Config {
            context_limit: 10_000,
            output_buffer_tokens: 500,
            max_output_tokens: 8_000,
            ..Default::default()
        };
        // remaining = 10_000 - 9_000 - 500 = 500
        assert_eq!(config.request_max_tokens(9_000), 500);
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(4), 1);
        assert_eq!(estimate_tokens(5), 2);
    }
}
