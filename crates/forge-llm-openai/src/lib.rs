//! Chat Completions streaming backend for `forge-llm`.
//!
//! Targets any provider that speaks the OpenAI Chat Completions wire format
//! (`POST {base_url}/chat/completions`, SSE streaming) — this covers OpenAI
//! itself and the many self-hosted and third-party servers (vLLM, Ollama,
//! OpenRouter, ...) that speak the same dialect.

mod convert;
mod stream;
mod types;

use forge_llm::request::GenerateRequest;
use forge_llm::response::Response;
use forge_llm::{LanguageModel, LanguageModelBackend, LanguageModelProvider, LanguageModelProviderBackend};
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for the Chat Completions provider.
pub struct OpenAIConfig {
    pub auth_token: String,
    pub base_url: String,
    /// Additional headers to include in every request.
    pub extra_headers: HashMap<String, String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            extra_headers: HashMap::new(),
        }
    }
}

/// Create a provider with the given config.
pub fn provider(config: OpenAIConfig) -> LanguageModelProvider {
    LanguageModelProvider::new(OpenAIProvider {
        state: Arc::new(ProviderState {
            client: reqwest::Client::new(),
            config,
        }),
    })
}

/// Create a provider reading `OPENAI_API_KEY` (and, if set, `OPENAI_BASE_URL`)
/// from the environment.
pub fn from_env() -> LanguageModelProvider {
    let mut config = OpenAIConfig {
        auth_token: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
        ..Default::default()
    };
    if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
        config.base_url = base_url;
    }
    provider(config)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct ProviderState {
    client: reqwest::Client,
    config: OpenAIConfig,
}

struct OpenAIProvider {
    state: Arc<ProviderState>,
}

impl LanguageModelProviderBackend for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self, model_id: &str) -> LanguageModel {
        LanguageModel::new(OpenAIModel {
            model_id: model_id.to_string(),
            state: Arc::clone(&self.state),
        })
    }
}

struct OpenAIModel {
    model_id: String,
    state: Arc<ProviderState>,
}

impl LanguageModelBackend for OpenAIModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn generate(&self, request: GenerateRequest) -> Response {
        let body = convert::to_chat_request(&self.model_id, &request);
        let state = Arc::clone(&self.state);
        Response::new(stream::open(state, body))
    }
}
