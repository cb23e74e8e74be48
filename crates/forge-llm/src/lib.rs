//! The `ModelClient` contract consumed by the agent loop in `forge-core`.
//!
//! This crate defines request/response/stream shapes but no transport: a
//! concrete backend (e.g. `forge-llm-openai`) implements
//! [`LanguageModelBackend`] and is wrapped in a [`LanguageModel`] handle so
//! the core never depends on a specific provider.

pub mod describe;
pub mod error;
pub mod model;
pub mod provider;
pub mod request;
pub mod response;
pub mod stream;

pub use describe::Describe;
pub use error::Error;
pub use model::{LanguageModel, LanguageModelBackend};
pub use provider::{LanguageModelProvider, LanguageModelProviderBackend};
pub use request::{
    AssistantPart, GenerateOptions, GenerateRequest, ImagePart, Message, Property, RequestBuilder,
    Schema, SystemPart, TextPart, ToolCallPart, ToolChoice, ToolDefinition, ToolResultPart,
    UserPart, request,
};
pub use response::{GenerateResult, Response};
pub use stream::{FinishReason, StreamEvent, Usage};
