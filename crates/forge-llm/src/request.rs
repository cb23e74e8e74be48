use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Top-level request
// ---------------------------------------------------------------------------

/// A request to generate a language model response.
#[derive(Default, Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub options: GenerateOptions,
    /// Provider-specific metadata. Passed through to the backend as-is.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Knobs that control generation behavior.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub tool_choice: ToolChoice,
}

// ---------------------------------------------------------------------------
// Reusable part types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    /// Transport-level hint that the provider may cache this prefix. Set by
    /// `HistoryStore::snapshot` on the last block of the last message only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cache_control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePart {
    pub url: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cache_control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub id: String,
    pub name: String,
    pub arguments: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cache_control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cache_control: bool,
}

// ---------------------------------------------------------------------------
// Role-specific part enums (composed from reusable parts)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum SystemPart {
    Text(TextPart),
}

#[derive(Debug, Clone)]
pub enum UserPart {
    Text(TextPart),
    Image(ImagePart),
}

#[derive(Debug, Clone)]
pub enum AssistantPart {
    Text(TextPart),
    ToolCall(ToolCallPart),
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One entry in a [`Conversation`](crate). The first message of a non-empty
/// conversation is always `System`; an `Assistant` message that carries
/// `ToolCall` parts is always followed, before the next `User` message, by
/// one `Tool` message per call, in the same order.
#[derive(Debug, Clone)]
pub enum Message {
    System { parts: Vec<SystemPart> },
    User { parts: Vec<UserPart> },
    Assistant { parts: Vec<AssistantPart> },
    Tool { parts: Vec<ToolResultPart> },
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    /// The tool calls carried by an assistant message, if any.
    pub fn tool_calls(&self) -> Vec<&ToolCallPart> {
        match self {
            Message::Assistant { parts } => parts
                .iter()
                .filter_map(|p| match p {
                    AssistantPart::ToolCall(call) => Some(call),
                    AssistantPart::Text(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The tool-call ids this message answers, if it is a tool-result message.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        match self {
            Message::Tool { parts } => parts.iter().map(|p| p.tool_call_id.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Clear any `cache_control` flag set on this message's parts.
    pub fn clear_cache_control(&mut self) {
        match self {
            Message::System { parts } => {
                for p in parts {
                    let SystemPart::Text(t) = p;
                    t.cache_control = false;
                }
            }
            Message::User { parts } => {
                for p in parts {
                    match p {
                        UserPart::Text(t) => t.cache_control = false,
                        UserPart::Image(i) => i.cache_control = false,
                    }
                }
            }
            Message::Assistant { parts } => {
                for p in parts {
                    match p {
                        AssistantPart::Text(t) => t.cache_control = false,
                        AssistantPart::ToolCall(c) => c.cache_control = false,
                    }
                }
            }
            Message::Tool { parts } => {
                for p in parts {
                    p.cache_control = false;
                }
            }
        }
    }

    /// Mark the last content block of this message with `cache_control`.
    /// No-op on a message with no parts.
    pub fn mark_cache_control(&mut self) {
        match self {
            Message::System { parts } => {
                if let Some(SystemPart::Text(t)) = parts.last_mut() {
                    t.cache_control = true;
                }
            }
            Message::User { parts } => {
                if let Some(p) = parts.last_mut() {
                    match p {
                        UserPart::Text(t) => t.cache_control = true,
                        UserPart::Image(i) => i.cache_control = true,
                    }
                }
            }
            Message::Assistant { parts } => {
                if let Some(p) = parts.last_mut() {
                    match p {
                        AssistantPart::Text(t) => t.cache_control = true,
                        AssistantPart::ToolCall(c) => c.cache_control = true,
                    }
                }
            }
            Message::Tool { parts } => {
                if let Some(p) = parts.last_mut() {
                    p.cache_control = true;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System {
            parts: vec![SystemPart::Text(TextPart { text: text.into(), cache_control: false })],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            parts: vec![UserPart::Text(TextPart { text: text.into(), cache_control: false })],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message::Assistant {
            parts: vec![AssistantPart::Text(TextPart { text: text.into(), cache_control: false })],
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            parts: vec![ToolResultPart {
                tool_call_id: tool_call_id.into(),
                content: content.into(),
                cache_control: false,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// A tool definition advertised to the model in a [`GenerateRequest`].
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Schema,
}

/// Controls how the model selects tools.
#[derive(Debug, Clone, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    /// Force calling a specific tool by name.
    Tool(String),
}

// ---------------------------------------------------------------------------
// Schema descriptor — Rust-native, converts to JSON Schema downstream
// ---------------------------------------------------------------------------

/// A Rust-native description of a value's shape, convertible to JSON Schema.
#[derive(Debug, Clone)]
pub enum Schema {
    String {
        description: Option<String>,
        enumeration: Option<Vec<String>>,
    },
    Number {
        description: Option<String>,
    },
    Integer {
        description: Option<String>,
    },
    Boolean {
        description: Option<String>,
    },
    Array {
        description: Option<String>,
        items: Box<Schema>,
    },
    Object {
        description: Option<String>,
        properties: Vec<Property>,
        required: Vec<String>,
    },
    /// Escape hatch: a literal JSON Schema value for cases we don't cover.
    Raw(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub schema: Schema,
}

impl Schema {
    /// Convert to a JSON Schema `serde_json::Value`.
    ///
    /// Object property keys are emitted in the order given (callers are
    /// expected to hand in an already-sorted `properties` vec — the
    /// deterministic tool catalog ordering required by the registry lives at
    /// that layer, not here).
    pub fn to_json_schema(&self) -> serde_json::Value {
        match self {
            Schema::String {
                description,
                enumeration,
            } => {
                let mut obj = serde_json::json!({ "type": "string" });
                if let Some(d) = description {
                    obj["description"] = serde_json::json!(d);
                }
                if let Some(e) = enumeration {
                    obj["enum"] = serde_json::json!(e);
                }
                obj
            }
            Schema::Number { description } => {
                let mut obj = serde_json::json!({ "type": "number" });
                if let Some(d) = description {
                    obj["description"] = serde_json::json!(d);
                }
                obj
            }
            Schema::Integer { description } => {
                let mut obj = serde_json::json!({ "type": "integer" });
                if let Some(d) = description {
                    obj["description"] = serde_json::json!(d);
                }
                obj
            }
            Schema::Boolean { description } => {
                let mut obj = serde_json::json!({ "type": "boolean" });
                if let Some(d) = description {
                    obj["description"] = serde_json::json!(d);
                }
                obj
            }
            Schema::Array { description, items } => {
                let mut obj = serde_json::json!({
                    "type": "array",
                    "items": items.to_json_schema(),
                });
                if let Some(d) = description {
                    obj["description"] = serde_json::json!(d);
                }
                obj
            }
            Schema::Object {
                description,
                properties,
                required,
            } => {
                let props: serde_json::Map<String, serde_json::Value> = properties
                    .iter()
                    .map(|p| (p.name.clone(), p.schema.to_json_schema()))
                    .collect();
                let mut obj = serde_json::json!({
                    "type": "object",
                    "properties": props,
                });
                if !required.is_empty() {
                    obj["required"] = serde_json::json!(required);
                }
                if let Some(d) = description {
                    obj["description"] = serde_json::json!(d);
                }
                obj
            }
            Schema::Raw(v) => v.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request builder
// ---------------------------------------------------------------------------

/// Start building a [`GenerateRequest`].
pub fn request() -> RequestBuilder {
    RequestBuilder::default()
}

/// Fluent builder for [`GenerateRequest`].
#[derive(Default)]
pub struct RequestBuilder {
    system: Option<String>,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    options: GenerateOptions,
    metadata: HashMap<String, serde_json::Value>,
}

impl RequestBuilder {
    pub fn system(&mut self, text: impl Into<String>) -> &mut Self {
        self.system = Some(text.into());
        self
    }

    pub fn messages(&mut self, messages: Vec<Message>) -> &mut Self {
        self.messages = messages;
        self
    }

    /// Tool definitions are sorted by name so the serialized catalog is
    /// byte-identical across calls (required for prompt-prefix caching).
    pub fn tools(&mut self, mut tools: Vec<ToolDefinition>) -> &mut Self {
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        self.tools = tools;
        self
    }

    pub fn temperature(&mut self, temperature: f32) -> &mut Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(&mut self, max_tokens: u32) -> &mut Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn tool_choice(&mut self, choice: ToolChoice) -> &mut Self {
        self.options.tool_choice = choice;
        self
    }

    /// Attach provider-specific metadata (passed through to the backend
    /// as-is, e.g. `reasoning_effort` for a specific model family).
    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(&mut self) -> GenerateRequest {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = self.system.take() {
            messages.push(Message::system(system));
        }
        messages.extend(std::mem::take(&mut self.messages));

        GenerateRequest {
            messages,
            tools: std::mem::take(&mut self.tools),
            options: std::mem::take(&mut self.options),
            metadata: std::mem::take(&mut self.metadata),
        }
    }
}

impl From<&mut RequestBuilder> for GenerateRequest {
    fn from(builder: &mut RequestBuilder) -> Self {
        builder.build()
    }
}
