//! Converts between `forge_llm` generic types and Chat Completions wire format.

use forge_llm::request::{AssistantPart, GenerateRequest, Message, SystemPart, ToolChoice, UserPart};

use crate::types::{
    ChatContent, ChatContentPart, ChatFunctionCall, ChatFunctionDef, ChatMessage, ChatRequest,
    ChatTool, ChatToolCall, ImageUrl, StreamOptions,
};

pub fn to_chat_request(model_id: &str, req: &GenerateRequest) -> ChatRequest {
    let mut messages: Vec<ChatMessage> = Vec::with_capacity(req.messages.len());

    for msg in &req.messages {
        match msg {
            Message::System { parts } => {
                let text: String = parts
                    .iter()
                    .map(|p| match p {
                        SystemPart::Text(t) => t.text.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(ChatMessage {
                    role: "system",
                    content: Some(ChatContent::Text(text)),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Message::User { parts } => {
                let content = if parts.len() == 1 {
                    match &parts[0] {
                        UserPart::Text(t) => ChatContent::Text(t.text.clone()),
                        UserPart::Image(img) => ChatContent::Parts(vec![ChatContentPart::ImageUrl {
                            image_url: ImageUrl { url: img.url.clone() },
                        }]),
                    }
                } else {
                    ChatContent::Parts(
                        parts
                            .iter()
                            .map(|p| match p {
                                UserPart::Text(t) => ChatContentPart::Text { text: t.text.clone() },
                                UserPart::Image(img) => ChatContentPart::ImageUrl {
                                    image_url: ImageUrl { url: img.url.clone() },
                                },
                            })
                            .collect(),
                    )
                };
                messages.push(ChatMessage {
                    role: "user",
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Message::Assistant { parts } => {
                let text: String = parts
                    .iter()
                    .filter_map(|p| match p {
                        AssistantPart::Text(t) => Some(t.text.as_str()),
                        AssistantPart::ToolCall(_) => None,
                    })
                    .collect::<Vec<_>>()
                    .join("");
                let tool_calls: Vec<ChatToolCall> = parts
                    .iter()
                    .filter_map(|p| match p {
                        AssistantPart::ToolCall(tc) => Some(ChatToolCall {
                            id: tc.id.clone(),
                            kind: "function",
                            function: ChatFunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        }),
                        AssistantPart::Text(_) => None,
                    })
                    .collect();
                messages.push(ChatMessage {
                    role: "assistant",
                    content: if text.is_empty() { None } else { Some(ChatContent::Text(text)) },
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                });
            }
            Message::Tool { parts } => {
                for part in parts {
                    messages.push(ChatMessage {
                        role: "tool",
                        content: Some(ChatContent::Text(part.content.clone())),
                        tool_calls: None,
                        tool_call_id: Some(part.tool_call_id.clone()),
                    });
                }
            }
        }
    }

    let tools: Vec<ChatTool> = req
        .tools
        .iter()
        .map(|t| ChatTool::Function {
            function: ChatFunctionDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.to_json_schema(),
            },
        })
        .collect();

    let tool_choice = match &req.options.tool_choice {
        ToolChoice::Auto => None,
        ToolChoice::None => Some(serde_json::json!("none")),
        ToolChoice::Required => Some(serde_json::json!("required")),
        ToolChoice::Tool(name) => Some(serde_json::json!({
            "type": "function",
            "function": { "name": name },
        })),
    };

    ChatRequest {
        model: model_id.to_string(),
        messages,
        stream: true,
        temperature: req.options.temperature,
        top_p: req.options.top_p,
        max_tokens: req.options.max_tokens,
        stop: req.options.stop.clone(),
        tools,
        tool_choice,
        stream_options: Some(StreamOptions { include_usage: true }),
    }
}
