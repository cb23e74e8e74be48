//! Opens an SSE connection to a Chat Completions endpoint and maps deltas to
//! the `forge_llm` `StreamEvent` type.

use crate::ProviderState;
use crate::types::{ApiErrorBody, ChatCompletionChunk, ChatRequest};
use eventsource_stream::Eventsource;
use forge_llm::error::Error;
use forge_llm::request::ToolCallPart;
use forge_llm::stream::{FinishReason, StreamEvent, Usage};
use futures::Stream;
use std::sync::Arc;
use tokio_stream::StreamExt;

pub fn open(
    state: Arc<ProviderState>,
    body: ChatRequest,
) -> impl Stream<Item = Result<StreamEvent, Error>> + Send {
    async_stream::try_stream! {
        let url = format!("{}/chat/completions", state.config.base_url);
        let mut req = state
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", state.config.auth_token));
        for (k, v) in &state.config.extra_headers {
            req = req.header(k, v);
        }

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(Box::new(e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body_text)
                .map(|b| b.error.message)
                .unwrap_or(body_text);
            Err(Error::Api {
                code: status.as_str().to_string(),
                message,
                metadata: Default::default(),
            })?;
            unreachable!();
        }

        let mut sse = resp.bytes_stream().eventsource();
        let mut mapper = EventMapper::new();

        while let Some(event) = sse.next().await {
            match event {
                Ok(event) => {
                    if event.data == "[DONE]" {
                        break;
                    }
                    for stream_event in mapper.map_chunk(&event.data)? {
                        yield stream_event;
                    }
                }
                Err(e) => {
                    Err(Error::Sse(e.to_string()))?;
                }
            }
        }

        for event in mapper.finish() {
            yield event;
        }
    }
}

/// Stateful mapper: Chat Completions streams tool-call arguments as deltas
/// keyed by a per-choice `index`, so we accumulate names/ids/arguments across
/// chunks and only emit `ToolCallEnd` once the stream finishes.
struct EventMapper {
    seen_index: std::collections::HashSet<usize>,
    pending: std::collections::HashMap<usize, PendingCall>,
    has_tool_calls: bool,
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl EventMapper {
    fn new() -> Self {
        Self {
            seen_index: std::collections::HashSet::new(),
            pending: std::collections::HashMap::new(),
            has_tool_calls: false,
            usage: None,
            finish_reason: None,
        }
    }

    fn map_chunk(&mut self, data: &str) -> Result<Vec<StreamEvent>, Error> {
        let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
        let mut events = Vec::new();

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                reasoning_tokens: usage
                    .completion_tokens_details
                    .and_then(|d| d.reasoning_tokens),
                cached_tokens: usage.prompt_tokens_details.and_then(|d| d.cached_tokens),
            });
        }

        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }

            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta(text));
                }
            }

            for tc in choice.delta.tool_calls {
                self.has_tool_calls = true;
                let first_seen = self.seen_index.insert(tc.index);
                let entry = self.pending.entry(tc.index).or_insert_with(|| PendingCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                });
                if let Some(id) = &tc.id {
                    entry.id = id.clone();
                }
                if let Some(function) = &tc.function {
                    if let Some(name) = &function.name {
                        entry.name.push_str(name);
                    }
                    if let Some(args) = &function.arguments {
                        entry.arguments.push_str(args);
                    }
                }

                if first_seen {
                    events.push(StreamEvent::ToolCallBegin {
                        index: tc.index,
                        id: entry.id.clone(),
                        name: entry.name.clone(),
                    });
                } else if let Some(function) = &tc.function {
                    if let Some(args) = &function.arguments {
                        events.push(StreamEvent::ToolCallDelta {
                            index: tc.index,
                            arguments_delta: args.clone(),
                        });
                    }
                }
            }
        }

        Ok(events)
    }

    /// Chat Completions never sends an explicit "tool call complete" event;
    /// a call is done once the stream itself finishes. Call this after the
    /// SSE loop ends to flush accumulated tool calls and the `Finish` event.
    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events: Vec<StreamEvent> = Vec::new();
        let mut indices: Vec<usize> = self.pending.keys().copied().collect();
        indices.sort_unstable();
        for index in indices {
            if let Some(call) = self.pending.remove(&index) {
                events.push(StreamEvent::ToolCallEnd {
                    index,
                    call: ToolCallPart {
                        id: call.id,
                        name: call.name,
                        arguments: call.arguments,
                        cache_control: false,
                    },
                });
            }
        }

        let reason = match self.finish_reason.as_deref() {
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("stop") | None => {
                if self.has_tool_calls {
                    FinishReason::ToolCalls
                } else {
                    FinishReason::Stop
                }
            }
            Some(other) => FinishReason::Other(other.to_string()),
        };
        events.push(StreamEvent::Finish {
            reason,
            usage: self.usage.take(),
        });
        events
    }
}
