//! §4.3 HistoryStore: owns the conversation, controls its size, provides
//! snapshots, runs automatic compression.

use std::future::Future;
use std::pin::Pin;

use forge_llm::request::{AssistantPart, Message};
use forge_llm::stream::Usage;

use crate::config::{estimate_tokens, Config};

/// Replaces content of aged-out tool results (§4.3 `Append`).
const AGED_TOOL_RESULT_NOTICE: &str = "[Tool result cleared to save context]";
/// Every Nth tool message triggers an aging pass.
const TOOL_AGING_INTERVAL: usize = 10;
/// How many of the most recent tool messages survive an aging pass.
const TOOL_AGING_KEEP: usize = 5;

const COMPRESSION_NOTICE: &str =
    "[Previous conversation history has been compressed to save context window space]";
/// Messages dropped after the lone user message in the single-user-message
/// compression strategy (§4.3).
const SINGLE_USER_DROP_COUNT: usize = 3;

/// Produces an LLM summary of a message span for the pluggable compression
/// strategy (§4.3, §9 Open Question). Manually type-erased (no `async_trait`)
/// so `Option<Arc<dyn Summarizer>>` remains object-safe.
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> Pin<Box<dyn Future<Output = Result<String, forge_llm::Error>> + Send + 'a>>;
}

struct Frame {
    messages: Vec<Message>,
    tool_messages_since_aging: usize,
}

/// Owns the conversation stack. The top frame is the active conversation;
/// `StartTaskFrame`/`FinishTaskFrame` push/pop additional frames for
/// subagent delegation (§4.1 `RunTask`).
pub struct HistoryStore {
    frames: Vec<Frame>,
    usage: Usage,
    model_max_tokens: u32,
    compress_threshold: f32,
}

impl HistoryStore {
    pub fn new(system_prompt: impl Into<String>, config: &Config) -> Self {
        Self {
            frames: vec![Frame {
                messages: vec![Message::system(system_prompt)],
                tool_messages_since_aging: 0,
            }],
            usage: Usage::default(),
            model_max_tokens: config.model_max_tokens,
            compress_threshold: config.compress_threshold,
        }
    }

    fn top(&self) -> &Frame {
        self.frames.last().expect("history stack is never empty")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("history stack is never empty")
    }

    /// O(1) append, with tool-result aging every [`TOOL_AGING_INTERVAL`]
    /// tool messages.
    pub fn append(&mut self, message: Message) {
        let is_tool = matches!(message, Message::Tool { .. });
        let frame = self.top_mut();
        frame.messages.push(message);
        if is_tool {
            frame.tool_messages_since_aging += 1;
            if frame.tool_messages_since_aging >= TOOL_AGING_INTERVAL {
                frame.tool_messages_since_aging = 0;
                age_old_tool_results(&mut frame.messages, TOOL_AGING_KEEP);
            }
        }
    }

    /// Deep copy of the active frame with a cache-mark hint on the last
    /// content block of the last message.
    pub fn snapshot(&self) -> Vec<Message> {
        let mut messages = self.top().messages.clone();
        for m in messages.iter_mut() {
            m.clear_cache_control();
        }
        if let Some(last) = messages.last_mut() {
            last.mark_cache_control();
        }
        messages
    }

    pub fn update_usage(&mut self, usage: Usage) {
        self.usage = usage;
    }

    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// `100 * total_tokens / model_max_tokens`.
    pub fn current_context_percent(&self) -> f32 {
        let total = self.usage.input_tokens + self.usage.output_tokens;
        if self.model_max_tokens == 0 {
            return 0.0;
        }
        100.0 * (total as f32) / (self.model_max_tokens as f32)
    }

    /// Estimate tokens for the current snapshot, for the §6 `max_tokens`
    /// request-budget computation, without requiring a completed turn.
    pub fn estimated_input_tokens(&self) -> u32 {
        let serialized = self.top().messages.len() * 64; // rough per-message floor
        let text_bytes: usize = self
            .top()
            .messages
            .iter()
            .map(message_text_len)
            .sum();
        estimate_tokens(serialized + text_bytes)
    }

    /// Run compression if usage exceeds the configured threshold. Returns
    /// `Some((before, after))` message counts if compression ran.
    pub async fn auto_compress_if_needed(
        &mut self,
        summarizer: Option<&dyn Summarizer>,
    ) -> Option<(usize, usize)> {
        let total = (self.usage.input_tokens + self.usage.output_tokens) as f32;
        let limit = self.model_max_tokens as f32 * self.compress_threshold;
        if self.model_max_tokens == 0 || total <= limit {
            return None;
        }
        let before = self.top().messages.len();
        self.compress(summarizer).await;
        let after = self.top().messages.len();
        Some((before, after))
    }

    async fn compress(&mut self, summarizer: Option<&dyn Summarizer>) {
        let user_indices: Vec<usize> = self
            .top()
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| matches!(m, Message::User { .. }))
            .map(|(i, _)| i)
            .collect();

        if user_indices.len() >= 2 {
            // Drop everything before the second-oldest user message, except
            // system messages, which stay at their positions.
            let cut = user_indices[1];
            let notice = self.summary_notice(summarizer, 0..cut).await;
            self.splice_compressed_prefix(cut, notice);
        } else if let Some(&only_user) = user_indices.first() {
            // Drop up to SINGLE_USER_DROP_COUNT messages after the lone user
            // message, as a contiguous group-respecting cut (never splitting
            // a tool-call/tool-result pairing).
            let end = self.group_safe_cut(only_user + 1, SINGLE_USER_DROP_COUNT);
            if end > only_user + 1 {
                let notice = self.summary_notice(summarizer, only_user + 1..end).await;
                let frame = self.top_mut();
                frame.messages.splice(
                    only_user + 1..end,
                    std::iter::once(Message::user(notice)),
                );
            }
        }
        // A single-frame conversation with no user messages yet (only the
        // system prompt) has nothing to compress.
    }

    async fn summary_notice(&self, summarizer: Option<&dyn Summarizer>, range: std::ops::Range<usize>) -> String {
        if let Some(summarizer) = summarizer {
            let span = &self.top().messages[range];
            if let Ok(summary) = summarizer.summarize(span).await {
                return summary;
            }
        }
        COMPRESSION_NOTICE.to_string()
    }

    fn splice_compressed_prefix(&mut self, cut: usize, notice: String) {
        let frame = self.top_mut();
        let mut kept: Vec<Message> = Vec::new();
        for (i, m) in frame.messages.iter().enumerate() {
            if i >= cut {
                break;
            }
            if matches!(m, Message::System { .. }) {
                kept.push(m.clone());
            }
        }
        kept.push(Message::user(notice));
        kept.extend(frame.messages.split_off(cut));
        frame.messages = kept;
    }

    /// Extend `end` forward past `start` until it does not split an
    /// assistant/tool-call pairing, capped at `start + max_extra`.
    fn group_safe_cut(&self, start: usize, max_extra: usize) -> usize {
        let messages = &self.top().messages;
        let mut end = (start + max_extra).min(messages.len());
        while end < messages.len() && message_continues_pairing(messages, end) {
            end += 1;
        }
        end
    }
}

/// True if message at `index` is a `Tool` message whose preceding assistant
/// tool-call is inside `0..index` but the pairing would be split by cutting
/// exactly at `index`.
fn message_continues_pairing(messages: &[Message], index: usize) -> bool {
    matches!(messages.get(index), Some(Message::Tool { .. }))
}

fn age_old_tool_results(messages: &mut [Message], keep: usize) {
    let tool_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| matches!(m, Message::Tool { .. }))
        .map(|(i, _)| i)
        .collect();
    if tool_indices.len() <= keep {
        return;
    }
    let to_age = &tool_indices[..tool_indices.len() - keep];
    for &i in to_age {
        if let Message::Tool { parts } = &mut messages[i] {
            for part in parts {
                part.content = AGED_TOOL_RESULT_NOTICE.to_string();
            }
        }
    }
}

fn message_text_len(message: &Message) -> usize {
    match message {
        Message::System { parts } => parts
            .iter()
            .map(|forge_llm::request::SystemPart::Text(t)| t.text.len())
            .sum(),
        Message::User { parts } => parts
            .iter()
            .map(|p| match p {
                forge_llm::request::UserPart::Text(t) => t.text.len(),
                forge_llm::request::UserPart::Image(i) => i.url.len(),
            })
            .sum(),
        Message::Assistant { parts } => parts
            .iter()
            .map(|p| match p {
                AssistantPart::Text(t) => t.text.len(),
                AssistantPart::ToolCall(c) => c.arguments.len() + c.name.len(),
            })
            .sum(),
        Message::Tool { parts } => parts.iter().map(|p| p.content.len()).sum(),
    }
}

// ---------------------------------------------------------------------------
// Task frames (§4.1 RunTask / §4.3 StartTaskFrame/FinishTaskFrame)
// ---------------------------------------------------------------------------

impl HistoryStore {
    /// Push a fresh frame seeded with `system_prompt` and an initial user
    /// message `user_input`.
    pub fn start_task_frame(&mut self, system_prompt: impl Into<String>, user_input: impl Into<String>) {
        self.frames.push(Frame {
            messages: vec![Message::system(system_prompt), Message::user(user_input)],
            tool_messages_since_aging: 0,
        });
    }

    /// Pop the top frame and return the content of its topmost message. The
    /// stack must have at least two frames.
    pub fn finish_task_frame(&mut self) -> String {
        assert!(self.frames.len() >= 2, "cannot pop the root conversation frame");
        let frame = self.frames.pop().expect("checked above");
        frame
            .messages
            .last()
            .map(message_text)
            .unwrap_or_default()
    }
}

fn message_text(message: &Message) -> String {
    match message {
        Message::Assistant { parts } => parts
            .iter()
            .filter_map(|p| match p {
                AssistantPart::Text(t) => Some(t.text.as_str()),
                AssistantPart::ToolCall(_) => None,
            })
            .collect(),
        Message::User { parts } => parts
            .iter()
            .filter_map(|p| match p {
                forge_llm::request::UserPart::Text(t) => Some(t.text.as_str()),
                forge_llm::request::UserPart::Image(_) => None,
            })
            .collect(),
        Message::System { parts } => parts
            .iter()
            .map(|forge_llm::request::SystemPart::Text(t)| t.text.as_str())
            .collect(),
        Message::Tool { parts } => parts.iter().map(|p| p.content.as_str()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_llm::request::ToolCallPart;

    fn store() -> HistoryStore {
        HistoryStore::new("you are an assistant", &Config::default())
    }

    #[test]
    fn system_is_always_at_head() {
        let store = store();
        let snapshot = store.snapshot();
        assert!(matches!(snapshot[0], Message::System { .. }));
    }

    #[test]
    fn cache_mark_hints_only_the_last_block_of_the_last_message() {
        let mut store = store();
        store.append(Message::user("hello"));
        store.append(Message::assistant("hi there"));
        let snapshot = store.snapshot();

        for (i, message) in snapshot.iter().enumerate() {
            let marked = match message {
                Message::Assistant { parts } => parts.iter().any(|p| match p {
                    AssistantPart::Text(t) => t.cache_control,
                    AssistantPart::ToolCall(c) => c.cache_control,
                }),
                Message::User { parts } => parts.iter().any(|p| match p {
                    forge_llm::request::UserPart::Text(t) => t.cache_control,
                    forge_llm::request::UserPart::Image(im) => im.cache_control,
                }),
                Message::System { parts } => parts
                    .iter()
                    .any(|forge_llm::request::SystemPart::Text(t)| t.cache_control),
                Message::Tool { parts } => parts.iter().any(|p| p.cache_control),
            };
            if i == snapshot.len() - 1 {
                assert!(marked, "last message should carry the cache mark");
            } else {
                assert!(!marked, "message {i} should not carry the cache mark");
            }
        }
    }

    #[test]
    fn tool_results_age_after_interval_keeping_pairing_intact() {
        let mut store = store();
        for i in 0..12 {
            let id = format!("call-{i}");
            store.append(Message::Assistant {
                parts: vec![AssistantPart::ToolCall(ToolCallPart {
                    id: id.clone(),
                    name: "read".to_string(),
                    arguments: "{}".to_string(),
                    cache_control: false,
                })],
            });
            store.append(Message::tool_result(id, format!("result {i}")));
        }

        let snapshot = store.snapshot();
        let tool_contents: Vec<&str> = snapshot
            .iter()
            .filter_map(|m| match m {
                Message::Tool { parts } => Some(parts[0].content.as_str()),
                _ => None,
            })
            .collect();

        // First aging pass fires at the 10th tool message (indices 0..9),
        // clearing all but the most recent 5 of those 10.
        assert_eq!(tool_contents[0], AGED_TOOL_RESULT_NOTICE);
        assert_eq!(tool_contents[4], AGED_TOOL_RESULT_NOTICE);
        assert_eq!(tool_contents[9], "result 9");
        // Messages after the aging pass are untouched.
        assert_eq!(tool_contents[11], "result 11");
    }

    #[tokio::test]
    async fn compression_with_two_user_messages_keeps_system_and_shrinks() {
        let mut store = store();
        store.append(Message::user("first task"));
        store.append(Message::assistant("working on it"));
        store.append(Message::user("second task"));
        store.append(Message::assistant("done"));

        // force compression regardless of usage numbers
        store.usage.input_tokens = 1_000_000;
        store.model_max_tokens = 1_000_000;
        store.compress_threshold = 0.1;

        let before = store.top().messages.len();
        let result = store.auto_compress_if_needed(None).await;
        assert!(result.is_some());
        let snapshot = store.snapshot();
        assert!(snapshot.len() < before);
        assert!(matches!(snapshot[0], Message::System { .. }));
        // the synthesized compression-notice user message must be present
        assert!(snapshot.iter().any(|m| matches!(m, Message::User { parts } if parts.iter().any(|p| matches!(p, forge_llm::request::UserPart::Text(t) if t.text == COMPRESSION_NOTICE)))));
    }

    #[tokio::test]
    async fn compression_never_splits_a_tool_call_pairing() {
        let mut store = store();
        store.append(Message::user("first task"));
        store.append(Message::Assistant {
            parts: vec![AssistantPart::ToolCall(ToolCallPart {
                id: "c1".into(),
                name: "read".into(),
                arguments: "{}".into(),
                cache_control: false,
            })],
        });
        store.append(Message::tool_result("c1", "file contents"));
        store.append(Message::user("second task"));
        store.append(Message::assistant("done"));

        store.usage.input_tokens = 1_000_000;
        store.model_max_tokens = 1_000_000;
        store.compress_threshold = 0.1;
        store.auto_compress_if_needed(None).await;

        let snapshot = store.snapshot();
        // every tool message must still be immediately preceded by an
        // assistant message carrying a matching tool call id.
        for (i, m) in snapshot.iter().enumerate() {
            if let Message::Tool { parts } = m {
                let ids: Vec<&str> = parts.iter().map(|p| p.tool_call_id.as_str()).collect();
                let Message::Assistant { parts: aparts } = &snapshot[i - 1] else {
                    panic!("tool message not preceded by an assistant message");
                };
                let call_ids: Vec<&str> = aparts
                    .iter()
                    .filter_map(|p| match p {
                        AssistantPart::ToolCall(c) => Some(c.id.as_str()),
                        _ => None,
                    })
                    .collect();
                assert_eq!(ids, call_ids);
            }
        }
    }

    #[test]
    fn task_frame_push_pop_returns_last_message_text() {
        let mut store = store();
        store.start_task_frame("you are a subagent", "do the subtask");
        store.append(Message::assistant("subtask result"));
        let result = store.finish_task_frame();
        assert_eq!(result, "subtask result");
        // back to the root frame
        assert!(matches!(store.snapshot()[0], Message::System { .. }));
    }
}
