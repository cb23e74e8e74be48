//! §4.1 AgentLoop: the turn-cycle state machine that composes every other
//! module in this crate.

use std::sync::Arc;

use forge_llm::request::{request, Message, ToolChoice};
use forge_llm::stream::StreamEvent;
use forge_llm::{Error as LlmError, LanguageModel};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatcher::{self, DispatchOutcome};
use crate::event::AgentEvent;
use crate::history::{HistoryStore, Summarizer};
use crate::interrupt::{Interrupt, InterruptBus, InterruptSender};
use crate::registry::Registry;
use crate::ui::Ui;

/// Assistant replies matching one of these (case-insensitively) are treated
/// as completion acknowledgements and never nudged, even if they also
/// contain an action phrase.
const COMPLETION_PHRASES: &[&str] = &[
    "successfully created",
    "task completed",
    "perfect!",
    "great!",
    "✅",
    "✓",
    "created successfully",
    "finished",
    "done",
];

/// `(action phrase, topic word)` pairs. Both must appear in the reply for
/// the nudge rule to fire.
const NUDGE_PAIRS: &[(&str, &[&str])] = &[
    ("let me", &["file", "open", "directory", "ls", "list", "todo.md"]),
    ("i'll", &["file", "open", "directory", "ls", "list", "todo.md"]),
    ("i will", &["file", "open", "directory", "ls", "list", "todo.md"]),
];

const NUDGE_INSTRUCTION: &str =
    "Use the appropriate tool to perform the action you just described, right now.";

/// The composed agent: owns history, dispatches tools, drives the model.
///
/// The model, tool registry, and approval memory are `Arc`-shared rather
/// than owned outright so that a subagent call can spin up a sibling
/// `Agent` with its own fresh `HistoryStore` without reentering this one's
/// `&mut self` borrow (§9 cyclic-reference note) — see
/// [`Agent::shared_resources`].
pub struct Agent {
    config: Config,
    model: Arc<LanguageModel>,
    registry: Arc<Registry>,
    approval: Arc<crate::approval::ApprovalPolicy>,
    ui: Arc<dyn Ui>,
    summarizer: Option<Arc<dyn Summarizer>>,
    history: HistoryStore,
    interrupts: InterruptBus,
}

/// Handed to the caller so it can feed interrupts in from its own
/// background input reader (see [`crate::interrupt`]).
pub struct AgentHandles {
    pub interrupt_sender: InterruptSender,
}

/// The shared backing resources of an [`Agent`], cloneable so a subagent
/// runner can build a sibling agent on demand. See
/// [`Agent::shared_resources`].
#[derive(Clone)]
pub struct SharedAgentResources {
    config: Config,
    model: Arc<LanguageModel>,
    registry: Arc<Registry>,
    approval: Arc<crate::approval::ApprovalPolicy>,
    ui: Arc<dyn Ui>,
}

impl SharedAgentResources {
    /// Build a fresh sibling agent from these shared resources, seeded with
    /// its own conversation rooted at `system_prompt`.
    pub fn into_agent(self, system_prompt: impl Into<String>) -> (Agent, AgentHandles) {
        let (interrupt_sender, interrupt_bus) = crate::interrupt::channel();
        let history = HistoryStore::new(system_prompt, &self.config);
        let agent = Agent {
            config: self.config,
            model: self.model,
            registry: self.registry,
            approval: self.approval,
            ui: self.ui,
            summarizer: None,
            history,
            interrupts: interrupt_bus,
        };
        (agent, AgentHandles { interrupt_sender })
    }
}

impl Agent {
    pub fn new(
        config: Config,
        model: LanguageModel,
        registry: Registry,
        ui: Arc<dyn Ui>,
        system_prompt: impl Into<String>,
    ) -> (Self, AgentHandles) {
        let (interrupt_sender, interrupt_bus) = crate::interrupt::channel();
        let approval = Arc::new(crate::approval::ApprovalPolicy::new(&config));
        let history = HistoryStore::new(system_prompt, &config);
        let agent = Self {
            config,
            model: Arc::new(model),
            registry: Arc::new(registry),
            approval,
            ui,
            summarizer: None,
            history,
            interrupts: interrupt_bus,
        };
        (agent, AgentHandles { interrupt_sender })
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Snapshot the resources a subagent runner needs to build a sibling
    /// agent: the same model, tool registry, and approval memory, but none
    /// of this agent's in-progress conversation.
    pub fn shared_resources(&self) -> SharedAgentResources {
        SharedAgentResources {
            config: self.config.clone(),
            model: self.model.clone(),
            registry: self.registry.clone(),
            approval: self.approval.clone(),
            ui: self.ui.clone(),
        }
    }

    /// §4.1 `RunInteractive`: seed system prompt (already done in `new`),
    /// then loop reading user input and running turns until EOF/quit.
    pub async fn run_interactive(&mut self) {
        info!("starting interactive session");
        loop {
            let Some(input) = self.ui.read_user_input().await else {
                break;
            };
            self.history.append(Message::user(input.clone()));
            self.ui.render_event(&AgentEvent::UserMessage { content: input });
            self.run_until_turn_end().await;
        }
        info!("interactive session ended");
    }

    /// §4.1 `RunTask`: swap in a fresh conversation frame, run until the
    /// model ends a turn without tool calls, pop the frame, and return the
    /// last assistant text. Used by the subagent tool.
    pub async fn run_task(&mut self, system_prompt: impl Into<String>, user_input: impl Into<String>) -> String {
        info!("running subagent task");
        self.history.start_task_frame(system_prompt, user_input);
        self.run_until_turn_end().await;
        self.history.finish_task_frame()
    }

    /// Drive turn cycles (§4.1 steps 1-6) until the user turn genuinely ends
    /// (no more tool calls, no nudge, no pending instruction).
    async fn run_until_turn_end(&mut self) {
        loop {
            match self.one_turn().await {
                TurnOutcome::ToolCallsDispatched
                | TurnOutcome::Nudged
                | TurnOutcome::PendingInstructionApplied => continue,
                TurnOutcome::Cancelled | TurnOutcome::Done => break,
            }
        }
    }

    /// One iteration of the §4.1 turn cycle.
    #[tracing::instrument(skip(self))]
    async fn one_turn(&mut self) -> TurnOutcome {
        // Step 1: compress if needed, then snapshot with the cache mark.
        if let Some((before, after)) = self.history.auto_compress_if_needed(self.summarizer.as_deref()).await {
            info!(before, after, "compressed conversation history");
            self.ui.render_event(&AgentEvent::HistoryCompressed {
                messages_before: before,
                messages_after: after,
            });
        }
        let snapshot = self.history.snapshot();

        // Step 2: emit "thinking" signal. The interrupt bus is armed for the
        // agent's whole lifetime; there is no separate start/stop here.
        self.ui.start_spinner("thinking");

        let estimated_input = self.history.estimated_input_tokens();
        let max_tokens = self.config.request_max_tokens(estimated_input);

        let mut req = request();
        req.messages(snapshot)
            .tools(self.registry.tool_catalog())
            .temperature(self.config.default_temperature)
            .max_tokens(max_tokens)
            .tool_choice(ToolChoice::Auto);

        // Step 3: stream, polling the interrupt bus between chunks.
        let stream_result = self.stream_once(req.build()).await;

        let (text, tool_calls, usage, interrupted, stream_pending) = match stream_result {
            Ok(result) => result,
            Err(stream_err) => {
                warn!(error = %stream_err, "streaming request failed, retrying non-streaming");
                match self.complete_once_non_streaming().await {
                    Ok(result) => result,
                    Err(e) => {
                        self.ui.stop_spinner();
                        self.ui.show_error(&format!("model request failed: {e}"));
                        self.history
                            .append(Message::assistant(format!("[error: model request failed: {e}]")));
                        self.ui.render_event(&AgentEvent::Error { error: e.to_string() });
                        warn!(error = %e, "model request failed after non-streaming retry");
                        return TurnOutcome::Done;
                    }
                }
            }
        };
        self.ui.stop_spinner();

        if interrupted {
            debug!("turn cancelled by interrupt bus");
            self.ui.render_event(&AgentEvent::Interrupted);
            // Partial text is discarded per §4.1 step 4/S3.
            return TurnOutcome::Cancelled;
        }

        if let Some(usage) = usage {
            self.history.update_usage(usage);
        }

        // Step 4: finalize the assistant message.
        if !tool_calls.is_empty() {
            self.history.append(assistant_message(text, tool_calls.clone()));
        } else {
            self.history.append(Message::assistant(text.clone()));
        }

        // Step 5: dispatch tool calls, if any. Any instruction line typed
        // during streaming is carried forward and merged with whatever the
        // dispatcher itself queues, preserving arrival order.
        if !tool_calls.is_empty() {
            debug!(count = tool_calls.len(), "dispatching tool calls");
            let mut pending = None;
            let DispatchOutcome { results, cancelled } = dispatcher::dispatch(
                &tool_calls,
                &mut pending,
                &self.registry,
                &self.approval,
                &self.ui,
                &mut self.interrupts,
            )
            .await;
            for result in results {
                self.history.append(result);
            }
            let mut merged = stream_pending;
            if let Some(instruction) = pending {
                dispatcher::queue_instruction(&mut merged, instruction);
            }
            if let Some(instruction) = merged {
                self.history.append(Message::user(instruction));
            }
            if cancelled {
                return TurnOutcome::Cancelled;
            }
            return TurnOutcome::ToolCallsDispatched;
        }

        // Step 6: no tool calls. Apply the nudge rule, then the
        // pending-instruction rule.
        if let Some(nudge) = nudge_for(&text, self.config.nudge_max_text_len) {
            debug!("nudging model to act on its own narration");
            self.ui.render_event(&AgentEvent::Nudged { instruction: nudge.clone() });
            self.history.append(Message::user(nudge));
            return TurnOutcome::Nudged;
        }

        let mut pending = stream_pending;
        for interrupt in self.interrupts.flush() {
            if let Interrupt::Line(line) = interrupt {
                dispatcher::queue_instruction(&mut pending, line);
            }
        }
        if let Some(instruction) = pending {
            self.ui
                .render_event(&AgentEvent::PendingInstructionQueued { text: instruction.clone() });
            self.history.append(Message::user(instruction));
            return TurnOutcome::PendingInstructionApplied;
        }

        self.ui.render_event(&AgentEvent::TurnComplete {
            usage: self.history.usage().clone(),
        });
        TurnOutcome::Done
    }

    /// Stream one request, forwarding text deltas and polling the interrupt
    /// bus between chunks. Returns `(text, tool_calls, usage, interrupted,
    /// pending_instruction)`: a `Cancel` aborts the stream immediately, while
    /// any `Line` seen in the meantime is queued rather than dropped, per
    /// §4.1 step 3.
    #[allow(clippy::type_complexity)]
    async fn stream_once(
        &mut self,
        request: forge_llm::request::GenerateRequest,
    ) -> Result<
        (
            String,
            Vec<forge_llm::request::ToolCallPart>,
            Option<forge_llm::stream::Usage>,
            bool,
            Option<String>,
        ),
        LlmError,
    > {
        let mut stream = self.model.generate(request).events();
        let mut text = String::new();
        let mut calls: Vec<forge_llm::request::ToolCallPart> = Vec::new();
        let mut usage = None;
        let mut interrupted = false;
        let mut pending_instruction: Option<String> = None;

        while let Some(event) = stream.next().await {
            for interrupt in self.interrupts.flush() {
                match interrupt {
                    Interrupt::Cancel => interrupted = true,
                    Interrupt::Line(line) => dispatcher::queue_instruction(&mut pending_instruction, line),
                }
            }
            if interrupted {
                break;
            }

            match event? {
                StreamEvent::TextDelta(delta) => {
                    self.ui.render_event(&AgentEvent::TextDelta { delta: delta.clone() });
                    text.push_str(&delta);
                }
                StreamEvent::ToolCallEnd { call, .. } => {
                    calls.push(call);
                }
                StreamEvent::Finish { usage: u, .. } => {
                    usage = u;
                }
                StreamEvent::Error(message) => {
                    return Err(LlmError::Other(message));
                }
                StreamEvent::ToolCallBegin { .. } | StreamEvent::ToolCallDelta { .. } => {}
            }
        }

        Ok((text, calls, usage, interrupted, pending_instruction))
    }

    /// §4.1 non-streaming fallback, invoked once after a transport failure.
    #[allow(clippy::type_complexity)]
    async fn complete_once_non_streaming(
        &mut self,
    ) -> Result<
        (
            String,
            Vec<forge_llm::request::ToolCallPart>,
            Option<forge_llm::stream::Usage>,
            bool,
            Option<String>,
        ),
        LlmError,
    > {
        self.ui.show_info("retrying without streaming");
        let snapshot = self.history.snapshot();
        let estimated_input = self.history.estimated_input_tokens();
        let max_tokens = self.config.request_max_tokens(estimated_input);

        let mut req = request();
        req.messages(snapshot)
            .tools(self.registry.tool_catalog())
            .temperature(self.config.default_temperature)
            .max_tokens(max_tokens)
            .tool_choice(ToolChoice::Auto);

        let result = self.model.generate(req.build()).into_result().await?;
        Ok((result.text, result.tool_calls, Some(result.usage), false, None))
    }
}

enum TurnOutcome {
    ToolCallsDispatched,
    Nudged,
    PendingInstructionApplied,
    Cancelled,
    Done,
}

fn assistant_message(text: String, calls: Vec<forge_llm::request::ToolCallPart>) -> Message {
    use forge_llm::request::AssistantPart;
    let mut parts = Vec::with_capacity(1 + calls.len());
    if !text.is_empty() {
        parts.push(AssistantPart::Text(forge_llm::request::TextPart {
            text,
            cache_control: false,
        }));
    }
    for call in calls {
        parts.push(AssistantPart::ToolCall(call));
    }
    Message::Assistant { parts }
}

/// §4.1 nudge rule: a no-tool-call reply that announces an action without
/// performing it gets coerced into a synthetic follow-up instruction.
/// Completion phrases suppress nudging; replies longer than `max_len` are
/// never nudged (avoids misfiring on a long, already-substantive answer).
fn nudge_for(text: &str, max_len: usize) -> Option<String> {
    if text.len() > max_len {
        return None;
    }
    let lower = text.to_lowercase();
    if COMPLETION_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return None;
    }
    let matched = NUDGE_PAIRS
        .iter()
        .any(|(action, topics)| lower.contains(action) && topics.iter().any(|t| lower.contains(t)));
    if matched {
        Some(NUDGE_INSTRUCTION.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nudge_fires_on_narrated_but_unexecuted_action() {
        let nudge = nudge_for("Let me open main.py now.", 4000);
        assert_eq!(nudge, Some(NUDGE_INSTRUCTION.to_string()));
    }

    #[test]
    fn nudge_suppressed_by_completion_phrase() {
        assert_eq!(nudge_for("I'll open the file — done, created successfully.", 4000), None);
    }

    #[test]
    fn nudge_never_fires_on_its_own_synthesized_instruction() {
        assert_eq!(nudge_for(NUDGE_INSTRUCTION, 4000), None);
    }

    #[test]
    fn nudge_suppressed_for_long_replies() {
        let long = "let me open the file ".repeat(500);
        assert_eq!(nudge_for(&long, 4000), None);
    }

    #[test]
    fn nudge_does_not_fire_without_a_topic_word() {
        assert_eq!(nudge_for("Let me think about this for a moment.", 4000), None);
    }
}
