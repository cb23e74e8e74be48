//! §4.2 ToolDispatcher: turns one assistant message's batch of tool calls
//! into the matching ordered batch of tool-result messages.

use std::sync::Arc;

use forge_llm::request::{Message, ToolCallPart};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::approval::{ApprovalAnswer, ApprovalPolicy};
use crate::event::{AgentEvent, ToolCallDisplay, ToolResultDisplay};
use crate::interrupt::{Interrupt, InterruptBus};
use crate::registry::Registry;
use crate::ui::{ApprovalRequest, Ui};

/// Appended to the last tool-result message of a batch to discourage the
/// model from stopping after tool execution (§4.2 step 7).
const REMINDER: &str = "Continue with your response and complete the task.";

const SKIPPED_NOTICE: &str = "Tool execution skipped: user denied approval.";
const CANCELLED_NOTICE: &str = "Tool execution skipped: cancelled by user.";

/// Outcome of one dispatch pass: the ordered tool-result messages plus
/// whatever pending instruction remains queued afterward (to be folded into
/// the next turn per §4.1's pending-instruction rule).
pub struct DispatchOutcome {
    pub results: Vec<Message>,
    pub cancelled: bool,
}

enum Resolved {
    /// The call will run, carrying the (possibly user_instructions-amended)
    /// argument string.
    Approved { call: ToolCallPart, arguments: String },
    /// The call will not run; emit this text immediately.
    Skipped { id: String, text: String },
}

/// Dispatch one assistant message's tool calls against `registry`, consulting
/// `approval` and `ui`, honoring `interrupts` between suspension points.
#[tracing::instrument(skip(calls, pending_instruction, registry, approval, ui, interrupts), fields(count = calls.len()))]
pub async fn dispatch(
    calls: &[ToolCallPart],
    pending_instruction: &mut Option<String>,
    registry: &Registry,
    approval: &ApprovalPolicy,
    ui: &Arc<dyn Ui>,
    interrupts: &mut InterruptBus,
) -> DispatchOutcome {
    let instructions = pending_instruction.take();

    // Step 1 + 3: parse, then run the approval pass sequentially so prompts
    // never overlap.
    let mut resolved: Vec<Resolved> = Vec::with_capacity(calls.len());
    let mut cancelled = false;

    for call in calls {
        if cancelled {
            resolved.push(Resolved::Skipped {
                id: call.id.clone(),
                text: CANCELLED_NOTICE.to_string(),
            });
            continue;
        }

        for interrupt in interrupts.flush() {
            match interrupt {
                Interrupt::Cancel => cancelled = true,
                Interrupt::Line(line) => queue_instruction(pending_instruction, line),
            }
        }
        if cancelled {
            resolved.push(Resolved::Skipped {
                id: call.id.clone(),
                text: CANCELLED_NOTICE.to_string(),
            });
            continue;
        }

        let Some(tool) = registry.get(&call.name) else {
            warn!(tool = %call.name, "model requested an unknown tool");
            resolved.push(Resolved::Skipped {
                id: call.id.clone(),
                text: format!("{{\"error\": \"unknown tool '{}'\"}}", call.name),
            });
            continue;
        };

        let arguments = with_user_instructions(&call.arguments, instructions.as_deref());

        let needs_approval = approval.requires_approval(
            &call.name,
            tool.approval_class(),
            shell_command(&call.name, &arguments).as_deref(),
            tool.needs_approval_for_args(&arguments),
            tool.always_requires_approval(),
        );

        if needs_approval {
            let display = tool.render_call(&arguments).unwrap_or_else(|| ToolCallDisplay {
                title: call.name.clone(),
                body: Some(crate::event::DisplayBody::Text(arguments.clone())),
            });
            let answer = ui
                .confirm_action(ApprovalRequest {
                    tool_name: &call.name,
                    display: &display,
                    offer_always: !tool.always_requires_approval(),
                })
                .await;

            match answer {
                ApprovalAnswer::No => {
                    debug!(tool = %call.name, "tool call denied by user");
                    ui.render_event(&AgentEvent::ToolCallSkipped {
                        id: call.id.clone(),
                        reason: "denied".to_string(),
                    });
                    resolved.push(Resolved::Skipped {
                        id: call.id.clone(),
                        text: skipped_text(instructions.as_deref()),
                    });
                    continue;
                }
                ApprovalAnswer::Always => {
                    debug!(tool = %call.name, "user approved tool, remembering for this session");
                    approval.remember_always(&call.name, shell_command(&call.name, &arguments).as_deref());
                }
                ApprovalAnswer::Yes => {}
            }
        }

        resolved.push(Resolved::Approved {
            call: call.clone(),
            arguments,
        });
    }

    // Step 4: partition approved calls into parallel-safe and sequential,
    // preserving each call's original batch index for ordered emission.
    let mut slots: Vec<Option<Message>> = vec![None; calls.len()];
    let mut parallel_batch: Vec<(usize, ToolCallPart, String)> = Vec::new();
    let mut sequential_batch: Vec<(usize, ToolCallPart, String)> = Vec::new();

    for (index, item) in resolved.into_iter().enumerate() {
        match item {
            Resolved::Skipped { id, text } => {
                slots[index] = Some(Message::tool_result(id, text));
            }
            Resolved::Approved { call, arguments } => {
                let tool = registry.get(&call.name).expect("checked above");
                if tool.parallel_safe_for_args(&arguments) {
                    parallel_batch.push((index, call, arguments));
                } else {
                    sequential_batch.push((index, call, arguments));
                }
            }
        }
    }

    // Step 5: execute parallel-safe calls concurrently.
    if !cancelled && !parallel_batch.is_empty() {
        ui.start_spinner("running tools");
        let futures = parallel_batch.iter().map(|(_, call, arguments)| {
            run_one(registry, ui, call, arguments)
        });
        let outputs = join_all(futures).await;
        for ((index, _, _), message) in parallel_batch.iter().zip(outputs) {
            slots[*index] = Some(message);
        }
    } else {
        for (index, call, _) in &parallel_batch {
            slots[*index] = Some(Message::tool_result(call.id.clone(), CANCELLED_NOTICE));
        }
    }

    // Step 6: execute sequential calls one at a time.
    for (index, call, arguments) in &sequential_batch {
        if cancelled || interrupts_requested_cancel(interrupts, pending_instruction) {
            cancelled = true;
            slots[*index] = Some(Message::tool_result(call.id.clone(), CANCELLED_NOTICE));
            continue;
        }
        ui.start_spinner(&format!("running {}", call.name));
        let message = run_one(registry, ui, call, arguments).await;
        slots[*index] = Some(message);
    }
    ui.stop_spinner();

    // Step 7: emit in original order, appending the reminder to the last.
    let mut results: Vec<Message> = slots.into_iter().map(|m| m.expect("every call resolved")).collect();
    append_reminder(&mut results);

    DispatchOutcome { results, cancelled }
}

fn interrupts_requested_cancel(interrupts: &mut InterruptBus, pending: &mut Option<String>) -> bool {
    let mut cancelled = false;
    for interrupt in interrupts.flush() {
        match interrupt {
            Interrupt::Cancel => cancelled = true,
            Interrupt::Line(line) => queue_instruction(pending, line),
        }
    }
    if cancelled {
        debug!("tool dispatch cancelled by interrupt bus");
    }
    cancelled
}

pub(crate) fn queue_instruction(pending: &mut Option<String>, line: String) {
    *pending = Some(match pending.take() {
        Some(existing) => format!("{existing}\n{line}"),
        None => line,
    });
}

async fn run_one(registry: &Registry, ui: &Arc<dyn Ui>, call: &ToolCallPart, arguments: &str) -> Message {
    let tool = registry.get(&call.name).expect("checked by caller");
    let display = tool.render_call(arguments);
    if let Some(display) = &display {
        ui.render_event(&AgentEvent::ToolCallStart {
            id: call.id.clone(),
            display: display.clone(),
        });
    }

    let result = tool.call_erased(arguments).await;
    match result.text {
        Ok(text) => {
            if let Some(display) = result.display {
                ui.render_event(&AgentEvent::ToolCallDone {
                    id: call.id.clone(),
                    display,
                });
            }
            Message::tool_result(call.id.clone(), text)
        }
        Err(error) => {
            let compacted = compact_error(&error.to_string());
            warn!(tool = %call.name, error = %compacted, "tool call failed");
            ui.render_event(&AgentEvent::ToolCallDone {
                id: call.id.clone(),
                display: ToolResultDisplay {
                    title: "error".to_string(),
                    body: Some(crate::event::DisplayBody::Text(compacted.clone())),
                },
            });
            Message::tool_result(call.id.clone(), format!("{{\"error\": {:?}}}", compacted))
        }
    }
}

/// §4.4 compaction rule: head+tail ellipsis for long errors, default budget
/// ~800 bytes.
pub fn compact_error(text: &str) -> String {
    const BUDGET: usize = 800;
    if text.len() <= BUDGET {
        return text.to_string();
    }
    let half = (BUDGET - 5) / 2;
    let head_end = floor_char_boundary(text, half);
    let tail_start = floor_char_boundary(text, text.len() - half);
    format!("{}...{}", &text[..head_end], &text[tail_start..])
}

/// Largest byte index `<= index` that lands on a UTF-8 character boundary.
/// Error text routinely embeds file contents, so a fixed byte offset can
/// otherwise land inside a multibyte codepoint and panic on slicing.
fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn skipped_text(instructions: Option<&str>) -> String {
    match instructions {
        Some(instructions) => format!("{SKIPPED_NOTICE} Pending instruction: {instructions}"),
        None => SKIPPED_NOTICE.to_string(),
    }
}

/// Inject `user_instructions` into the arguments object, if present.
fn with_user_instructions(arguments: &str, instructions: Option<&str>) -> String {
    let Some(instructions) = instructions else {
        return arguments.to_string();
    };
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(serde_json::Value::Object(mut map)) => {
            map.insert(
                "user_instructions".to_string(),
                serde_json::Value::String(instructions.to_string()),
            );
            serde_json::to_string(&map).unwrap_or_else(|_| arguments.to_string())
        }
        _ => arguments.to_string(),
    }
}

/// Extracts the exact command string for shell-like tools, for per-command
/// "always allow" memoization (§4.5). Returns `None` for non-shell tools.
fn shell_command(tool_name: &str, arguments: &str) -> Option<String> {
    if tool_name != "bash" {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(arguments).ok()?;
    value.get("command")?.as_str().map(|s| s.to_string())
}

fn append_reminder(results: &mut [Message]) {
    if let Some(Message::Tool { parts }) = results.last_mut() {
        if let Some(last) = parts.last_mut() {
            last.content.push_str("\n\n");
            last.content.push_str(REMINDER);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalAnswer;
    use crate::config::Config;
    use crate::event::{DisplayBody, ToolCallDisplay, ToolResultDisplay};
    use crate::interrupt::channel;
    use crate::tool::{Tool, ToolOutput};
    use forge_llm::Describe;
    use forge_llm::request::Schema;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Clone, Deserialize, Serialize)]
    struct EchoInput {
        text: String,
        #[serde(default)]
        delay_ms: u64,
    }

    impl Describe for EchoInput {
        fn describe() -> Schema {
            Schema::Object { description: None, properties: vec![], required: vec![] }
        }
    }

    impl ToolOutput for String {
        fn to_llm(&self) -> String {
            self.clone()
        }
    }

    #[derive(Clone)]
    struct EchoTool {
        parallel_safe: bool,
        order: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl Tool for EchoTool {
        type Input = EchoInput;
        type Output = String;

        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes text"
        }
        async fn call(&self, input: EchoInput) -> Result<String, forge_llm::Error> {
            if input.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(input.delay_ms)).await;
            }
            self.order.lock().unwrap().push(input.text.clone());
            Ok(input.text)
        }
        fn render_input(&self, input: &EchoInput) -> ToolCallDisplay {
            ToolCallDisplay { title: input.text.clone(), body: None }
        }
        fn render_output(&self, _input: &EchoInput, output: &String) -> ToolResultDisplay {
            ToolResultDisplay { title: output.clone(), body: Some(DisplayBody::Text(output.clone())) }
        }
        fn parallel_safe(&self) -> bool {
            self.parallel_safe
        }
    }

    struct NoopUi;
    impl Ui for NoopUi {
        fn read_user_input(
            &self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<String>> + Send + '_>> {
            Box::pin(async { None })
        }
        fn confirm_action<'a>(
            &'a self,
            _request: ApprovalRequest<'a>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ApprovalAnswer> + Send + 'a>> {
            Box::pin(async { ApprovalAnswer::Yes })
        }
        fn start_spinner(&self, _label: &str) {}
        fn update_spinner(&self, _label: &str) {}
        fn stop_spinner(&self) {}
        fn render_event(&self, _event: &AgentEvent) {}
        fn show_error(&self, _message: &str) {}
        fn show_info(&self, _message: &str) {}
        fn show_success(&self, _message: &str) {}
        fn display_todos(&self, _todos: &[crate::todo::Todo]) {}
    }

    fn call(id: &str, text: &str, delay_ms: u64) -> ToolCallPart {
        ToolCallPart {
            id: id.to_string(),
            name: "echo".to_string(),
            arguments: serde_json::json!({ "text": text, "delay_ms": delay_ms }).to_string(),
            cache_control: false,
        }
    }

    #[tokio::test]
    async fn parallel_batch_preserves_original_order_despite_completion_skew() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.register(EchoTool { parallel_safe: true, order: order.clone() });

        let approval = ApprovalPolicy::new(&Config::default());
        let ui: Arc<dyn Ui> = Arc::new(NoopUi);
        let (_tx, mut bus) = channel();
        let mut pending = None;

        // "b" finishes before "a" because of the induced delay skew.
        let calls = vec![call("1", "a", 30), call("2", "b", 0), call("3", "c", 0)];

        let outcome = dispatch(&calls, &mut pending, &registry, &approval, &ui, &mut bus).await;
        assert!(!outcome.cancelled);
        assert_eq!(outcome.results.len(), 3);

        let texts: Vec<String> = outcome
            .results
            .iter()
            .map(|m| match m {
                Message::Tool { parts } => parts[0].content.clone(),
                _ => panic!("expected tool message"),
            })
            .collect();
        assert!(texts[0].starts_with('a'));
        assert!(texts[1].starts_with('b'));
        assert!(texts[2].starts_with('c'));
        assert!(texts[2].contains(REMINDER));
        assert!(!texts[0].contains(REMINDER));
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result_without_panicking() {
        let registry = Registry::new();
        let approval = ApprovalPolicy::new(&Config::default());
        let ui: Arc<dyn Ui> = Arc::new(NoopUi);
        let (_tx, mut bus) = channel();
        let mut pending = None;

        let calls = vec![ToolCallPart {
            id: "1".into(),
            name: "does-not-exist".into(),
            arguments: "{}".into(),
            cache_control: false,
        }];
        let outcome = dispatch(&calls, &mut pending, &registry, &approval, &ui, &mut bus).await;
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn compact_error_keeps_head_and_tail_within_budget() {
        let long = "x".repeat(2000);
        let compacted = compact_error(&long);
        assert!(compacted.len() < long.len());
        assert!(compacted.starts_with("xxx"));
        assert!(compacted.ends_with("xxx"));
    }

    #[test]
    fn compact_error_does_not_split_a_multibyte_char_at_the_cut() {
        // A multibyte codepoint ("é", 2 bytes) straddles both the head and
        // tail cut points once repeated past the budget.
        let long = "é".repeat(1000);
        let compacted = compact_error(&long);
        assert!(compacted.is_char_boundary(0));
        assert!(compacted.contains("..."));
    }

    #[test]
    fn with_user_instructions_injects_key_into_object_arguments() {
        let amended = with_user_instructions(r#"{"path": "a.py"}"#, Some("also check TODOs"));
        let value: serde_json::Value = serde_json::from_str(&amended).unwrap();
        assert_eq!(value["user_instructions"], "also check TODOs");
        assert_eq!(value["path"], "a.py");
    }
}
