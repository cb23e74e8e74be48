//! §9 "Cyclic references" design note: a subagent delegates to the owning
//! agent's control loop, but the owning agent also owns the tool registry
//! this tool lives in. Rather than give [`SubagentTool`] a reference to the
//! concrete `Agent` (a type cycle), it holds an [`AgentRunner`] trait
//! object. The CLI wires the two together after both exist — typically via
//! a handle that is filled in once the owning agent is constructed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use forge_llm::{Describe, Property, Schema};
use serde::Deserialize;

use crate::approval::ApprovalClass;
use crate::event::{DisplayBody, ToolCallDisplay, ToolResultDisplay};
use crate::tool::{Tool, ToolOutput};

/// Runs a task to completion on behalf of a subagent call and returns the
/// final assistant text, the same contract as `Agent::run_task`.
pub trait AgentRunner: Send + Sync {
    fn run_task<'a>(
        &'a self,
        system_prompt: String,
        user_input: String,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>>;
}

#[derive(Clone, Deserialize)]
pub struct SubagentInput {
    /// The task to delegate, in natural language.
    pub task: String,
    /// Optional system prompt override for the subagent's own frame.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Describe for SubagentInput {
    fn describe() -> Schema {
        Schema::Object {
            description: None,
            properties: vec![
                Property {
                    name: "task".into(),
                    schema: Schema::String {
                        description: Some("The task to delegate, in natural language".into()),
                        enumeration: None,
                    },
                },
                Property {
                    name: "system_prompt".into(),
                    schema: Schema::String {
                        description: Some(
                            "Optional system prompt override for the subagent's own frame".into(),
                        ),
                        enumeration: None,
                    },
                },
            ],
            required: vec!["task".into()],
        }
    }
}

/// Structured output from a subagent run: its final assistant text.
pub struct SubagentOutput(pub String);

impl ToolOutput for SubagentOutput {
    fn to_llm(&self) -> String {
        self.0.clone()
    }
}

const DEFAULT_SUBAGENT_PROMPT: &str =
    "You are a focused subagent. Complete the given task and report your result concisely.";

/// Tool that delegates a task to a nested turn-cycle frame on the owning
/// agent, inheriting its approval policy and tool registry.
#[derive(Clone)]
pub struct SubagentTool {
    pub(crate) runner: Arc<dyn AgentRunner>,
}

impl SubagentTool {
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self { runner }
    }
}

impl Tool for SubagentTool {
    type Input = SubagentInput;
    type Output = SubagentOutput;

    fn name(&self) -> &str {
        "subagent"
    }

    fn description(&self) -> &str {
        "Delegate a task to a subagent that runs its own turn cycle to completion and reports back a single result."
    }

    async fn call(&self, input: SubagentInput) -> Result<SubagentOutput, forge_llm::Error> {
        let system_prompt = input
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SUBAGENT_PROMPT.to_string());
        let result = self.runner.run_task(system_prompt, input.task).await;
        Ok(SubagentOutput(result))
    }

    fn render_input(&self, input: &SubagentInput) -> ToolCallDisplay {
        ToolCallDisplay {
            title: format!("Delegate: {}", input.task),
            body: None,
        }
    }

    fn render_output(&self, _input: &SubagentInput, output: &SubagentOutput) -> ToolResultDisplay {
        ToolResultDisplay {
            title: "Subagent result".to_string(),
            body: Some(DisplayBody::Text(output.0.clone())),
        }
    }

    fn approval_class(&self) -> ApprovalClass {
        ApprovalClass::Never
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRunner;

    impl AgentRunner for EchoRunner {
        fn run_task<'a>(
            &'a self,
            system_prompt: String,
            user_input: String,
        ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
            Box::pin(async move { format!("[{system_prompt}] handled: {user_input}") })
        }
    }

    #[tokio::test]
    async fn subagent_delegates_through_the_runner_trait_object() {
        let tool = SubagentTool::new(Arc::new(EchoRunner));
        let out = tool
            .call(SubagentInput {
                task: "summarize the README".into(),
                system_prompt: None,
            })
            .await
            .unwrap();

        assert!(out.0.contains(DEFAULT_SUBAGENT_PROMPT));
        assert!(out.0.contains("summarize the README"));
    }

    #[tokio::test]
    async fn subagent_honors_system_prompt_override() {
        let tool = SubagentTool::new(Arc::new(EchoRunner));
        let out = tool
            .call(SubagentInput {
                task: "do a thing".into(),
                system_prompt: Some("custom prompt".into()),
            })
            .await
            .unwrap();

        assert!(out.0.starts_with("[custom prompt]"));
    }
}
