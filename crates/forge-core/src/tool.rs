use forge_llm::{Describe, ToolDefinition};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

use crate::approval::ApprovalClass;
use crate::event::{ToolCallDisplay, ToolResultDisplay};

/// A tool's structured result, rendered to the string form the model sees.
pub trait ToolOutput: Send + 'static {
    fn to_llm(&self) -> String;
}

impl ToolOutput for String {
    fn to_llm(&self) -> String {
        self.clone()
    }
}

/// A callable tool with typed input and output. Implement this trait to
/// register tools with the agent.
///
/// The `Input` type must implement [`Describe`] (for schema generation) and
/// [`DeserializeOwned`] (for parsing the model's JSON arguments). `Output`
/// implements [`ToolOutput`] so the dispatcher can render it both to the
/// model (`to_llm`) and to the UI (`render_output`).
///
/// Tools must be `Clone` so the erasure layer can clone them before calling
/// `async fn call` — this avoids the borrow-across-await problem without
/// requiring manual `Box::pin`.
pub trait Tool: Clone + Send + Sync + 'static {
    type Input: Describe + DeserializeOwned + Clone + Send;
    type Output: ToolOutput;

    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn call(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, forge_llm::Error>> + Send;

    fn render_input(&self, input: &Self::Input) -> ToolCallDisplay;
    fn render_output(&self, input: &Self::Input, output: &Self::Output) -> ToolResultDisplay;

    /// Whether independent calls to this tool may run concurrently within
    /// the same batch. Defaults to `false` (sequential); read-only tools
    /// override this to `true`.
    fn parallel_safe(&self) -> bool {
        false
    }

    /// Per-call override of [`parallel_safe`](Tool::parallel_safe) based on
    /// parsed arguments (e.g. the task-memory tool is parallel-safe only for
    /// its read actions). Defaults to [`parallel_safe`](Tool::parallel_safe).
    fn parallel_safe_for(&self, _input: &Self::Input) -> bool {
        self.parallel_safe()
    }

    /// Whether this tool category always requires user approval before
    /// running, independent of the `ApprovalPolicy` table (§4.5). Most tools
    /// leave this `false` and rely on the table; destructive tools that must
    /// never be auto-approved regardless of config override it.
    fn always_requires_approval(&self) -> bool {
        false
    }

    /// This tool's row in the §4.5 default-policy table.
    fn approval_class(&self) -> ApprovalClass {
        ApprovalClass::Never
    }

    /// Per-call `need_user_approve` schema override (§4.5): the model may set
    /// this on a specific invocation to force approval even for an otherwise
    /// never-approve tool. Defaults to `false`.
    fn need_user_approve(&self, _input: &Self::Input) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Type erasure
// ---------------------------------------------------------------------------

/// Object-safe, type-erased wrapper around a [`Tool`].
///
/// The returned future from `call_erased` is `'static` — it does not borrow
/// `self`, which allows callers to drop locks before awaiting.
pub trait ErasedTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    fn parallel_safe_for_args(&self, arguments: &str) -> bool;
    fn always_requires_approval(&self) -> bool;
    fn approval_class(&self) -> ApprovalClass;

    /// Whether the model set `need_user_approve` on this specific call.
    /// Arguments that fail to parse are treated as not requesting it (the
    /// dispatcher's JSON-parse-failure path already forces an error result).
    fn needs_approval_for_args(&self, arguments: &str) -> bool;

    /// Render the tool-call display, or `None` if arguments failed to parse
    /// (the dispatcher falls back to a raw-JSON display in that case).
    fn render_call(&self, arguments: &str) -> Option<ToolCallDisplay>;

    fn call_erased(
        &self,
        arguments: &str,
    ) -> Pin<Box<dyn Future<Output = ToolCallResult> + Send>>;
}

/// The result of an erased tool call: the text the model sees, plus the
/// rendered display for the UI (when the call succeeded and could be
/// rendered).
pub struct ToolCallResult {
    pub text: Result<String, forge_llm::Error>,
    pub display: Option<ToolResultDisplay>,
}

impl<T: Tool> ErasedTool for T {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: T::Input::describe(),
        }
    }

    fn parallel_safe_for_args(&self, arguments: &str) -> bool {
        match serde_json::from_str::<T::Input>(arguments) {
            Ok(input) => self.parallel_safe_for(&input),
            Err(_) => self.parallel_safe(),
        }
    }

    fn always_requires_approval(&self) -> bool {
        Tool::always_requires_approval(self)
    }

    fn approval_class(&self) -> ApprovalClass {
        Tool::approval_class(self)
    }

    fn needs_approval_for_args(&self, arguments: &str) -> bool {
        match serde_json::from_str::<T::Input>(arguments) {
            Ok(input) => self.need_user_approve(&input),
            Err(_) => false,
        }
    }

    fn render_call(&self, arguments: &str) -> Option<ToolCallDisplay> {
        let input: T::Input = serde_json::from_str(arguments).ok()?;
        Some(self.render_input(&input))
    }

    fn call_erased(
        &self,
        arguments: &str,
    ) -> Pin<Box<dyn Future<Output = ToolCallResult> + Send>> {
        let parsed: Result<T::Input, serde_json::Error> = serde_json::from_str(arguments);
        let this = self.clone();
        Box::pin(async move {
            let input = match parsed {
                Ok(input) => input,
                Err(e) => {
                    return ToolCallResult {
                        text: Err(forge_llm::Error::Other(format!(
                            "invalid arguments: {e}"
                        ))),
                        display: None,
                    };
                }
            };
            match this.call(input.clone()).await {
                Ok(output) => {
                    let display = this.render_output(&input, &output);
                    ToolCallResult {
                        text: Ok(output.to_llm()),
                        display: Some(display),
                    }
                }
                Err(e) => ToolCallResult {
                    text: Err(e),
                    display: None,
                },
            }
        })
    }
}
