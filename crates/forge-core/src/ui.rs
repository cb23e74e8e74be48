//! §6 UI contract: the boundary between the control loop and a frontend.
//!
//! `Ui` is stored as `Arc<dyn Ui>` inside the agent, so its async methods are
//! manually boxed (no `async_trait`) to stay object-safe, mirroring
//! [`crate::tool::ErasedTool`].

use std::future::Future;
use std::pin::Pin;

use crate::approval::ApprovalAnswer;
use crate::event::{AgentEvent, ToolCallDisplay};

/// What the user is being asked to approve before a tool runs.
pub struct ApprovalRequest<'a> {
    pub tool_name: &'a str,
    pub display: &'a ToolCallDisplay,
    /// Whether an "always allow" option should be offered (false for tools
    /// the model marked `need_user_approve`, per §4.5 — those are one-shot).
    pub offer_always: bool,
}

/// The rendering and input surface a frontend implements. One instance is
/// shared (`Arc<dyn Ui>`) between the agent loop and the background
/// interrupt reader the frontend spawns on its own (see
/// [`crate::interrupt`]).
pub trait Ui: Send + Sync {
    /// Block for the next line of user input (the top-level prompt, not an
    /// approval answer). Returns `None` on EOF/quit.
    fn read_user_input(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>>;

    /// Ask the user to approve a pending tool call.
    fn confirm_action<'a>(
        &'a self,
        request: ApprovalRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = ApprovalAnswer> + Send + 'a>>;

    fn start_spinner(&self, label: &str);
    fn update_spinner(&self, label: &str);
    fn stop_spinner(&self);

    /// Render one agent event. Frontends match on the variant; unhandled
    /// variants are legal to ignore.
    fn render_event(&self, event: &AgentEvent);

    fn show_error(&self, message: &str);
    fn show_info(&self, message: &str);
    fn show_success(&self, message: &str);

    /// Render the current todo list (§4.7 `todo_write`'s side effect).
    fn display_todos(&self, todos: &[crate::todo::Todo]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todo::Todo;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingUi {
        shown: Mutex<Vec<String>>,
    }

    impl Ui for RecordingUi {
        fn read_user_input(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
            Box::pin(async { Some("hello".to_string()) })
        }

        fn confirm_action<'a>(
            &'a self,
            _request: ApprovalRequest<'a>,
        ) -> Pin<Box<dyn Future<Output = ApprovalAnswer> + Send + 'a>> {
            Box::pin(async { ApprovalAnswer::Yes })
        }

        fn start_spinner(&self, label: &str) {
            self.shown.lock().push(format!("spin:{label}"));
        }
        fn update_spinner(&self, label: &str) {
            self.shown.lock().push(format!("update:{label}"));
        }
        fn stop_spinner(&self) {
            self.shown.lock().push("stop".to_string());
        }
        fn render_event(&self, _event: &AgentEvent) {}
        fn show_error(&self, message: &str) {
            self.shown.lock().push(format!("error:{message}"));
        }
        fn show_info(&self, message: &str) {
            self.shown.lock().push(format!("info:{message}"));
        }
        fn show_success(&self, message: &str) {
            self.shown.lock().push(format!("success:{message}"));
        }
        fn display_todos(&self, _todos: &[Todo]) {}
    }

    #[tokio::test]
    async fn ui_is_object_safe_and_callable_through_a_trait_object() {
        let recorder = std::sync::Arc::new(RecordingUi::default());
        let ui: std::sync::Arc<dyn Ui> = recorder.clone();
        assert_eq!(ui.read_user_input().await, Some("hello".to_string()));
        ui.start_spinner("thinking");
        ui.stop_spinner();
        ui.show_info("hi");

        assert_eq!(
            *recorder.shown.lock(),
            vec!["spin:thinking", "stop", "info:hi"]
        );
    }
}
