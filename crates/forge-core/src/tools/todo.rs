use std::sync::Arc;

use forge_llm::{Describe, Property, Schema};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::approval::ApprovalClass;
use crate::event::{DisplayBody, ToolCallDisplay, ToolResultDisplay};
use crate::tool::{Tool, ToolOutput};
use crate::todo::{Todo, TodoStatus};

#[derive(Clone, Deserialize)]
pub struct TodoItemInput {
    pub id: String,
    pub content: String,
    pub status: String,
}

#[derive(Clone, Deserialize)]
pub struct TodoWriteInput {
    /// The full todo list, replacing whatever was there before.
    pub todos: Vec<TodoItemInput>,
}

impl Describe for TodoWriteInput {
    fn describe() -> Schema {
        Schema::Object {
            description: None,
            properties: vec![Property {
                name: "todos".into(),
                schema: Schema::Array {
                    description: Some("The full todo list, replacing whatever was there before".into()),
                    items: Box::new(Schema::Object {
                        description: None,
                        properties: vec![
                            Property {
                                name: "id".into(),
                                schema: Schema::String {
                                    description: Some("Stable identifier for this todo item".into()),
                                    enumeration: None,
                                },
                            },
                            Property {
                                name: "content".into(),
                                schema: Schema::String {
                                    description: Some("What needs to be done".into()),
                                    enumeration: None,
                                },
                            },
                            Property {
                                name: "status".into(),
                                schema: Schema::String {
                                    description: Some("Current status of this item".into()),
                                    enumeration: Some(vec![
                                        "pending".into(),
                                        "in_progress".into(),
                                        "completed".into(),
                                    ]),
                                },
                            },
                        ],
                        required: vec!["id".into(), "content".into(), "status".into()],
                    }),
                },
            }],
            required: vec!["todos".into()],
        }
    }
}

/// Structured output from writing the todo list.
pub struct TodoWriteOutput {
    pub count: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl ToolOutput for TodoWriteOutput {
    fn to_llm(&self) -> String {
        format!(
            "todo list updated: {} items ({} in progress, {} completed)",
            self.count, self.in_progress, self.completed
        )
    }
}

/// Tool that replaces the shared todo list. The list is held behind a
/// shared `Mutex` so the frontend can render it independently of the
/// model's tool-result text (see [`Ui::display_todos`](crate::ui::Ui)).
#[derive(Clone)]
pub struct TodoWriteTool {
    pub(crate) todos: Arc<Mutex<Vec<Todo>>>,
}

impl TodoWriteTool {
    pub fn new(todos: Arc<Mutex<Vec<Todo>>>) -> Self {
        Self { todos }
    }
}

impl Tool for TodoWriteTool {
    type Input = TodoWriteInput;
    type Output = TodoWriteOutput;

    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replace the shared todo list with a new set of items. Use this to plan and track progress on multi-step tasks."
    }

    async fn call(&self, input: TodoWriteInput) -> Result<TodoWriteOutput, forge_llm::Error> {
        let mut todos = Vec::with_capacity(input.todos.len());
        for item in input.todos {
            let status = match item.status.as_str() {
                "pending" => TodoStatus::Pending,
                "in_progress" => TodoStatus::InProgress,
                "completed" => TodoStatus::Completed,
                other => {
                    return Err(forge_llm::Error::Other(format!(
                        "unknown todo status `{other}`"
                    )));
                }
            };
            todos.push(Todo {
                id: item.id,
                content: item.content,
                status,
            });
        }

        let in_progress = todos
            .iter()
            .filter(|t| t.status == TodoStatus::InProgress)
            .count();
        let completed = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        let count = todos.len();

        *self.todos.lock() = todos;

        Ok(TodoWriteOutput {
            count,
            in_progress,
            completed,
        })
    }

    fn render_input(&self, input: &TodoWriteInput) -> ToolCallDisplay {
        ToolCallDisplay {
            title: format!("Update todo list ({} items)", input.todos.len()),
            body: None,
        }
    }

    fn render_output(&self, _input: &TodoWriteInput, output: &TodoWriteOutput) -> ToolResultDisplay {
        ToolResultDisplay {
            title: format!("{} items", output.count),
            body: Some(DisplayBody::Text(output.to_llm())),
        }
    }

    fn approval_class(&self) -> ApprovalClass {
        ApprovalClass::Never
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn todo_write_replaces_shared_list_and_counts_statuses() {
        let shared = Arc::new(Mutex::new(Vec::new()));
        let tool = TodoWriteTool::new(shared.clone());

        let out = tool
            .call(TodoWriteInput {
                todos: vec![
                    TodoItemInput {
                        id: "1".into(),
                        content: "write tests".into(),
                        status: "completed".into(),
                    },
                    TodoItemInput {
                        id: "2".into(),
                        content: "ship it".into(),
                        status: "in_progress".into(),
                    },
                ],
            })
            .await
            .unwrap();

        assert_eq!(out.count, 2);
        assert_eq!(out.completed, 1);
        assert_eq!(out.in_progress, 1);
        assert_eq!(shared.lock().len(), 2);
    }

    #[tokio::test]
    async fn todo_write_rejects_unknown_status() {
        let shared = Arc::new(Mutex::new(Vec::new()));
        let tool = TodoWriteTool::new(shared);

        let result = tool
            .call(TodoWriteInput {
                todos: vec![TodoItemInput {
                    id: "1".into(),
                    content: "x".into(),
                    status: "blocked".into(),
                }],
            })
            .await;

        assert!(result.is_err());
    }
}
