use std::sync::Arc;

use chrono::Utc;
use forge_llm::{Describe, Property, Schema};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalClass;
use crate::event::{DisplayBody, ToolCallDisplay, ToolResultDisplay};
use crate::tool::{Tool, ToolOutput};

const DEFAULT_LIMIT: usize = 5;

/// One append-only entry in the task memory log. Mirrored to
/// `.forge/task_memory.jsonl` by the CLI; the tool itself only ever touches
/// the in-memory copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMemoryEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Clone, Deserialize)]
pub struct TaskMemoryInput {
    /// One of `recall`, `similar`, `remember`.
    pub action: String,
    /// Search text for `recall`/`similar`.
    #[serde(default)]
    pub query: Option<String>,
    /// The text to store for `remember`.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Describe for TaskMemoryInput {
    fn describe() -> Schema {
        Schema::Object {
            description: None,
            properties: vec![
                Property {
                    name: "action".into(),
                    schema: Schema::String {
                        description: Some("One of recall, similar, remember".into()),
                        enumeration: Some(vec![
                            "recall".into(),
                            "similar".into(),
                            "remember".into(),
                        ]),
                    },
                },
                Property {
                    name: "query".into(),
                    schema: Schema::String {
                        description: Some("Search text for recall/similar".into()),
                        enumeration: None,
                    },
                },
                Property {
                    name: "text".into(),
                    schema: Schema::String {
                        description: Some("The text to store for remember".into()),
                        enumeration: None,
                    },
                },
                Property {
                    name: "tags".into(),
                    schema: Schema::Array {
                        description: Some("Tags to attach when remembering".into()),
                        items: Box::new(Schema::String {
                            description: None,
                            enumeration: None,
                        }),
                    },
                },
                Property {
                    name: "limit".into(),
                    schema: Schema::Integer {
                        description: Some("Maximum number of entries to return".into()),
                    },
                },
            ],
            required: vec!["action".into()],
        }
    }
}

/// Structured output from a task-memory action.
pub struct TaskMemoryOutput {
    text: String,
}

impl ToolOutput for TaskMemoryOutput {
    fn to_llm(&self) -> String {
        self.text.clone()
    }
}

/// Tool that recalls, ranks, or appends entries to the append-only task
/// memory log shared across runs of the agent.
#[derive(Clone)]
pub struct TaskMemoryTool {
    pub(crate) entries: Arc<Mutex<Vec<TaskMemoryEntry>>>,
}

impl TaskMemoryTool {
    pub fn new(entries: Arc<Mutex<Vec<TaskMemoryEntry>>>) -> Self {
        Self { entries }
    }
}

impl Tool for TaskMemoryTool {
    type Input = TaskMemoryInput;
    type Output = TaskMemoryOutput;

    fn name(&self) -> &str {
        "task_memory"
    }

    fn description(&self) -> &str {
        "Recall, rank, or append entries in the task memory log: `recall` does a keyword search, `similar` ranks by word overlap, `remember` appends a new entry."
    }

    async fn call(&self, input: TaskMemoryInput) -> Result<TaskMemoryOutput, forge_llm::Error> {
        let limit = if input.limit == 0 {
            DEFAULT_LIMIT
        } else {
            input.limit
        };

        match input.action.as_str() {
            "recall" => {
                let query = input
                    .query
                    .ok_or_else(|| forge_llm::Error::Other("recall requires `query`".into()))?;
                let matches = recall(&self.entries.lock(), &query, limit);
                Ok(TaskMemoryOutput {
                    text: render_entries(&matches),
                })
            }
            "similar" => {
                let query = input
                    .query
                    .ok_or_else(|| forge_llm::Error::Other("similar requires `query`".into()))?;
                let matches = similar(&self.entries.lock(), &query, limit);
                Ok(TaskMemoryOutput {
                    text: render_entries(&matches),
                })
            }
            "remember" => {
                let text = input
                    .text
                    .ok_or_else(|| forge_llm::Error::Other("remember requires `text`".into()))?;
                let entry = TaskMemoryEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    text: text.clone(),
                    tags: input.tags,
                    created_at: Utc::now(),
                };
                self.entries.lock().push(entry);
                Ok(TaskMemoryOutput {
                    text: format!("remembered: {text}"),
                })
            }
            other => Err(forge_llm::Error::Other(format!(
                "unknown task_memory action `{other}`"
            ))),
        }
    }

    fn render_input(&self, input: &TaskMemoryInput) -> ToolCallDisplay {
        ToolCallDisplay {
            title: format!("task_memory {}", input.action),
            body: None,
        }
    }

    fn render_output(&self, _input: &TaskMemoryInput, output: &TaskMemoryOutput) -> ToolResultDisplay {
        ToolResultDisplay {
            title: "task memory".to_string(),
            body: Some(DisplayBody::Text(output.text.clone())),
        }
    }

    fn parallel_safe_for(&self, input: &TaskMemoryInput) -> bool {
        matches!(input.action.as_str(), "recall" | "similar")
    }

    fn approval_class(&self) -> ApprovalClass {
        ApprovalClass::Never
    }
}

fn recall(entries: &[TaskMemoryEntry], query: &str, limit: usize) -> Vec<TaskMemoryEntry> {
    let needle = query.to_lowercase();
    let mut matches: Vec<&TaskMemoryEntry> = entries
        .iter()
        .filter(|e| e.text.to_lowercase().contains(&needle))
        .collect();
    matches.sort_by_key(|e| std::cmp::Reverse(e.created_at));
    matches.into_iter().take(limit).cloned().collect()
}

fn similar(entries: &[TaskMemoryEntry], query: &str, limit: usize) -> Vec<TaskMemoryEntry> {
    let query_words: std::collections::HashSet<String> =
        query.to_lowercase().split_whitespace().map(str::to_string).collect();

    let mut scored: Vec<(usize, &TaskMemoryEntry)> = entries
        .iter()
        .map(|e| {
            let entry_words: std::collections::HashSet<String> = e
                .text
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect();
            (query_words.intersection(&entry_words).count(), e)
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));
    scored.into_iter().take(limit).map(|(_, e)| e.clone()).collect()
}

fn render_entries(entries: &[TaskMemoryEntry]) -> String {
    if entries.is_empty() {
        return "No matching memories.".to_string();
    }
    entries
        .iter()
        .map(|e| format!("- [{}] {}", e.created_at.format("%Y-%m-%d"), e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remember_then_recall_finds_the_entry() {
        let store = Arc::new(Mutex::new(Vec::new()));
        let tool = TaskMemoryTool::new(store);

        tool.call(TaskMemoryInput {
            action: "remember".into(),
            query: None,
            text: Some("the build uses cargo workspaces".into()),
            tags: vec![],
            limit: 5,
        })
        .await
        .unwrap();

        let out = tool
            .call(TaskMemoryInput {
                action: "recall".into(),
                query: Some("workspaces".into()),
                text: None,
                tags: vec![],
                limit: 5,
            })
            .await
            .unwrap();

        assert!(out.text.contains("cargo workspaces"));
    }

    #[tokio::test]
    async fn similar_ranks_by_word_overlap() {
        let store = Arc::new(Mutex::new(Vec::new()));
        let tool = TaskMemoryTool::new(store);

        for text in ["fix the parser bug", "parser emits wrong tokens", "unrelated note"] {
            tool.call(TaskMemoryInput {
                action: "remember".into(),
                query: None,
                text: Some(text.into()),
                tags: vec![],
                limit: 5,
            })
            .await
            .unwrap();
        }

        let out = tool
            .call(TaskMemoryInput {
                action: "similar".into(),
                query: Some("parser tokens".into()),
                text: None,
                tags: vec![],
                limit: 2,
            })
            .await
            .unwrap();

        assert!(out.text.contains("parser"));
        assert!(!out.text.contains("unrelated"));
    }

    #[tokio::test]
    async fn parallel_safe_only_for_read_actions() {
        let store = Arc::new(Mutex::new(Vec::new()));
        let tool = TaskMemoryTool::new(store);

        let recall_input = TaskMemoryInput {
            action: "recall".into(),
            query: Some("x".into()),
            text: None,
            tags: vec![],
            limit: 5,
        };
        let remember_input = TaskMemoryInput {
            action: "remember".into(),
            query: None,
            text: Some("x".into()),
            tags: vec![],
            limit: 5,
        };

        assert!(tool.parallel_safe_for(&recall_input));
        assert!(!tool.parallel_safe_for(&remember_input));
    }
}
