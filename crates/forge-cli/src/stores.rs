//! §6 persistent state: small dedicated stores the CLI wires up around the
//! shared `Arc<Mutex<...>>` state the tools mutate. `HistoryStore`/`Agent`
//! never touch any of these paths directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use forge_core::{TaskMemoryEntry, Todo, TodoStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// `.forge/agent_prefs.json` — user preferences, e.g. auto-save-on-exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPrefs {
    #[serde(default = "default_true")]
    pub auto_save_on_exit: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AgentPrefs {
    fn default() -> Self {
        Self {
            auto_save_on_exit: true,
        }
    }
}

pub struct PrefsStore {
    path: PathBuf,
}

impl PrefsStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(".forge").join("agent_prefs.json"),
        }
    }

    pub fn load(&self) -> AgentPrefs {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, prefs: &AgentPrefs) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(prefs).unwrap_or_default();
        std::fs::write(&self.path, raw)
    }
}

/// `.forge/task_memory.jsonl` (the append-only agent log) and
/// `.forge_memories.json` (an array of user-authored entries, read once as
/// a seed and never rewritten by this store).
pub struct TaskMemoryStore {
    log_path: PathBuf,
    seed_path: PathBuf,
}

impl TaskMemoryStore {
    pub fn new(root: &Path) -> Self {
        Self {
            log_path: root.join(".forge").join("task_memory.jsonl"),
            seed_path: root.join(".forge_memories.json"),
        }
    }

    /// Load the append-only log plus the user-authored seed file, merged and
    /// deduplicated by id.
    pub fn load(&self) -> Vec<TaskMemoryEntry> {
        let mut entries = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for path in [&self.log_path, &self.seed_path] {
            let Ok(raw) = std::fs::read_to_string(path) else {
                continue;
            };
            for entry in parse_entries(path, &raw) {
                if seen.insert(entry.id.clone()) {
                    entries.push(entry);
                }
            }
        }
        entries
    }

    /// Append entries not already present on disk to the jsonl log. Called
    /// after each turn so `remember` calls survive a restart.
    pub fn persist_new(&self, entries: &[TaskMemoryEntry], already_on_disk: &mut std::collections::HashSet<String>) -> std::io::Result<()> {
        let fresh: Vec<&TaskMemoryEntry> = entries
            .iter()
            .filter(|e| !already_on_disk.contains(&e.id))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        use std::io::Write;
        for entry in &fresh {
            let line = serde_json::to_string(entry).unwrap_or_default();
            writeln!(file, "{line}")?;
            already_on_disk.insert(entry.id.clone());
        }
        Ok(())
    }
}

fn parse_entries(path: &Path, raw: &str) -> Vec<TaskMemoryEntry> {
    // `.forge_memories.json` is a JSON array; `task_memory.jsonl` is one
    // object per line. Try the array shape first since it fails fast on a
    // jsonl file (a bare `{` is not valid as a whole-document array).
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        if let Ok(array) = serde_json::from_str::<Vec<TaskMemoryEntry>>(raw) {
            return array;
        }
    }
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// `todo.md` — human-readable mirror of the current todo list.
pub struct TodoStore {
    path: PathBuf,
}

impl TodoStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("todo.md"),
        }
    }

    /// Best-effort load; a missing or malformed file yields an empty list.
    pub fn load(&self) -> Vec<Todo> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines()
            .enumerate()
            .filter_map(|(i, line)| parse_todo_line(i, line))
            .collect()
    }

    pub fn save(&self, todos: &[Todo]) -> std::io::Result<()> {
        let mut out = String::from("# Todos\n\n");
        for todo in todos {
            let mark = match todo.status {
                TodoStatus::Completed => "x",
                TodoStatus::InProgress => "~",
                TodoStatus::Pending => " ",
            };
            out.push_str(&format!("- [{mark}] {}\n", todo.content));
        }
        std::fs::write(&self.path, out)
    }
}

fn parse_todo_line(index: usize, line: &str) -> Option<Todo> {
    let line = line.trim();
    let rest = line.strip_prefix("- [")?;
    let (mark, content) = rest.split_once(']')?;
    let status = match mark {
        "x" | "X" => TodoStatus::Completed,
        "~" => TodoStatus::InProgress,
        _ => TodoStatus::Pending,
    };
    Some(Todo {
        id: index.to_string(),
        content: content.trim().to_string(),
        status,
    })
}

/// Bundles the shared state that tools mutate with the stores that persist
/// it, so `main` can load once at startup and save once at shutdown.
pub struct Persistence {
    pub prefs_store: PrefsStore,
    pub prefs: AgentPrefs,
    pub task_memory_store: TaskMemoryStore,
    pub task_memory: Arc<Mutex<Vec<TaskMemoryEntry>>>,
    pub todo_store: TodoStore,
    pub todos: Arc<Mutex<Vec<Todo>>>,
}

impl Persistence {
    pub fn load(root: &Path) -> Self {
        let prefs_store = PrefsStore::new(root);
        let prefs = prefs_store.load();
        let task_memory_store = TaskMemoryStore::new(root);
        let task_memory = Arc::new(Mutex::new(task_memory_store.load()));
        let todo_store = TodoStore::new(root);
        let todos = Arc::new(Mutex::new(todo_store.load()));
        Self {
            prefs_store,
            prefs,
            task_memory_store,
            task_memory,
            todo_store,
            todos,
        }
    }

    /// Persist whatever changed since the last call. Safe to call on every
    /// `TurnComplete` and once more at shutdown.
    pub fn flush(&self, task_memory_on_disk: &mut std::collections::HashSet<String>) {
        let entries = self.task_memory.lock().clone();
        if let Err(err) = self.task_memory_store.persist_new(&entries, task_memory_on_disk) {
            tracing::warn!(%err, "failed to persist task memory");
        }
        let todos = self.todos.lock().clone();
        if let Err(err) = self.todo_store.save(&todos) {
            tracing::warn!(%err, "failed to persist todo.md");
        }
        if self.prefs.auto_save_on_exit {
            if let Err(err) = self.prefs_store.save(&self.prefs) {
                tracing::warn!(%err, "failed to persist agent prefs");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todo_round_trips_through_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::new(dir.path());
        let todos = vec![
            Todo { id: "1".into(), content: "write tests".into(), status: TodoStatus::Completed },
            Todo { id: "2".into(), content: "ship it".into(), status: TodoStatus::InProgress },
        ];
        store.save(&todos).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].status, TodoStatus::Completed);
        assert_eq!(loaded[1].status, TodoStatus::InProgress);
    }

    #[test]
    fn task_memory_merges_log_and_seed_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskMemoryStore::new(dir.path());

        let entry = TaskMemoryEntry {
            id: "abc".into(),
            text: "remembered thing".into(),
            tags: vec![],
            created_at: chrono::Utc::now(),
        };
        let mut on_disk = std::collections::HashSet::new();
        store.persist_new(&[entry.clone()], &mut on_disk).unwrap();
        store.persist_new(&[entry.clone()], &mut on_disk).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "abc");
    }
}
