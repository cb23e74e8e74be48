mod bash;
mod edit;
mod git;
mod grep;
mod read;
mod skill;
mod subagent;
mod task_memory;
mod todo;
mod write;

pub use bash::BashTool;
pub use edit::EditTool;
pub use git::{GitDiffTool, GitStatusTool};
pub use grep::GrepTool;
pub use read::ReadTool;
pub use skill::SkillTool;
pub use subagent::{AgentRunner, SubagentTool};
pub use task_memory::{TaskMemoryEntry, TaskMemoryTool};
pub use todo::TodoWriteTool;
pub use write::WriteTool;
