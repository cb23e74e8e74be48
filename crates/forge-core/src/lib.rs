pub mod agent;
pub mod approval;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod history;
pub mod interrupt;
pub mod registry;
pub mod todo;
pub mod tool;
pub mod tools;
pub mod ui;

pub use agent::{Agent, AgentHandles, SharedAgentResources};
pub use approval::{ApprovalAnswer, ApprovalClass, ApprovalPolicy};
pub use config::Config;
pub use dispatcher::{dispatch, DispatchOutcome};
pub use event::{AgentEvent, DisplayBody, ToolCallDisplay, ToolResultDisplay};
pub use history::{HistoryStore, Summarizer};
pub use interrupt::{Interrupt, InterruptBus, InterruptSender};
pub use registry::Registry;
pub use todo::{Todo, TodoStatus};
pub use tool::{ErasedTool, Tool, ToolCallResult, ToolOutput};
pub use tools::{
    AgentRunner, BashTool, EditTool, GitDiffTool, GitStatusTool, GrepTool, ReadTool, SkillTool,
    SubagentTool, TaskMemoryEntry, TaskMemoryTool, TodoWriteTool, WriteTool,
};
pub use ui::{ApprovalRequest, Ui};
