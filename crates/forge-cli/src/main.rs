mod stores;
mod terminal_ui;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use forge_core::{
    Agent, AgentRunner, BashTool, EditTool, GitDiffTool, GitStatusTool, GrepTool, ReadTool,
    Registry, SkillTool, SubagentTool, TaskMemoryTool, TodoWriteTool, WriteTool,
};
use forge_llm_openai::OpenAIConfig;

use stores::Persistence;
use terminal_ui::TerminalUi;

const SYSTEM_PROMPT: &str = "You are a focused coding agent. Use the available tools to read, search, and edit files, run commands, and track progress with the todo list. Prefer small, verifiable steps.";

#[derive(Parser)]
#[command(name = "forge")]
struct Cli {
    /// Directory the agent operates in. Defaults to the current directory.
    #[arg(long)]
    root: Option<std::path::PathBuf>,
}

/// Resolves the cyclic `Agent -> Registry -> SubagentTool -> AgentRunner ->
/// Agent` construction order: the tool is registered before the owning
/// agent exists, and the shared resources it needs are filled in once that
/// agent is actually built.
struct DeferredRunner(OnceLock<forge_core::SharedAgentResources>);

impl AgentRunner for DeferredRunner {
    fn run_task<'a>(
        &'a self,
        system_prompt: String,
        user_input: String,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move {
            let Some(resources) = self.0.get() else {
                return "[subagent unavailable: agent not yet initialized]".to_string();
            };
            let (mut sibling, _handles) = resources.clone().into_agent(system_prompt.clone());
            sibling.run_task(system_prompt, user_input).await
        })
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let panic_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen);
        panic_hook(info);
    }));

    let cli = Cli::parse();

    let config = forge_core::Config::from_env();
    if let Err(err) = config.validate() {
        eprintln!("forge: {err}");
        return std::process::ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("forge: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: forge_core::Config) -> anyhow::Result<()> {
    let root = match cli.root {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    let persistence = Persistence::load(&root);
    let mut task_memory_on_disk: std::collections::HashSet<String> = persistence
        .task_memory
        .lock()
        .iter()
        .map(|e| e.id.clone())
        .collect();

    let model = forge_llm_openai::provider(OpenAIConfig {
        auth_token: config.api_key.clone(),
        base_url: config.model_endpoint.clone(),
        extra_headers: HashMap::new(),
    })
    .model(&config.model_name);

    let runner = Arc::new(DeferredRunner(OnceLock::new()));

    let mut registry = Registry::new();
    registry
        .register(ReadTool::new(root.clone()))
        .register(WriteTool::new(root.clone()))
        .register(EditTool::new(root.clone()))
        .register(BashTool::new(root.clone()))
        .register(GrepTool::new(root.clone()))
        .register(GitStatusTool::new(root.clone()))
        .register(GitDiffTool::new(root.clone()))
        .register(TodoWriteTool::new(persistence.todos.clone()))
        .register(TaskMemoryTool::new(persistence.task_memory.clone()))
        .register(SkillTool::new(root.join(".agents").join("skills")))
        .register(SubagentTool::new(runner.clone() as Arc<dyn AgentRunner>));

    let terminal_ui = Arc::new(TerminalUi::new());
    let ui: Arc<dyn forge_core::Ui> = terminal_ui.clone();

    let (mut agent, handles) = Agent::new(config, model, registry, ui, SYSTEM_PROMPT);
    let _ = runner.0.set(agent.shared_resources());
    terminal_ui.set_interrupts(handles.interrupt_sender);

    let driver = tokio::spawn(terminal_ui::drive(terminal_ui.clone()));

    agent.run_interactive().await;

    terminal_ui.request_quit();
    let _ = driver.await;

    persistence.flush(&mut task_memory_on_disk);
    Ok(())
}
