//! §4.5 ApprovalPolicy: a table keyed by tool name, answering
//! `requires_approval(tool, args)` and holding "always allow" memory.

use parking_lot::Mutex;
use std::collections::HashSet;

use crate::config::Config;

/// The user's answer to an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAnswer {
    Yes,
    No,
    Always,
}

/// Tool classes with a fixed default approval requirement, independent of
/// any per-call `need_user_approve` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalClass {
    /// Always requires approval unless the exact command string (for shell)
    /// or the tool itself (for others) was marked "always allow".
    AlwaysUnlessRemembered,
    /// Requires approval unless the operator's config opts writes out.
    WriteUnlessConfigOptOut,
    /// Never requires approval from the table (read-only tools).
    Never,
}

/// Per-tool-name "always allow" memory (§3 `ApprovalRecord`).
struct Memory {
    /// Tools marked always-allow in full (non-shell tools).
    always_allow_tools: HashSet<String>,
    /// Exact shell command strings previously blessed.
    always_allow_commands: HashSet<String>,
}

/// Consulted by the [`ToolDispatcher`](crate::dispatcher::ToolDispatcher)
/// before executing any tool call.
pub struct ApprovalPolicy {
    auto_approve: bool,
    auto_approve_writes: bool,
    memory: Mutex<Memory>,
}

impl ApprovalPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            auto_approve: config.auto_approve,
            auto_approve_writes: config.auto_approve_writes,
            memory: Mutex::new(Memory {
                always_allow_tools: HashSet::new(),
                always_allow_commands: HashSet::new(),
            }),
        }
    }

    /// Whether `tool_name` called with `arguments` (raw JSON string) needs a
    /// user prompt before executing.
    ///
    /// `need_user_approve` is the model-set schema override: it may only
    /// *add* a requirement, never remove one the table already demands.
    pub fn requires_approval(
        &self,
        tool_name: &str,
        class: ApprovalClass,
        command: Option<&str>,
        need_user_approve: bool,
        tool_always_requires_approval: bool,
    ) -> bool {
        if self.auto_approve {
            return false;
        }

        if tool_always_requires_approval || need_user_approve {
            // The model/tool may demand approval even for classes that
            // otherwise wouldn't require it, but memoized always-allow still
            // short-circuits a shell command the user has already blessed.
            if let Some(cmd) = command {
                if self.memory.lock().always_allow_commands.contains(cmd) {
                    return false;
                }
            }
            return true;
        }

        match class {
            ApprovalClass::Never => false,
            ApprovalClass::WriteUnlessConfigOptOut => {
                if self.auto_approve_writes {
                    return false;
                }
                !self.memory.lock().always_allow_tools.contains(tool_name)
            }
            ApprovalClass::AlwaysUnlessRemembered => {
                if let Some(cmd) = command {
                    !self.memory.lock().always_allow_commands.contains(cmd)
                } else {
                    !self.memory.lock().always_allow_tools.contains(tool_name)
                }
            }
        }
    }

    /// Record the user's `always` answer.
    pub fn remember_always(&self, tool_name: &str, command: Option<&str>) {
        let mut memory = self.memory.lock();
        match command {
            Some(cmd) => {
                memory.always_allow_commands.insert(cmd.to_string());
            }
            None => {
                memory.always_allow_tools.insert(tool_name.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ApprovalPolicy {
        ApprovalPolicy::new(&Config::default())
    }

    #[test]
    fn shell_requires_approval_by_default() {
        let p = policy();
        assert!(p.requires_approval(
            "bash",
            ApprovalClass::AlwaysUnlessRemembered,
            Some("ls -la"),
            false,
            false
        ));
    }

    #[test]
    fn always_allow_memoizes_exact_command_only() {
        let p = policy();
        p.remember_always("bash", Some("ls -la"));
        assert!(!p.requires_approval(
            "bash",
            ApprovalClass::AlwaysUnlessRemembered,
            Some("ls -la"),
            false,
            false
        ));
        assert!(p.requires_approval(
            "bash",
            ApprovalClass::AlwaysUnlessRemembered,
            Some("rm -rf /tmp/x"),
            false,
            false
        ));
    }

    #[test]
    fn read_only_never_requires_approval() {
        let p = policy();
        assert!(!p.requires_approval("read", ApprovalClass::Never, None, false, false));
    }

    #[test]
    fn model_override_forces_approval_even_for_read_only() {
        let p = policy();
        assert!(p.requires_approval("read", ApprovalClass::Never, None, true, false));
    }

    #[test]
    fn write_respects_auto_approve_writes_config() {
        let mut config = Config::default();
        config.auto_approve_writes = true;
        let p = ApprovalPolicy::new(&config);
        assert!(!p.requires_approval(
            "write",
            ApprovalClass::WriteUnlessConfigOptOut,
            None,
            false,
            false
        ));
    }

    #[test]
    fn global_auto_approve_skips_everything() {
        let mut config = Config::default();
        config.auto_approve = true;
        let p = ApprovalPolicy::new(&config);
        assert!(!p.requires_approval(
            "bash",
            ApprovalClass::AlwaysUnlessRemembered,
            Some("rm -rf /"),
            true,
            true
        ));
    }
}
