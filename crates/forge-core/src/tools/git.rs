use std::path::PathBuf;

use forge_llm::{Describe, Property, Schema};
use serde::Deserialize;
use tokio::process::Command;

use crate::approval::ApprovalClass;
use crate::event::{DisplayBody, ToolCallDisplay, ToolResultDisplay};
use crate::tool::{Tool, ToolOutput};

#[derive(Clone, Deserialize)]
pub struct GitStatusInput {
    /// Repository path, relative to the working directory. Defaults to `.`.
    #[serde(default)]
    pub repository_path: Option<String>,
}

impl Describe for GitStatusInput {
    fn describe() -> Schema {
        Schema::Object {
            description: None,
            properties: vec![Property {
                name: "repository_path".into(),
                schema: Schema::String {
                    description: Some(
                        "Repository path, relative to the working directory. Defaults to the working directory itself.".into(),
                    ),
                    enumeration: None,
                },
            }],
            required: vec![],
        }
    }
}

/// Plain-text output of `git status`.
pub struct GitStatusOutput(pub String);

impl ToolOutput for GitStatusOutput {
    fn to_llm(&self) -> String {
        self.0.clone()
    }
}

/// Tool that reports the working tree status of a git repository.
#[derive(Clone)]
pub struct GitStatusTool {
    pub(crate) cwd: PathBuf,
}

impl GitStatusTool {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }
}

impl Tool for GitStatusTool {
    type Input = GitStatusInput;
    type Output = GitStatusOutput;

    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show the working tree status of a git repository (porcelain `git status`)."
    }

    async fn call(&self, input: GitStatusInput) -> Result<GitStatusOutput, forge_llm::Error> {
        let dir = repo_dir(&self.cwd, input.repository_path.as_deref());
        let output = run_git(&dir, &["status"]).await?;
        Ok(GitStatusOutput(output))
    }

    fn render_input(&self, input: &GitStatusInput) -> ToolCallDisplay {
        ToolCallDisplay {
            title: format!(
                "git status ({})",
                input.repository_path.as_deref().unwrap_or(".")
            ),
            body: None,
        }
    }

    fn render_output(&self, _input: &GitStatusInput, output: &GitStatusOutput) -> ToolResultDisplay {
        ToolResultDisplay {
            title: "git status".to_string(),
            body: Some(DisplayBody::Text(output.0.clone())),
        }
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    fn approval_class(&self) -> ApprovalClass {
        ApprovalClass::Never
    }
}

#[derive(Clone, Deserialize)]
pub struct GitDiffInput {
    /// Repository path, relative to the working directory. Defaults to `.`.
    #[serde(default)]
    pub repository_path: Option<String>,
    /// Restrict the diff to a single file, relative to the repository.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Show the staged (`--cached`) diff instead of the working tree diff.
    #[serde(default)]
    pub staged: bool,
}

impl Describe for GitDiffInput {
    fn describe() -> Schema {
        Schema::Object {
            description: None,
            properties: vec![
                Property {
                    name: "repository_path".into(),
                    schema: Schema::String {
                        description: Some(
                            "Repository path, relative to the working directory. Defaults to the working directory itself.".into(),
                        ),
                        enumeration: None,
                    },
                },
                Property {
                    name: "file_path".into(),
                    schema: Schema::String {
                        description: Some(
                            "Restrict the diff to a single file, relative to the repository".into(),
                        ),
                        enumeration: None,
                    },
                },
                Property {
                    name: "staged".into(),
                    schema: Schema::String {
                        description: Some("Show the staged diff instead of the working tree diff".into()),
                        enumeration: Some(vec!["true".into(), "false".into()]),
                    },
                },
            ],
            required: vec![],
        }
    }
}

/// Plain-text output of `git diff`.
pub struct GitDiffOutput(pub String);

impl ToolOutput for GitDiffOutput {
    fn to_llm(&self) -> String {
        if self.0.trim().is_empty() {
            "(no differences)".to_string()
        } else {
            self.0.clone()
        }
    }
}

/// Tool that shows the diff for a git repository, optionally scoped to one
/// file and/or the staged index.
#[derive(Clone)]
pub struct GitDiffTool {
    pub(crate) cwd: PathBuf,
}

impl GitDiffTool {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }
}

impl Tool for GitDiffTool {
    type Input = GitDiffInput;
    type Output = GitDiffOutput;

    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show the diff for a git repository, optionally restricted to one file and/or the staged index."
    }

    async fn call(&self, input: GitDiffInput) -> Result<GitDiffOutput, forge_llm::Error> {
        let dir = repo_dir(&self.cwd, input.repository_path.as_deref());

        let mut args = vec!["diff"];
        if input.staged {
            args.push("--cached");
        }
        if let Some(file) = input.file_path.as_deref() {
            args.push("--");
            args.push(file);
        }

        let output = run_git(&dir, &args).await?;
        Ok(GitDiffOutput(output))
    }

    fn render_input(&self, input: &GitDiffInput) -> ToolCallDisplay {
        let scope = input.file_path.as_deref().unwrap_or("all files");
        ToolCallDisplay {
            title: format!(
                "git diff {} ({})",
                if input.staged { "--staged" } else { "" },
                scope
            )
            .replace("  ", " "),
            body: None,
        }
    }

    fn render_output(&self, _input: &GitDiffInput, output: &GitDiffOutput) -> ToolResultDisplay {
        ToolResultDisplay {
            title: "git diff".to_string(),
            body: Some(DisplayBody::Code {
                language: Some("diff".to_string()),
                content: output.to_llm(),
            }),
        }
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    fn approval_class(&self) -> ApprovalClass {
        ApprovalClass::Never
    }
}

fn repo_dir(cwd: &std::path::Path, repository_path: Option<&str>) -> PathBuf {
    match repository_path {
        Some(p) => cwd.join(p),
        None => cwd.to_path_buf(),
    }
}

async fn run_git(dir: &std::path::Path, args: &[&str]) -> Result<String, forge_llm::Error> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| forge_llm::Error::Other(format!("failed to spawn git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(forge_llm::Error::Other(format!(
            "git {}: {stderr}",
            args.join(" ")
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]).await.unwrap();
        run_git(dir.path(), &["config", "user.email", "test@example.com"])
            .await
            .unwrap();
        run_git(dir.path(), &["config", "user.name", "Test"])
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn git_status_reports_untracked_file() {
        let dir = init_repo().await;
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();

        let tool = GitStatusTool {
            cwd: dir.path().to_path_buf(),
        };
        let out = tool
            .call(GitStatusInput {
                repository_path: None,
            })
            .await
            .unwrap();
        assert!(out.0.contains("a.txt"));
    }

    #[tokio::test]
    async fn git_diff_is_empty_before_any_changes() {
        let dir = init_repo().await;
        let tool = GitDiffTool {
            cwd: dir.path().to_path_buf(),
        };
        let out = tool
            .call(GitDiffInput {
                repository_path: None,
                file_path: None,
                staged: false,
            })
            .await
            .unwrap();
        assert_eq!(out.to_llm(), "(no differences)");
    }

    #[tokio::test]
    async fn git_diff_shows_changes_after_modification() {
        let dir = init_repo().await;
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        run_git(dir.path(), &["add", "a.txt"]).await.unwrap();
        run_git(dir.path(), &["commit", "-m", "init"]).await.unwrap();
        std::fs::write(dir.path().join("a.txt"), "two\n").unwrap();

        let tool = GitDiffTool {
            cwd: dir.path().to_path_buf(),
        };
        let out = tool
            .call(GitDiffInput {
                repository_path: None,
                file_path: Some("a.txt".into()),
                staged: false,
            })
            .await
            .unwrap();
        assert!(out.0.contains("-one"));
        assert!(out.0.contains("+two"));
    }
}
