use std::path::{Path, PathBuf};

use forge_llm::{Describe, Property, Schema};
use regex::Regex;
use serde::Deserialize;

use crate::approval::ApprovalClass;
use crate::event::{DisplayBody, ToolCallDisplay, ToolResultDisplay};
use crate::tool::{Tool, ToolOutput};

const DEFAULT_MAX_RESULTS: usize = 100;
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".venv"];

#[derive(Clone, Deserialize)]
pub struct GrepInput {
    /// Regex pattern to search for.
    pub pattern: String,
    /// File or directory to search, relative to the working directory.
    pub path: String,
    /// Glob restricting which file names are searched within a directory.
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_file_pattern() -> String {
    "*".to_string()
}

fn default_case_sensitive() -> bool {
    true
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

impl Describe for GrepInput {
    fn describe() -> Schema {
        Schema::Object {
            description: None,
            properties: vec![
                Property {
                    name: "pattern".into(),
                    schema: Schema::String {
                        description: Some("Regex pattern to search for".into()),
                        enumeration: None,
                    },
                },
                Property {
                    name: "path".into(),
                    schema: Schema::String {
                        description: Some(
                            "File or directory to search, relative to the working directory"
                                .into(),
                        ),
                        enumeration: None,
                    },
                },
                Property {
                    name: "file_pattern".into(),
                    schema: Schema::String {
                        description: Some(
                            "Glob restricting which file names are searched (default \"*\")"
                                .into(),
                        ),
                        enumeration: None,
                    },
                },
                Property {
                    name: "case_sensitive".into(),
                    schema: Schema::String {
                        description: Some("Whether the match is case sensitive (default true)".into()),
                        enumeration: Some(vec!["true".into(), "false".into()]),
                    },
                },
                Property {
                    name: "max_results".into(),
                    schema: Schema::String {
                        description: Some("Maximum number of matching lines to return".into()),
                        enumeration: None,
                    },
                },
            ],
            required: vec!["pattern".into(), "path".into()],
        }
    }
}

struct Hit {
    file: PathBuf,
    line_number: usize,
    line: String,
}

/// Structured output from a grep search.
pub struct GrepOutput {
    hits: Vec<Hit>,
    truncated: bool,
}

impl ToolOutput for GrepOutput {
    fn to_llm(&self) -> String {
        if self.hits.is_empty() {
            return "No matches found.".to_string();
        }

        let mut out = String::new();
        let mut current_file: Option<&Path> = None;
        for hit in &self.hits {
            if current_file != Some(hit.file.as_path()) {
                if current_file.is_some() {
                    out.push('\n');
                }
                out.push_str(&format!("{}:\n", hit.file.display()));
                current_file = Some(hit.file.as_path());
            }
            out.push_str(&format!("  {}: {}\n", hit.line_number, hit.line));
        }
        if self.truncated {
            out.push_str("\n(results truncated)\n");
        }
        out
    }
}

/// Tool that searches file contents for a regex pattern, recursing into
/// directories and grouping results by file.
#[derive(Clone)]
pub struct GrepTool {
    pub(crate) cwd: PathBuf,
}

impl GrepTool {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }
}

impl Tool for GrepTool {
    type Input = GrepInput;
    type Output = GrepOutput;

    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a regex pattern. Searches a single file or recurses into a directory, grouping matches by file."
    }

    async fn call(&self, input: GrepInput) -> Result<GrepOutput, forge_llm::Error> {
        let regex = build_regex(&input.pattern, input.case_sensitive)
            .map_err(|e| forge_llm::Error::Other(format!("invalid pattern: {e}")))?;
        let root = self.cwd.join(&input.path);
        let max_results = if input.max_results == 0 {
            DEFAULT_MAX_RESULTS
        } else {
            input.max_results
        };

        let mut files = Vec::new();
        collect_files(&root, &input.file_pattern, &mut files)
            .map_err(|e| forge_llm::Error::Other(format!("{}: {e}", root.display())))?;
        files.sort();

        let mut hits = Vec::new();
        let mut truncated = false;
        'files: for file in &files {
            let Ok(content) = tokio::fs::read_to_string(file).await else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    if hits.len() >= max_results {
                        truncated = true;
                        break 'files;
                    }
                    hits.push(Hit {
                        file: file.strip_prefix(&self.cwd).unwrap_or(file).to_path_buf(),
                        line_number: i + 1,
                        line: line.to_string(),
                    });
                }
            }
        }

        Ok(GrepOutput { hits, truncated })
    }

    fn render_input(&self, input: &GrepInput) -> ToolCallDisplay {
        ToolCallDisplay {
            title: format!("Grep `{}` in {}", input.pattern, input.path),
            body: None,
        }
    }

    fn render_output(&self, _input: &GrepInput, output: &GrepOutput) -> ToolResultDisplay {
        ToolResultDisplay {
            title: format!("{} matches", output.hits.len()),
            body: Some(DisplayBody::Text(output.to_llm())),
        }
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    fn approval_class(&self) -> ApprovalClass {
        ApprovalClass::Never
    }
}

fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    if case_sensitive {
        Regex::new(pattern)
    } else {
        regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
    }
}

fn collect_files(root: &Path, file_pattern: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let metadata = std::fs::metadata(root)?;
    if metadata.is_file() {
        out.push(root.to_path_buf());
        return Ok(());
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if path.is_dir() {
                if !SKIPPED_DIRS.contains(&name.as_str()) {
                    stack.push(path);
                }
                continue;
            }

            if glob_match(file_pattern, &name) {
                out.push(path);
            }
        }
    }
    Ok(())
}

/// Minimal shell-glob matcher supporting `*` and `?`, sufficient for
/// restricting a search to e.g. `*.rs`.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn do_match(pattern: &[u8], name: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                do_match(&pattern[1..], name) || (!name.is_empty() && do_match(pattern, &name[1..]))
            }
            (Some(b'?'), Some(_)) => do_match(&pattern[1..], &name[1..]),
            (Some(p), Some(n)) if p == n => do_match(&pattern[1..], &name[1..]),
            _ => false,
        }
    }
    do_match(pattern.as_bytes(), name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_simple_extension_wildcard() {
        assert!(glob_match("*.rs", "main.rs"));
        assert!(!glob_match("*.rs", "main.py"));
        assert!(glob_match("*", "anything"));
    }

    #[tokio::test]
    async fn grep_groups_hits_by_file_and_reports_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\nworld\nhello again\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "nothing here\n").unwrap();

        let tool = GrepTool {
            cwd: dir.path().to_path_buf(),
        };
        let out = tool
            .call(GrepInput {
                pattern: "hello".into(),
                path: ".".into(),
                file_pattern: "*".into(),
                case_sensitive: true,
                max_results: 100,
            })
            .await
            .unwrap();

        assert_eq!(out.hits.len(), 2);
        assert_eq!(out.hits[0].line_number, 1);
        assert_eq!(out.hits[1].line_number, 3);
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn grep_truncates_at_max_results() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x\nx\nx\nx\n").unwrap();

        let tool = GrepTool {
            cwd: dir.path().to_path_buf(),
        };
        let out = tool
            .call(GrepInput {
                pattern: "x".into(),
                path: ".".into(),
                file_pattern: "*".into(),
                case_sensitive: true,
                max_results: 2,
            })
            .await
            .unwrap();

        assert_eq!(out.hits.len(), 2);
        assert!(out.truncated);
    }
}
