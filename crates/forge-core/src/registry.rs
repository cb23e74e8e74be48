//! §4.7 Registry: name → schema → handler lookup, deterministic schema
//! ordering.

use forge_llm::ToolDefinition;
use std::collections::HashMap;

use crate::tool::{ErasedTool, Tool};

/// Holds registered tools and answers name-based lookups. Read-mostly after
/// construction; built once at agent startup.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, Box<dyn ErasedTool>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool) -> &mut Self {
        let name = tool.name().to_string();
        self.tools.insert(name, Box::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn ErasedTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool schemas in deterministic (name-sorted) order. Calling this twice
    /// returns an identical sequence, which is what keeps the serialized
    /// request's tool catalog byte-identical across turns for prompt-prefix
    /// caching (§8 property 3).
    pub fn tool_catalog(&self) -> Vec<ToolDefinition> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.tools[name].definition())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ToolCallDisplay, ToolResultDisplay};
    use forge_llm::{Describe, Schema};
    use serde::Deserialize;

    #[derive(Clone, Deserialize)]
    struct NoopInput;

    impl Describe for NoopInput {
        fn describe() -> Schema {
            Schema::Object {
                description: None,
                properties: vec![],
                required: vec![],
            }
        }
    }

    #[derive(Clone)]
    struct NoopTool(&'static str);

    impl Tool for NoopTool {
        type Input = NoopInput;
        type Output = String;

        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "noop"
        }
        async fn call(&self, _input: NoopInput) -> Result<String, forge_llm::Error> {
            Ok(String::new())
        }
        fn render_input(&self, _input: &NoopInput) -> ToolCallDisplay {
            ToolCallDisplay { title: self.0.to_string(), body: None }
        }
        fn render_output(&self, _input: &NoopInput, _output: &String) -> ToolResultDisplay {
            ToolResultDisplay { title: String::new(), body: None }
        }
    }

    #[test]
    fn catalog_is_sorted_by_name_and_deterministic() {
        let mut registry = Registry::new();
        registry.register(NoopTool("zeta"));
        registry.register(NoopTool("alpha"));
        registry.register(NoopTool("mid"));

        let first = registry.tool_catalog();
        let second = registry.tool_catalog();
        let names: Vec<&str> = first.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        let names2: Vec<&str> = second.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, names2);
    }
}
