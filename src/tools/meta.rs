//! 元工具：tool.list / tool.info
//!
//! 持有注册表的弱引用（注册表构建后再注册自引用工具，避免循环强引用）。

use std::sync::Weak;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::registry::ToolRegistry;
use crate::tools::Tool;

/// tool.list：列出已注册工具，可选带描述与 Schema
pub struct ToolListTool {
    registry: Weak<ToolRegistry>,
}

impl ToolListTool {
    pub fn new(registry: Weak<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ToolListTool {
    fn name(&self) -> &str {
        "tool.list"
    }

    fn description(&self) -> &str {
        "List the names of all registered tools."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "detailed": {"type": "boolean", "description": "Include descriptions and schemas"}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| "Registry gone".to_string())?;
        let detailed = args
            .get("detailed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if detailed {
            let infos = registry.describe();
            Ok(serde_json::json!({
                "tools": serde_json::to_value(infos).map_err(|e| e.to_string())?
            }))
        } else {
            Ok(serde_json::json!({ "tools": registry.names() }))
        }
    }
}

/// tool.info：查询单个工具的描述、用法与 Schema
pub struct ToolInfoTool {
    registry: Weak<ToolRegistry>,
}

impl ToolInfoTool {
    pub fn new(registry: Weak<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ToolInfoTool {
    fn name(&self) -> &str {
        "tool.info"
    }

    fn description(&self) -> &str {
        "Show description, instructions and schema for one tool."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Name of the tool to inspect"}
            },
            "required": ["tool_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| "Registry gone".to_string())?;
        let name = args.get("tool_name").and_then(|v| v.as_str()).unwrap_or("");
        let info = registry
            .info(name)
            .ok_or_else(|| format!("Unknown tool: {}", name))?;
        serde_json::to_value(info).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ToolsSection;
    use crate::tools::builtin_tools;

    #[tokio::test]
    async fn test_tool_list_returns_registered_names() {
        let registry = builtin_tools(&ToolsSection {
            filesystem_root: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
            ..ToolsSection::default()
        });
        let out = registry
            .call("tool.list", serde_json::json!({}))
            .await
            .unwrap();
        let names = out["tools"].as_array().unwrap();
        assert!(names.iter().any(|n| n == "tool.list"));
        assert!(names.iter().any(|n| n == "file.read"));

        let detailed = registry
            .call("tool.list", serde_json::json!({"detailed": true}))
            .await
            .unwrap();
        assert!(detailed["tools"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["name"] == "shell.run"));
    }

    #[tokio::test]
    async fn test_tool_info_fetches_single_tool() {
        let registry = builtin_tools(&ToolsSection {
            filesystem_root: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
            ..ToolsSection::default()
        });
        let info = registry
            .call("tool.info", serde_json::json!({"tool_name": "shell.run"}))
            .await
            .unwrap();
        assert_eq!(info["name"], "shell.run");
        assert!(info["description"]
            .as_str()
            .unwrap()
            .to_lowercase()
            .contains("command"));
    }
}
