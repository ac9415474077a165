//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / instructions / parameters_schema / execute），
//! 注册时拒绝空名与重名并预编译参数 Schema；call 先校验参数再在超时内执行，
//! 校验失败是上报的错误而不是崩溃。每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonschema::JSONSchema;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

/// 工具层错误：注册冲突、未知名、参数校验、执行失败与超时
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool name must be non-empty")]
    EmptyName,

    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("Invalid schema for {0}: {1}")]
    InvalidSchema(String, String),

    #[error("Validation failed for {0}: {1}")]
    Validation(String, String),

    #[error("Tool {0} failed: {1}")]
    Failed(String, String),

    #[error("Tool {0} timed out after {1}s")]
    Timeout(String, u64),
}

/// 工具 trait：名称、描述与用法（供 LLM 理解）、参数 JSON Schema、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于动作中的 "name" 字段），全局唯一
    fn name(&self) -> &str;

    /// 一句话描述（进入 prompt 的工具目录）
    fn description(&self) -> &str;

    /// 详细用法说明，默认空
    fn instructions(&self) -> &str {
        ""
    }

    /// 参数 JSON Schema；默认空对象表示无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；结果为结构化 JSON 值
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// describe() 的单项：进入 prompt 的工具目录条目
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub schema: Value,
}

struct Entry {
    tool: Arc<dyn Tool>,
    validator: JSONSchema,
}

/// 工具注册表：按名称存储工具与预编译校验器；内部可变以便注册表自引用的
/// 元工具（tool.list / tool.info）在构建后注册
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    timeout_secs: u64,
}

impl ToolRegistry {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            timeout_secs,
        }
    }

    /// 注册工具：空名与重名被拒绝；参数 Schema 在此预编译
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(ToolError::EmptyName);
        }
        let schema = tool.parameters_schema();
        let validator = JSONSchema::compile(&schema)
            .map_err(|e| ToolError::InvalidSchema(name.clone(), e.to_string()))?;

        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        entries.insert(name, Entry { tool, validator });
        Ok(())
    }

    /// 注册但静默跳过重名（显式注册列表的语义）
    pub fn register_quiet(&self, tool: Arc<dyn Tool>) {
        match self.register(tool) {
            Ok(()) | Err(ToolError::AlreadyRegistered(_)) => {}
            Err(e) => tracing::warn!(error = %e, "tool registration failed"),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 排序后的工具目录，供 prompt 构建与 tool.list
    pub fn describe(&self) -> Vec<ToolInfo> {
        let entries = self.entries.read();
        let mut infos: Vec<ToolInfo> = entries
            .values()
            .map(|e| ToolInfo {
                name: e.tool.name().to_string(),
                description: e.tool.description().to_string(),
                instructions: e.tool.instructions().to_string(),
                schema: e.tool.parameters_schema(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn info(&self, name: &str) -> Option<ToolInfo> {
        let entries = self.entries.read();
        entries.get(name).map(|e| ToolInfo {
            name: e.tool.name().to_string(),
            description: e.tool.description().to_string(),
            instructions: e.tool.instructions().to_string(),
            schema: e.tool.parameters_schema(),
        })
    }

    /// 校验参数并在超时内执行；输出 JSON 审计日志
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let (tool, validation) = {
            let entries = self.entries.read();
            let entry = entries
                .get(name)
                .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
            let validation = entry.validator.validate(&args).err().map(|errors| {
                errors
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            });
            (entry.tool.clone(), validation)
        };
        if let Some(msg) = validation {
            return Err(ToolError::Validation(name.to_string(), msg));
        }

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            tool.execute(args),
        )
        .await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ToolError::Failed(name.to_string(), e)),
            Err(_) => Err(ToolError::Timeout(name.to_string(), self.timeout_secs)),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
