//! 运行时错误类型
//!
//! 动作分发与工具调用中的失败都收敛到 HiveError，由分发器写入 Actor 的
//! last_error；除 shutdown 外没有任何错误会终止进程。

use thiserror::Error;

/// 编排运行过程中可能出现的错误（模型、解析、工具、路由、权限等）
#[derive(Error, Debug)]
pub enum HiveError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Unknown actor: {0}")]
    UnknownActor(String),

    /// 角色不具备某个能力动作（记录为 last_error，循环继续）
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("Config error: {0}")]
    Config(String),

    /// 等待在 shutdown 时被取消
    #[error("Cancelled")]
    Cancelled,
}
