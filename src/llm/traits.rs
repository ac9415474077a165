//! 补全客户端抽象
//!
//! 核心只依赖这个边界：给定 prompt / system / max_tokens 返回文本。
//! 返回内容期望是 `{"actions": [...]}` JSON，但允许被散文包裹；
//! 格式错误由调用方在单个 Actor 步内消化，绝不向上传播。

use async_trait::async_trait;

use crate::core::HiveError;

/// 补全客户端 trait：所有后端（OpenAI 兼容 / Mock）实现它
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system: &str,
        max_tokens: u32,
    ) -> Result<String, HiveError>;
}
