//! Mock 补全客户端（用于测试，无需 API）
//!
//! 依次弹出预置脚本；脚本耗尽后返回默认的空动作列表，让 Actor 循环安全空转。

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::core::HiveError;
use crate::llm::CompletionClient;

/// 脚本化客户端：complete 依次返回 with_responses 传入的文本
#[derive(Default)]
pub struct MockClient {
    script: Mutex<VecDeque<String>>,
    /// 记录收到的 prompt，便于断言提示词内容
    prompts: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    async fn complete(
        &self,
        prompt: &str,
        _system: &str,
        _max_tokens: u32,
    ) -> Result<String, HiveError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| r#"{"actions": []}"#.to_string()))
    }
}
