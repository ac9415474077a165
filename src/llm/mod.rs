//! LLM 层：补全客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockClient;
pub use openai::{OpenAiCompatClient, TokenUsage};
pub use traits::CompletionClient;
