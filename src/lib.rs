//! Hive - 受监管的 Monologue Actor 群体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器、Actor、状态、唤醒信号与请求/回复关联
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: tracing 初始化
//! - **protocol**: 动作协议（解析 + 规范分发器）
//! - **tools**: 工具注册表与内建工具

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod protocol;
pub mod tools;

pub use crate::core::{Orchestrator, RegistrySnapshot};
