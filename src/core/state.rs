//! 状态定义：Actor 状态、快照投影、注入事件与路由载荷
//!
//! MonologueState 由各自的 Monologue 独占持有；外部观察者（看板等）只拿到
//! ActorSummary / RegistrySnapshot 这样的轻量投影。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor 标识：进程生命周期内唯一，分配后不变、不复用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// 生成新 id（v4 uuid 截取前 8 位十六进制）
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string()[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 权限角色：由编排器根据 id 推导（Main / Comms / 其余均为 Sub）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleClass {
    Main,
    Comms,
    Sub,
}

impl RoleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleClass::Main => "main",
            RoleClass::Comms => "comms",
            RoleClass::Sub => "sub",
        }
    }
}

/// 单个 Monologue 的身份与状态快照
#[derive(Debug, Clone, Serialize)]
pub struct MonologueState {
    pub id: ActorId,
    /// 自由文本角色名，如 "Main"、"Comms"、"Researcher"
    pub role: String,
    pub goal: String,
    /// 父 Actor 的弱引用（仅回溯，不表示所有权）
    pub parent_id: Option<ActorId>,
    pub step: u64,
    pub running: bool,
    pub created: DateTime<Utc>,
    pub last_action: String,
    pub last_error: String,
    pub tool_calls: u64,
    /// 循环退出时间，供注册表 GC 判断宽限期
    pub stopped_at: Option<DateTime<Utc>>,
}

impl MonologueState {
    pub fn new(id: ActorId, role: &str, goal: &str, parent_id: Option<ActorId>) -> Self {
        Self {
            id,
            role: role.to_string(),
            goal: goal.to_string(),
            parent_id,
            step: 0,
            running: true,
            created: Utc::now(),
            last_action: String::new(),
            last_error: String::new(),
            tool_calls: 0,
            stopped_at: None,
        }
    }
}

/// 外部观察者看到的单 Actor 投影（含邮箱深度）
#[derive(Debug, Clone, Serialize)]
pub struct ActorSummary {
    pub id: ActorId,
    pub role: String,
    pub step: u64,
    pub running: bool,
    pub inbox_size: usize,
    pub tool_calls: u64,
    pub last_action: String,
    pub last_error: String,
    pub parent_id: Option<ActorId>,
}

/// snapshot() 的返回：全体 Actor 投影加 Main / Comms 指针
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub actors: Vec<ActorSummary>,
    pub main: Option<ActorId>,
    pub comms: Option<ActorId>,
}

/// 注入事件：一次入队、一次投递到外部 sink，队内 FIFO
#[derive(Debug, Clone, Serialize)]
pub struct InjectionEvent {
    pub from_id: ActorId,
    pub content: String,
    pub ts: DateTime<Utc>,
}

impl InjectionEvent {
    pub fn new(from_id: ActorId, content: impl Into<String>) -> Self {
        Self {
            from_id,
            content: content.into(),
            ts: Utc::now(),
        }
    }
}

/// Actor 间路由的消息载荷；reply_to 命中待决关联 id 时恰好解析一次
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagePayload {
    /// 发送方 id；用户回复时为 "user"
    pub from_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub content: String,
}

impl MessagePayload {
    /// 邮箱内的可读行：带 req / reply_to 前缀便于模型理解来源
    pub fn readable_line(&self) -> String {
        if let Some(rid) = &self.request_id {
            format!("[from:{} req:{}] {}", self.from_id, rid, self.content)
        } else if let Some(rid) = &self.reply_to {
            format!("[from:{} reply_to:{}] {}", self.from_id, rid, self.content)
        } else {
            self.content.clone()
        }
    }
}

/// kill 策略的结构化结果：权限拒绝是普通返回值，不是异常
#[derive(Debug, Clone, Serialize)]
pub struct KillOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killed: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KillOutcome {
    pub fn killed(id: ActorId) -> Self {
        Self {
            ok: true,
            killed: Some(id),
            error: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            killed: None,
            error: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_generate_unique() {
        let a = ActorId::generate();
        let b = ActorId::generate();
        assert_eq!(a.as_str().len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_readable_line_prefixes() {
        let req = MessagePayload {
            from_id: "abc".into(),
            request_id: Some("r1".into()),
            reply_to: None,
            content: "hello".into(),
        };
        assert_eq!(req.readable_line(), "[from:abc req:r1] hello");

        let reply = MessagePayload {
            from_id: "abc".into(),
            request_id: None,
            reply_to: Some("r1".into()),
            content: "done".into(),
        };
        assert_eq!(reply.readable_line(), "[from:abc reply_to:r1] done");

        let plain = MessagePayload {
            from_id: "abc".into(),
            request_id: None,
            reply_to: None,
            content: "hi".into(),
        };
        assert_eq!(plain.readable_line(), "hi");
    }
}
