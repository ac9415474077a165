//! 动作定义与解析
//!
//! Action 是覆盖全部原语的带标签联合，只能由校验原始结构化输出产生（测试除外）。
//! extract_json 宽容地从散文包裹的文本中提取 JSON；完全失败时上游合成一个
//! 一秒 idle 动作，解析错误绝不向上传播。

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_worker_role() -> String {
    "Worker".to_string()
}

fn default_worker_goal() -> String {
    "Do the next useful thing.".to_string()
}

fn default_true() -> bool {
    true
}

/// 原语动作：serde 按 "type" 标签解析；未知标签在 parse_actions 中被静默跳过
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// 向 Main 的外部 sink 注入一条消息
    Inject { content: String },
    /// 生成一个非常驻子 Actor，记入调用者的 children
    Spawn { role: String, goal: String },
    StopSelf,
    StopChild {
        id: String,
    },
    /// 可被来信提前唤醒的休眠；target_id 仅 main 角色可指定他人
    Sleep {
        seconds: f64,
        #[serde(default)]
        target_id: Option<String>,
    },
    /// 普通定时停顿，不可被消息打断
    Idle { seconds: f64 },
    /// 委托给工具注册表；序列化结果截断到 500 字符后回写自身邮箱
    Tool {
        name: String,
        #[serde(default)]
        args: Value,
    },
    ReportStatus,
    /// fire-and-forget 路由；带 reply_to 时可解析对方的待决请求
    RouteMessage {
        to: String,
        content: String,
        #[serde(default)]
        request_id: Option<String>,
        #[serde(default)]
        reply_to: Option<String>,
    },
    /// 向人类提问并阻塞等待回复（缺 id 时生成关联 id）
    AskUser {
        #[serde(default, alias = "correlation_id")]
        id: Option<String>,
        #[serde(alias = "question")]
        content: String,
        #[serde(default)]
        choices: Vec<String>,
    },
    /// 解析一个待决提问（人工或 Comms 侧代发）
    UserReply {
        in_reply_to: String,
        content: String,
    },
    /// 能力动作：代调用者生成子 Actor
    OpenMonologue {
        #[serde(default = "default_worker_role")]
        role: String,
        #[serde(default = "default_worker_goal")]
        goal: String,
    },
    /// 能力动作：给另一个 Actor 发消息，可选阻塞等回复
    MessageMonologue {
        to_id: String,
        content: String,
        #[serde(default)]
        request_id: Option<String>,
        #[serde(default = "default_true")]
        wait_for_reply: bool,
    },
    /// 能力动作：把名册写入自身邮箱
    ListMonologue,
    /// 能力动作：按 kill 策略终止目标
    KillMonologue {
        #[serde(default)]
        target_id: Option<String>,
    },
}

impl Action {
    /// 动作标签，用于 last_action 与活动日志
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Inject { .. } => "inject",
            Action::Spawn { .. } => "spawn",
            Action::StopSelf => "stop_self",
            Action::StopChild { .. } => "stop_child",
            Action::Sleep { .. } => "sleep",
            Action::Idle { .. } => "idle",
            Action::Tool { .. } => "tool",
            Action::ReportStatus => "report_status",
            Action::RouteMessage { .. } => "route_message",
            Action::AskUser { .. } => "ask_user",
            Action::UserReply { .. } => "user_reply",
            Action::OpenMonologue { .. } => "open_monologue",
            Action::MessageMonologue { .. } => "message_monologue",
            Action::ListMonologue => "list_monologue",
            Action::KillMonologue { .. } => "kill_monologue",
        }
    }
}

/// 从原始文本中提取 JSON 对象：先整体解析，失败则取首个 '{' 到末个 '}' 的子串
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// 校验动作列表：未知标签与字段校验失败都被跳过（记录 debug 日志），不报错
pub fn parse_actions(values: &[Value]) -> Vec<Action> {
    values
        .iter()
        .filter_map(|v| match serde_json::from_value::<Action>(v.clone()) {
            Ok(action) => Some(action),
            Err(e) => {
                tracing::debug!(error = %e, raw = %v, "skipping unrecognized action");
                None
            }
        })
        .collect()
}

/// 模型原始输出 -> 动作列表；JSON 完全不可提取时降级为一秒 idle
pub fn parse_model_output(raw: &str) -> Vec<Action> {
    let Some(value) = extract_json(raw) else {
        return vec![Action::Idle { seconds: 1.0 }];
    };
    let actions = value
        .get("actions")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    parse_actions(&actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_canonical_shape() {
        let raw = serde_json::json!([
            {"type":"inject","content":"hi"},
            {"type":"spawn","role":"R","goal":"G"},
            {"type":"stop_self"},
            {"type":"stop_child","id":"c1"},
            {"type":"sleep","seconds":2},
            {"type":"idle","seconds":1},
            {"type":"tool","name":"echo","args":{"text":"x"}},
            {"type":"report_status"},
            {"type":"route_message","to":"a1","content":"msg"},
            {"type":"ask_user","id":"q1","content":"?","choices":["y","n"]},
            {"type":"user_reply","in_reply_to":"q1","content":"y"},
            {"type":"open_monologue","role":"W","goal":"g"},
            {"type":"message_monologue","to_id":"a2","content":"m"},
            {"type":"list_monologue"},
            {"type":"kill_monologue","target_id":"a3"}
        ]);
        let actions = parse_actions(raw.as_array().unwrap());
        assert_eq!(actions.len(), 15);
        assert_eq!(actions[0], Action::Inject { content: "hi".into() });
        assert_eq!(actions[4].tag(), "sleep");
        assert!(matches!(
            &actions[12],
            Action::MessageMonologue { wait_for_reply: true, .. }
        ));
    }

    #[test]
    fn test_unknown_tag_skipped_not_error() {
        let raw = serde_json::json!([
            {"type":"warp_drive","factor":9},
            {"type":"idle","seconds":1}
        ]);
        let actions = parse_actions(raw.as_array().unwrap());
        assert_eq!(actions, vec![Action::Idle { seconds: 1.0 }]);
    }

    #[test]
    fn test_ask_user_field_aliases() {
        let raw = serde_json::json!([
            {"type":"ask_user","correlation_id":"c1","question":"Q?","choices":[]}
        ]);
        let actions = parse_actions(raw.as_array().unwrap());
        assert_eq!(
            actions,
            vec![Action::AskUser {
                id: Some("c1".into()),
                content: "Q?".into(),
                choices: vec![],
            }]
        );
    }

    #[test]
    fn test_extract_json_prose_wrapped() {
        let raw = "Sure! Here is the plan:\n{\"actions\": [{\"type\":\"idle\",\"seconds\":1}]}\nDone.";
        let actions = parse_model_output(raw);
        assert_eq!(actions, vec![Action::Idle { seconds: 1.0 }]);
    }

    #[test]
    fn test_garbage_degrades_to_idle() {
        let actions = parse_model_output("no json here at all");
        assert_eq!(actions, vec![Action::Idle { seconds: 1.0 }]);
    }

    #[test]
    fn test_missing_actions_key_yields_empty() {
        let actions = parse_model_output("{\"thoughts\": \"hmm\"}");
        assert!(actions.is_empty());
    }
}
