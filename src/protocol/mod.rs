//! 动作协议：模型输出 -> 有界的原语动作集合
//!
//! actions 定义带标签的动作联合与宽容的 JSON 提取；dispatch 是唯一的规范分发器，
//! 角色裁剪通过声明式允许清单表达。

pub mod actions;
pub mod dispatch;

pub use actions::{extract_json, parse_actions, parse_model_output, Action};
pub use dispatch::{allowed_capabilities, describe_capabilities, dispatch};

/// 注入给每个模型驱动 Actor 的控制协议 system prompt
pub const CONTROL_SYSTEM: &str = r#"You are an internal monologue actor.
Output ONLY JSON with this schema, no prose:

{
  "actions": [
    {"type":"inject","content":"<short message to main>"},
    {"type":"spawn","role":"<role name>","goal":"<goal for child>"},
    {"type":"stop_self"},
    {"type":"stop_child","id":"<child_id>"},
    {"type":"sleep","seconds":<number>,"target_id":"<optional, main only>"},
    {"type":"idle","seconds":<number>},
    {"type":"tool","name":"<tool name>","args":{}},
    {"type":"report_status"},
    {"type":"route_message","to":"<actor_id>","content":"...","reply_to":"<optional request id>"},
    {"type":"ask_user","id":"q1","content":"...","choices":["y","n"]},
    {"type":"user_reply","in_reply_to":"q1","content":"..."},
    {"type":"open_monologue","role":"<role>","goal":"<goal>"},
    {"type":"message_monologue","to_id":"<actor_id>","content":"...","wait_for_reply":true},
    {"type":"list_monologue"},
    {"type":"kill_monologue","target_id":"<optional id>"}
  ]
}

Rules:
- JSON only. No thoughts, no prose.
- Keep 'inject' concise.
- Prefer: read/plan -> confirm -> act.
- If idle, emit a short sleep/idle.
"#;
