//! 规范分发器：动作 -> 编排器调用
//!
//! 全部动作走同一条路径：记 last_action -> 角色裁剪 -> 处理 -> 错误写
//! last_error。能力动作（open/message/list/kill_monologue）由声明式允许
//! 清单裁剪，权限上下文来自调用 Actor 自己的 id，绝不从消息内容推断。

use std::sync::Arc;
use std::time::Duration;

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::core::actor::Monologue;
use crate::core::orchestrator::Orchestrator;
use crate::core::state::{ActorId, InjectionEvent, MessagePayload, RoleClass};
use crate::core::HiveError;
use crate::protocol::Action;

/// 工具结果进邮箱前的截断上限（字符）
const TOOL_RESULT_LIMIT: usize = 500;

/// 仅这四个标签做角色裁剪；sleep / ask_user 对所有角色开放
const CAPABILITY_TAGS: [&str; 4] = [
    "open_monologue",
    "message_monologue",
    "list_monologue",
    "kill_monologue",
];

/// 角色的能力允许清单（同时是 prompt 目录的内容来源）
pub fn allowed_capabilities(role: RoleClass) -> &'static [&'static str] {
    match role {
        RoleClass::Main => &[
            "open_monologue",
            "message_monologue",
            "list_monologue",
            "kill_monologue",
            "ask_user",
            "sleep",
        ],
        RoleClass::Sub => &["sleep", "message_monologue", "kill_monologue"],
        RoleClass::Comms => &[],
    }
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct OpenMonologueArgs {
    /// 子 Actor 的角色名
    role: String,
    /// 子 Actor 的目标
    goal: String,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct MessageMonologueArgs {
    to_id: String,
    content: String,
    request_id: Option<String>,
    /// true 时阻塞等待对方以 reply_to 回包
    wait_for_reply: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct ListMonologueArgs {}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct KillMonologueArgs {
    /// 缺省时目标为自己
    target_id: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct AskUserArgs {
    /// 关联 id，缺省时自动生成
    id: Option<String>,
    content: String,
    choices: Option<Vec<String>>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct SleepArgs {
    seconds: f64,
    /// 仅 main 角色可指定他人
    target_id: Option<String>,
}

fn capability_schema(tag: &str) -> Option<Value> {
    let schema = match tag {
        "open_monologue" => schema_for!(OpenMonologueArgs),
        "message_monologue" => schema_for!(MessageMonologueArgs),
        "list_monologue" => schema_for!(ListMonologueArgs),
        "kill_monologue" => schema_for!(KillMonologueArgs),
        "ask_user" => schema_for!(AskUserArgs),
        "sleep" => schema_for!(SleepArgs),
        _ => return None,
    };
    serde_json::to_value(schema).ok()
}

/// 角色专属的能力目录（进入 prompt 的 available_actions）
pub fn describe_capabilities(role: RoleClass) -> String {
    let entries: Vec<Value> = allowed_capabilities(role)
        .iter()
        .map(|tag| {
            serde_json::json!({
                "type": tag,
                "params": capability_schema(tag).unwrap_or(Value::Null),
            })
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// 分发一批动作：逐条簿记、裁剪、处理；单条失败不影响后续
pub async fn dispatch(orch: &Arc<Orchestrator>, actor: &Arc<Monologue>, actions: Vec<Action>) {
    for action in actions {
        let tag = action.tag();
        actor.note_action(tag);
        actor.record(format!("action:{}", tag));
        if let Err(e) = dispatch_one(orch, actor, action).await {
            tracing::warn!(actor = %actor.id, action = tag, error = %e, "action failed");
            actor.record_error(&e.to_string());
        }
    }
}

async fn dispatch_one(
    orch: &Arc<Orchestrator>,
    actor: &Arc<Monologue>,
    action: Action,
) -> Result<(), HiveError> {
    let tag = action.tag();
    let role = orch.role_of(&actor.id);
    if CAPABILITY_TAGS.contains(&tag) && !allowed_capabilities(role).contains(&tag) {
        return Err(HiveError::NotPermitted(tag.to_string()));
    }

    match action {
        Action::Inject { content } => {
            orch.inject(InjectionEvent::new(actor.id.clone(), content));
        }
        Action::Spawn { role, goal } | Action::OpenMonologue { role, goal } => {
            let child = orch.request_spawn(&role, &goal, &actor.id).await;
            actor.add_child(child.id.clone());
            actor.push_mail(format!("[spawned] id:{} role:{}", child.id, role));
        }
        Action::StopSelf => {
            actor.soft_stop();
        }
        Action::StopChild { id } => {
            let id = ActorId::from(id);
            orch.stop_child(&id);
            actor.remove_child(&id);
        }
        Action::Sleep { seconds, target_id } => {
            if seconds <= 0.0 {
                return Ok(());
            }
            let duration = parse_seconds(seconds)?;
            let target = match (role, target_id) {
                (RoleClass::Main, Some(id)) => {
                    let id = ActorId::from(id);
                    if orch.get(&id).is_none() {
                        return Err(HiveError::UnknownActor(id.to_string()));
                    }
                    id
                }
                _ => actor.id.clone(),
            };
            let woke = orch.sleep_with_early_wake(&target, duration).await;
            if woke {
                actor.record("wake:early");
            }
        }
        Action::Idle { seconds } => {
            if seconds <= 0.0 {
                return Ok(());
            }
            let duration = parse_seconds(seconds)?;
            let cancel = orch.cancel_token();
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(duration) => {}
            }
        }
        Action::Tool { name, args } => {
            actor.bump_tool_calls();
            match orch.tools().call(&name, args).await {
                Ok(value) => {
                    let rendered = truncate_chars(&value.to_string(), TOOL_RESULT_LIMIT);
                    actor.push_mail(format!("[tool:{}] {}", name, rendered));
                }
                Err(e) => {
                    actor.push_mail(format!("[tool:{}] error: {}", name, e));
                    return Err(HiveError::Tool(e.to_string()));
                }
            }
        }
        Action::ReportStatus => {
            let state = actor.state();
            let status = serde_json::json!({
                "id": state.id,
                "role": state.role,
                "step": state.step,
                "children": actor.children(),
            });
            actor.push_mail(format!("[status] {}", status));
        }
        Action::RouteMessage {
            to,
            content,
            request_id,
            reply_to,
        } => {
            let payload = MessagePayload {
                from_id: actor.id.to_string(),
                request_id,
                reply_to,
                content,
            };
            orch.route_incoming(&ActorId::from(to), payload)?;
        }
        Action::AskUser {
            id,
            content,
            choices,
        } => {
            let cid = id.unwrap_or_else(|| new_correlation_id("ask"));
            let reply = orch.ask_user(&cid, &content, &choices).await?;
            actor.push_mail(format!("[reply cid:{}] {}", cid, reply.content));
        }
        Action::UserReply {
            in_reply_to,
            content,
        } => {
            orch.on_user_message(&content, Some(&in_reply_to));
        }
        Action::MessageMonologue {
            to_id,
            content,
            request_id,
            wait_for_reply,
        } => {
            let rid = request_id.unwrap_or_else(|| new_correlation_id("req"));
            let rx = wait_for_reply.then(|| orch.register_reply(&rid));
            let payload = MessagePayload {
                from_id: actor.id.to_string(),
                request_id: Some(rid.clone()),
                reply_to: None,
                content,
            };
            orch.route_incoming(&ActorId::from(to_id), payload)?;
            if let Some(rx) = rx {
                let reply = orch.wait_on(rx).await?;
                actor.push_mail(format!("[reply req:{}] {}", rid, reply.content));
            }
        }
        Action::ListMonologue => {
            let roster = serde_json::to_string(&orch.list_actors())
                .map_err(|e| HiveError::JsonParse(e.to_string()))?;
            actor.push_mail(format!("[monologues] {}", roster));
        }
        Action::KillMonologue { target_id } => {
            let target = target_id.map(ActorId::from);
            let outcome = orch.kill_with_policy(&actor.id, target.as_ref());
            let line = serde_json::to_string(&outcome)
                .map_err(|e| HiveError::JsonParse(e.to_string()))?;
            actor.push_mail(format!("[kill] {}", line));
        }
    }
    Ok(())
}

/// 模型给出的秒数转 Duration；溢出 / NaN 是上报的字段错误，不是 panic
fn parse_seconds(seconds: f64) -> Result<Duration, HiveError> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| HiveError::JsonParse(format!("invalid seconds {}: {}", seconds, e)))
}

fn new_correlation_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..8])
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let head: String = s.chars().take(limit).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuntimeSection, ToolsSection};
    use crate::llm::MockClient;
    use crate::tools::builtin_tools;

    async fn quiet_orch() -> (Arc<Orchestrator>, ActorId) {
        let tools = builtin_tools(&ToolsSection {
            filesystem_root: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
            ..ToolsSection::default()
        });
        let cfg = RuntimeSection {
            cycle_delay_ms: 60_000,
            ..RuntimeSection::default()
        };
        let orch = Arc::new(Orchestrator::new(Arc::new(MockClient::new()), tools, cfg));
        let main_id = orch.start("coordinate", true).await;
        (orch, main_id)
    }

    #[tokio::test]
    async fn test_dispatch_records_action_and_error() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        dispatch(
            &orch,
            &main,
            vec![Action::RouteMessage {
                to: "ghost".into(),
                content: "hi".into(),
                request_id: None,
                reply_to: None,
            }],
        )
        .await;

        let state = main.state();
        assert_eq!(state.last_action, "route_message");
        assert!(state.last_error.contains("Unknown actor"));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_tool_result_truncated_in_mailbox() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        let long = "x".repeat(2000);
        dispatch(
            &orch,
            &main,
            vec![Action::Tool {
                name: "echo".into(),
                args: serde_json::json!({"text": long}),
            }],
        )
        .await;

        let mail = main.drain_mail();
        let line = mail.iter().find(|l| l.starts_with("[tool:echo]")).unwrap();
        assert!(line.ends_with("..."));
        // 前缀 + 500 字符 + 省略号
        assert!(line.chars().count() < 600);
        assert_eq!(main.state().tool_calls, 1);

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_tool_failure_sets_last_error() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        dispatch(
            &orch,
            &main,
            vec![Action::Tool {
                name: "no.such.tool".into(),
                args: serde_json::json!({}),
            }],
        )
        .await;

        assert!(main.state().last_error.contains("Unknown tool"));
        let mail = main.drain_mail();
        assert!(mail.iter().any(|l| l.contains("error:")));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_report_status_line() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        dispatch(&orch, &main, vec![Action::ReportStatus]).await;

        let mail = main.drain_mail();
        let line = mail.iter().find(|l| l.starts_with("[status]")).unwrap();
        assert!(line.contains(main_id.as_str()));
        assert!(line.contains("\"step\""));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_role_gating_sub_cannot_open_monologue() {
        let (orch, main_id) = quiet_orch().await;
        let sub = orch.request_spawn("Worker", "g", &main_id).await;
        let before = orch.list_actors().len();

        dispatch(
            &orch,
            &sub,
            vec![Action::OpenMonologue {
                role: "Rogue".into(),
                goal: "escape".into(),
            }],
        )
        .await;

        assert!(sub.state().last_error.contains("Not permitted"));
        assert_eq!(orch.list_actors().len(), before);

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_main_open_monologue_tracks_child() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        dispatch(
            &orch,
            &main,
            vec![Action::OpenMonologue {
                role: "Scout".into(),
                goal: "look around".into(),
            }],
        )
        .await;

        assert_eq!(main.children().len(), 1);
        let child_id = main.children()[0].clone();
        assert_eq!(
            orch.get(&child_id).unwrap().state().parent_id,
            Some(main_id)
        );
        assert!(main
            .drain_mail()
            .iter()
            .any(|l| l.starts_with("[spawned]")));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_ask_user_blocking_round_trip() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        let task = {
            let orch = orch.clone();
            let main = main.clone();
            tokio::spawn(async move {
                dispatch(
                    &orch,
                    &main,
                    vec![Action::AskUser {
                        id: Some("c1".into()),
                        content: "Continue?".into(),
                        choices: vec!["yes".into(), "no".into()],
                    }],
                )
                .await;
            })
        };
        tokio::task::yield_now().await;

        orch.on_user_message("yes", Some("c1"));
        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .unwrap()
            .unwrap();

        let mail = main.drain_mail();
        assert!(mail.iter().any(|l| l == "[reply cid:c1] yes"));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_message_monologue_wait_for_reply() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();
        let sub = orch.request_spawn("Worker", "answer", &main_id).await;

        let task = {
            let orch = orch.clone();
            let main = main.clone();
            let to = sub.id.to_string();
            tokio::spawn(async move {
                dispatch(
                    &orch,
                    &main,
                    vec![Action::MessageMonologue {
                        to_id: to,
                        content: "status?".into(),
                        request_id: Some("r9".into()),
                        wait_for_reply: true,
                    }],
                )
                .await;
            })
        };
        tokio::task::yield_now().await;

        // 子 Actor 收到带 req 前缀的请求行
        let sub_mail = sub.drain_mail();
        assert!(sub_mail
            .iter()
            .any(|l| l.contains("req:r9") && l.contains("status?")));

        // 回包解析主 Actor 的等待
        orch.route_incoming(
            &main_id,
            MessagePayload {
                from_id: sub.id.to_string(),
                request_id: None,
                reply_to: Some("r9".into()),
                content: "all good".into(),
            },
        )
        .unwrap();
        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .unwrap()
            .unwrap();

        let mail = main.drain_mail();
        assert!(mail.iter().any(|l| l == "[reply req:r9] all good"));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_huge_seconds_reported_not_fatal() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        let start = std::time::Instant::now();
        dispatch(
            &orch,
            &main,
            vec![Action::Sleep {
                seconds: 1e300,
                target_id: None,
            }],
        )
        .await;
        assert!(main.state().last_error.contains("seconds"));

        dispatch(&orch, &main, vec![Action::Idle { seconds: f64::INFINITY }]).await;
        assert!(main.state().last_error.contains("seconds"));
        assert!(start.elapsed() < Duration::from_millis(500));

        // 后续动作照常执行，循环未被打断
        dispatch(&orch, &main, vec![Action::ReportStatus]).await;
        assert!(main
            .drain_mail()
            .iter()
            .any(|l| l.starts_with("[status]")));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_sleep_nonpositive_is_skipped() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();

        let start = std::time::Instant::now();
        dispatch(
            &orch,
            &main,
            vec![Action::Sleep {
                seconds: 0.0,
                target_id: None,
            }],
        )
        .await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(main.state().last_error.is_empty());

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_list_monologue_writes_roster() {
        let (orch, main_id) = quiet_orch().await;
        let main = orch.get(&main_id).unwrap();
        orch.request_spawn("Worker", "g", &main_id).await;

        dispatch(&orch, &main, vec![Action::ListMonologue]).await;

        let mail = main.drain_mail();
        let line = mail
            .iter()
            .find(|l| l.starts_with("[monologues]"))
            .unwrap();
        assert!(line.contains("Worker"));
        assert!(line.contains(main_id.as_str()));

        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_kill_monologue_denied_outcome_line() {
        let (orch, main_id) = quiet_orch().await;
        let sub1 = orch.request_spawn("A", "g", &main_id).await;
        let sub2 = orch.request_spawn("B", "g", &main_id).await;

        dispatch(
            &orch,
            &sub1,
            vec![Action::KillMonologue {
                target_id: Some(sub2.id.to_string()),
            }],
        )
        .await;

        let mail = sub1.drain_mail();
        let line = mail.iter().find(|l| l.starts_with("[kill]")).unwrap();
        assert!(line.contains("sub may only kill self"));
        assert!(sub2.running());

        orch.shutdown().await;
    }

    #[test]
    fn test_capability_catalogue_varies_by_role() {
        let main_caps = describe_capabilities(RoleClass::Main);
        assert!(main_caps.contains("open_monologue"));
        assert!(main_caps.contains("ask_user"));

        let sub_caps = describe_capabilities(RoleClass::Sub);
        assert!(!sub_caps.contains("open_monologue"));
        assert!(sub_caps.contains("message_monologue"));

        assert_eq!(describe_capabilities(RoleClass::Comms), "[]");
    }
}
