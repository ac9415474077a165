//! Monologue Actor：邮箱、活动环、运行循环
//!
//! 每个 Actor 一个 tokio 任务。循环体：让出间隔 -> 构建 prompt ->
//! 请求补全 -> 解析动作 -> 分发 -> 步数 +1 -> 让出间隔；
//! 非模型驱动的 Actor（Comms）只做邮箱转发。解析失败降级为一秒 idle。
//! 退出时（正常、步数耗尽或取消）非常驻 Actor 一律落为 running=false。

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::core::orchestrator::Orchestrator;
use crate::core::state::{ActorId, ActorSummary, InjectionEvent, MonologueState};
use crate::protocol::{self, dispatch, parse_model_output, CONTROL_SYSTEM};

/// 活动环容量：超过后丢弃最旧条目
const ACTIVITY_CAP: usize = 50;
/// 进入 prompt 的最近活动条数
const RECENT_ACTIVITY: usize = 10;

/// 单个运行参与者：独占持有自己的状态、邮箱与活动环
pub struct Monologue {
    pub id: ActorId,
    /// Main / Comms 为 true：不受步数预算约束，注册表中永不回收
    pub immortal: bool,
    /// false 时为纯转发 Actor（Comms）
    pub model_driven: bool,
    state: RwLock<MonologueState>,
    mailbox: Mutex<VecDeque<String>>,
    activity: Mutex<VecDeque<String>>,
    children: Mutex<HashSet<ActorId>>,
}

impl Monologue {
    pub fn new(state: MonologueState, immortal: bool, model_driven: bool) -> Self {
        Self {
            id: state.id.clone(),
            immortal,
            model_driven,
            state: RwLock::new(state),
            mailbox: Mutex::new(VecDeque::new()),
            activity: Mutex::new(VecDeque::new()),
            children: Mutex::new(HashSet::new()),
        }
    }

    /// 状态快照（克隆）
    pub fn state(&self) -> MonologueState {
        self.state.read().clone()
    }

    pub fn running(&self) -> bool {
        self.state.read().running
    }

    /// 软停：置 running=false，循环在下一个边界自行退出
    pub fn soft_stop(&self) {
        let mut state = self.state.write();
        state.running = false;
        if state.stopped_at.is_none() {
            state.stopped_at = Some(Utc::now());
        }
    }

    pub fn step(&self) -> u64 {
        self.state.read().step
    }

    fn bump_step(&self) {
        self.state.write().step += 1;
    }

    pub fn bump_tool_calls(&self) {
        self.state.write().tool_calls += 1;
    }

    /// 分发前的簿记：记录 last_action 并清空 last_error
    pub fn note_action(&self, tag: &str) {
        let mut state = self.state.write();
        state.last_action = tag.to_string();
        state.last_error.clear();
    }

    /// 处理器抛错：写入 last_error 并进活动环，循环继续
    pub fn record_error(&self, message: &str) {
        self.state.write().last_error = message.to_string();
        self.record(format!("error:{}", message));
    }

    pub fn push_mail(&self, line: impl Into<String>) {
        self.mailbox.lock().push_back(line.into());
    }

    /// 非阻塞排空邮箱（FIFO）
    pub fn drain_mail(&self) -> Vec<String> {
        self.mailbox.lock().drain(..).collect()
    }

    pub fn mailbox_len(&self) -> usize {
        self.mailbox.lock().len()
    }

    /// 记录一条活动；环满时丢最旧
    pub fn record(&self, entry: impl Into<String>) {
        let mut activity = self.activity.lock();
        if activity.len() >= ACTIVITY_CAP {
            activity.pop_front();
        }
        activity.push_back(entry.into());
    }

    pub fn recent_activity(&self, n: usize) -> Vec<String> {
        let activity = self.activity.lock();
        activity.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn add_child(&self, id: ActorId) {
        self.children.lock().insert(id);
    }

    pub fn remove_child(&self, id: &ActorId) {
        self.children.lock().remove(id);
    }

    pub fn children(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.children.lock().iter().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// 外部观察者投影（含邮箱深度）
    pub fn summary(&self) -> ActorSummary {
        let state = self.state.read();
        ActorSummary {
            id: state.id.clone(),
            role: state.role.clone(),
            step: state.step,
            running: state.running,
            inbox_size: self.mailbox.lock().len(),
            tool_calls: state.tool_calls,
            last_action: state.last_action.clone(),
            last_error: state.last_error.clone(),
            parent_id: state.parent_id.clone(),
        }
    }

    fn build_prompt(&self, orch: &Orchestrator) -> String {
        let state = self.state();
        let recent = self.recent_activity(RECENT_ACTIVITY).join("\n");
        let inbox = self.drain_mail().join("\n");
        let tools = serde_json::to_string_pretty(&orch.tools().describe()).unwrap_or_default();
        let role_class = orch.role_of(&self.id);
        let capabilities = protocol::describe_capabilities(role_class);
        format!(
            "[HIVE]\n\
             id={} role={} STEP:{}\n\
             goal: {}\n\
             recent_context:\n{}\n\
             inbox:\n{}\n\
             available_tools:\n{}\n\
             available_actions:\n{}\n",
            state.id, state.role, state.step, state.goal, recent, inbox, tools, capabilities
        )
    }

    /// 运行循环；每个挂起点都与取消令牌竞速。
    /// spawn 动作经编排器重新进入 run，显式装箱切断递归的 future 类型。
    pub fn run(self: Arc<Self>, orch: Arc<Orchestrator>) -> BoxFuture<'static, ()> {
        async move {
            let cancel = orch.cancel_token();
            let cycle = orch.cycle_delay();
            let budget = orch.step_budget();

            while self.running() && (self.immortal || self.step() < budget) {
                if pause(&cancel, cycle).await {
                    break;
                }
                if self.model_driven {
                    self.model_step(&orch, &cancel).await;
                } else {
                    self.forward_step(&orch);
                }
                self.bump_step();
                if pause(&cancel, cycle).await {
                    break;
                }
            }

            if !self.immortal {
                self.soft_stop();
            }
            tracing::debug!(actor = %self.id, "actor loop exited");
        }
        .boxed()
    }

    /// 模型驱动的一步：补全 -> 解析 -> 分发
    async fn model_step(self: &Arc<Self>, orch: &Arc<Orchestrator>, cancel: &CancellationToken) {
        let prompt = self.build_prompt(orch);
        let raw = tokio::select! {
            _ = cancel.cancelled() => return,
            r = orch.llm().complete(&prompt, CONTROL_SYSTEM, orch.max_tokens()) => r,
        };
        let actions = match raw {
            Ok(text) => parse_model_output(&text),
            Err(e) => {
                // 供应商故障：记入 last_error，下一步再试
                self.record_error(&e.to_string());
                return;
            }
        };
        dispatch(orch, self, actions).await;
    }

    /// 转发 Actor（Comms）的一步：排空邮箱，把每条消息作为注入事件送往 Main
    fn forward_step(&self, orch: &Orchestrator) {
        for message in self.drain_mail() {
            self.record(format!("forward:{}", message));
            orch.inject(InjectionEvent::new(
                self.id.clone(),
                format!("[user] {}", message),
            ));
        }
    }
}

/// 让出间隔；返回 true 表示已取消
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
