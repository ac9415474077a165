//! 编排器：Actor 注册表、路由、关联与策略
//!
//! 唯一的外部入口。持有注册表（id -> Monologue）、注入 sink、唤醒信号与
//! 请求/回复关联表；在多线程 tokio 上运行，共享结构由短临界区锁保护，
//! 权限上下文一律通过显式的 caller 参数传递。
//! 已终止的非常驻 Actor 超过宽限期后从注册表回收；常驻（Main/Comms）永不回收。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeSection;
use crate::core::actor::Monologue;
use crate::core::signals::{ReplyRouter, WakeSignals};
use crate::core::state::{
    ActorId, ActorSummary, InjectionEvent, KillOutcome, MessagePayload, MonologueState,
    RegistrySnapshot, RoleClass,
};
use crate::core::HiveError;
use crate::llm::CompletionClient;
use crate::tools::ToolRegistry;

/// 注入事件回调：外部 sink（看板 / 终端打印）每事件收到一次
pub type InjectionHook =
    Box<dyn Fn(InjectionEvent, ActorSummary) -> BoxFuture<'static, ()> + Send + Sync>;
/// 提问回调：(correlation_id, question, choices)
pub type QuestionHook =
    Box<dyn Fn(String, String, Vec<String>) -> BoxFuture<'static, ()> + Send + Sync>;

/// 编排器：组合注册表、路由、关联、策略与生命周期
pub struct Orchestrator {
    llm: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    cfg: RuntimeSection,
    actors: RwLock<HashMap<ActorId, Arc<Monologue>>>,
    main_id: RwLock<Option<ActorId>>,
    comms_id: RwLock<Option<ActorId>>,
    injection_tx: mpsc::UnboundedSender<InjectionEvent>,
    injection_rx: Mutex<Option<mpsc::UnboundedReceiver<InjectionEvent>>>,
    wake: WakeSignals,
    replies: ReplyRouter,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
    cancel: CancellationToken,
    stopping: AtomicBool,
    injection_hook: Option<InjectionHook>,
    question_hook: Option<QuestionHook>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        tools: Arc<ToolRegistry>,
        cfg: RuntimeSection,
    ) -> Self {
        let (injection_tx, injection_rx) = mpsc::unbounded_channel();
        Self {
            llm,
            tools,
            cfg,
            actors: RwLock::new(HashMap::new()),
            main_id: RwLock::new(None),
            comms_id: RwLock::new(None),
            injection_tx,
            injection_rx: Mutex::new(Some(injection_rx)),
            wake: WakeSignals::new(),
            replies: ReplyRouter::new(),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
            cancel: CancellationToken::new(),
            stopping: AtomicBool::new(false),
            injection_hook: None,
            question_hook: None,
        }
    }

    pub fn with_injection_hook(mut self, hook: InjectionHook) -> Self {
        self.injection_hook = Some(hook);
        self
    }

    pub fn with_question_hook(mut self, hook: QuestionHook) -> Self {
        self.question_hook = Some(hook);
        self
    }

    pub fn llm(&self) -> &Arc<dyn CompletionClient> {
        &self.llm
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cycle_delay(&self) -> Duration {
        self.cfg.cycle_delay()
    }

    pub fn step_budget(&self) -> u64 {
        self.cfg.step_budget
    }

    pub fn max_tokens(&self) -> u32 {
        self.cfg.max_tokens
    }

    pub fn main_id(&self) -> Option<ActorId> {
        self.main_id.read().clone()
    }

    pub fn comms_id(&self) -> Option<ActorId> {
        self.comms_id.read().clone()
    }

    pub fn get(&self, id: &ActorId) -> Option<Arc<Monologue>> {
        self.actors.read().get(id).cloned()
    }

    fn main_actor(&self) -> Option<Arc<Monologue>> {
        self.main_id().and_then(|id| self.get(&id))
    }

    fn comms_actor(&self) -> Option<Arc<Monologue>> {
        self.comms_id().and_then(|id| self.get(&id))
    }

    /// 权限角色：Main / Comms 按 id 判定，其余一律 Sub
    pub fn role_of(&self, id: &ActorId) -> RoleClass {
        if self.main_id.read().as_ref() == Some(id) {
            RoleClass::Main
        } else if self.comms_id.read().as_ref() == Some(id) {
            RoleClass::Comms
        } else {
            RoleClass::Sub
        }
    }

    /// 启动：创建常驻 Main（可选 Comms）并开始其循环与注入泵。
    /// 未经 shutdown 再次调用会产生重复 Actor——调用方错误。
    pub async fn start(self: &Arc<Self>, main_goal: &str, with_comms: bool) -> ActorId {
        let main = self.create_actor("Main", main_goal, None, true, true);
        *self.main_id.write() = Some(main.id.clone());

        let comms = if with_comms && self.cfg.comms_enabled {
            let role = self.cfg.comms_role.clone();
            let goal = self.cfg.comms_goal.clone();
            let comms = self.create_actor(&role, &goal, None, true, false);
            *self.comms_id.write() = Some(comms.id.clone());
            Some(comms)
        } else {
            None
        };

        self.spawn_sink_pump().await;
        self.launch(main.clone()).await;
        if let Some(comms) = comms {
            self.launch(comms).await;
        }
        tracing::info!(main = %main.id, "orchestrator started");
        main.id.clone()
    }

    /// 关停：标记全部 Actor 非运行，让循环观察到标志，再取消并等待所有任务。
    /// 幂等：后续调用为 no-op。
    pub async fn shutdown(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        let actors: Vec<Arc<Monologue>> = self.actors.read().values().cloned().collect();
        for actor in actors {
            actor.soft_stop();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.cancel.cancel();
        self.tasks.lock().await.shutdown().await;
        tracing::info!("orchestrator shut down");
    }

    /// 创建非常驻 Actor 并开始其循环；超出人口上限时先软停最旧者
    pub async fn request_spawn(
        self: &Arc<Self>,
        role: &str,
        goal: &str,
        parent: &ActorId,
    ) -> Arc<Monologue> {
        let actor = self.create_actor(role, goal, Some(parent.clone()), false, true);
        self.launch(actor.clone()).await;
        tracing::info!(actor = %actor.id, role = %role, parent = %parent, "spawned sub");
        actor
    }

    fn create_actor(
        &self,
        role: &str,
        goal: &str,
        parent_id: Option<ActorId>,
        immortal: bool,
        model_driven: bool,
    ) -> Arc<Monologue> {
        if !immortal {
            self.prune_expired();
            self.evict_if_full();
        }
        let id = loop {
            let id = ActorId::generate();
            if !self.actors.read().contains_key(&id) {
                break id;
            }
        };
        let state = MonologueState::new(id.clone(), role, goal, parent_id);
        let actor = Arc::new(Monologue::new(state, immortal, model_driven));
        self.actors.write().insert(id, actor.clone());
        actor
    }

    async fn launch(self: &Arc<Self>, actor: Arc<Monologue>) {
        self.tasks.lock().await.spawn(actor.run(self.clone()));
    }

    /// 人口上限：达到上限时恰好软停一个最旧（按创建时间）的非常驻 Actor
    fn evict_if_full(&self) {
        let victim = {
            let actors = self.actors.read();
            let subs: Vec<&Arc<Monologue>> =
                actors.values().filter(|a| !a.immortal).collect();
            if subs.len() < self.cfg.max_actors {
                return;
            }
            subs.into_iter()
                .min_by_key(|a| a.state().created)
                .cloned()
        };
        if let Some(victim) = victim {
            tracing::info!(actor = %victim.id, "population cap reached, soft-stopping oldest");
            victim.soft_stop();
        }
    }

    /// 注册表 GC：回收超过宽限期的已终止非常驻条目
    fn prune_expired(&self) {
        let grace = self.cfg.gc_grace();
        let expired: Vec<ActorId> = {
            let actors = self.actors.read();
            actors
                .values()
                .filter(|a| !a.immortal && !a.running())
                .filter(|a| {
                    a.state().stopped_at.is_some_and(|t| {
                        chrono::Utc::now()
                            .signed_duration_since(t)
                            .to_std()
                            .unwrap_or_default()
                            >= grace
                    })
                })
                .map(|a| a.id.clone())
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        let mut actors = self.actors.write();
        for id in &expired {
            actors.remove(id);
            self.wake.remove(id);
            tracing::debug!(actor = %id, "pruned terminated actor");
        }
    }

    /// 软停非常驻 Actor；常驻或未知 id 为 no-op
    pub fn stop_child(&self, id: &ActorId) {
        if let Some(actor) = self.get(id) {
            if !actor.immortal {
                actor.soft_stop();
            }
        }
    }

    /// 入队一个注入事件（FIFO，单队列）
    pub fn inject(&self, event: InjectionEvent) {
        let _ = self.injection_tx.send(event);
    }

    /// 外部人类输入送往 Comms（由其转发给 Main）
    pub fn send_to_comms(&self, text: &str) {
        if let Some(comms) = self.comms_actor() {
            comms.push_mail(text);
            self.wake.notify(&comms.id);
        }
    }

    /// 路由：reply_to 命中待决关联 id 时恰好解析一次；无论是否命中，
    /// 都向目标邮箱追加可读行并设置其唤醒信号
    pub fn route_incoming(
        &self,
        target: &ActorId,
        payload: MessagePayload,
    ) -> Result<(), HiveError> {
        if let Some(rid) = payload.reply_to.clone() {
            self.replies.resolve(&rid, payload.clone());
        }
        let actor = self
            .get(target)
            .ok_or_else(|| HiveError::UnknownActor(target.to_string()))?;
        actor.push_mail(payload.readable_line());
        self.wake.notify(target);
        Ok(())
    }

    /// 登记对某关联 id 的等待（发路由请求前调用，避免回复先于等待到达）
    pub fn register_reply(&self, request_id: &str) -> oneshot::Receiver<MessagePayload> {
        self.replies.register(request_id)
    }

    /// 等待已登记的回复；shutdown 时返回 Cancelled
    pub async fn wait_on(
        &self,
        rx: oneshot::Receiver<MessagePayload>,
    ) -> Result<MessagePayload, HiveError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(HiveError::Cancelled),
            res = rx => res.map_err(|_| HiveError::Cancelled),
        }
    }

    /// 阻塞直到 route_incoming 解析该 id（惰性登记）
    pub async fn await_reply(&self, request_id: &str) -> Result<MessagePayload, HiveError> {
        let rx = self.register_reply(request_id);
        self.wait_on(rx).await
    }

    /// 让超时与目标的唤醒信号竞速；被提前唤醒返回 true。
    /// 调用前到达的陈旧唤醒不会误触发。
    pub async fn sleep_with_early_wake(&self, target: &ActorId, duration: Duration) -> bool {
        self.wake
            .sleep_with_early_wake(target, duration, &self.cancel)
            .await
    }

    /// 设置目标的唤醒信号；幂等
    pub fn notify_actor_message(&self, target: &ActorId) {
        self.wake.notify(target);
    }

    /// kill 策略：sub 只能杀自己（缺省目标即自己）；任何人不得杀 Comms；
    /// 未知 id 是错误；其余软停目标（常驻目标的软停为 no-op）
    pub fn kill_with_policy(&self, caller: &ActorId, target: Option<&ActorId>) -> KillOutcome {
        let caller_role = self.role_of(caller);
        let target = target.cloned().unwrap_or_else(|| caller.clone());
        if caller_role == RoleClass::Sub && target != *caller {
            return KillOutcome::denied("sub may only kill self");
        }
        if self.comms_id.read().as_ref() == Some(&target) {
            return KillOutcome::denied("cannot kill Communication");
        }
        let Some(actor) = self.get(&target) else {
            return KillOutcome::denied("unknown id");
        };
        if !actor.immortal {
            actor.soft_stop();
        }
        KillOutcome::killed(target)
    }

    /// 向人类提出问题并阻塞等待回复（on_user_message 解析同一关联 id）
    pub async fn ask_user(
        &self,
        correlation_id: &str,
        question: &str,
        choices: &[String],
    ) -> Result<MessagePayload, HiveError> {
        let rx = self.register_reply(correlation_id);
        self.surface_question(correlation_id, question, choices).await;
        self.wait_on(rx).await
    }

    /// 把问题送到人类界面：调用提问回调，并在 Comms 邮箱镜像一条可读行
    pub async fn surface_question(
        &self,
        correlation_id: &str,
        question: &str,
        choices: &[String],
    ) {
        if let Some(hook) = &self.question_hook {
            hook(
                correlation_id.to_string(),
                question.to_string(),
                choices.to_vec(),
            )
            .await;
        }
        if let Some(comms) = self.comms_actor() {
            comms.push_mail(format!(
                "[ASK cid:{}] {} choices={:?}",
                correlation_id, question, choices
            ));
            self.wake.notify(&comms.id);
        }
    }

    /// 用户输入：命中待决提问则消费之并给 Main 留审计行；否则原文追加到
    /// Main 邮箱并设置其唤醒信号
    pub fn on_user_message(&self, text: &str, correlation_id: Option<&str>) {
        if let Some(cid) = correlation_id {
            let payload = MessagePayload {
                from_id: "user".to_string(),
                request_id: None,
                reply_to: Some(cid.to_string()),
                content: text.to_string(),
            };
            if self.replies.resolve(cid, payload) {
                if let Some(main) = self.main_actor() {
                    main.push_mail(format!("[USER replied cid:{}] {}", cid, text));
                }
                return;
            }
        }
        if let Some(main) = self.main_actor() {
            let id = main.id.clone();
            main.push_mail(format!("[USER] {}", text));
            self.wake.notify(&id);
        }
    }

    /// 名册：全体 Actor 的轻量投影，按创建时间排序
    pub fn list_actors(&self) -> Vec<ActorSummary> {
        let actors = self.actors.read();
        let mut entries: Vec<(chrono::DateTime<chrono::Utc>, ActorSummary)> = actors
            .values()
            .map(|a| (a.state().created, a.summary()))
            .collect();
        entries.sort_by_key(|(created, _)| *created);
        entries.into_iter().map(|(_, s)| s).collect()
    }

    /// 只读快照，供外部观察者（看板）
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            actors: self.list_actors(),
            main: self.main_id(),
            comms: self.comms_id(),
        }
    }

    /// 注入泵：消费 sink 队列，每事件调用一次回调（FIFO）
    async fn spawn_sink_pump(self: &Arc<Self>) {
        let Some(mut rx) = self.injection_rx.lock().take() else {
            return;
        };
        let orch = self.clone();
        self.tasks.lock().await.spawn(async move {
            loop {
                tokio::select! {
                    _ = orch.cancel.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        let main = orch.main_actor().map(|m| m.summary());
                        match (&orch.injection_hook, main) {
                            (Some(hook), Some(main)) => hook(event, main).await,
                            _ => {
                                tracing::info!(from = %event.from_id, content = %event.content, "injection");
                            }
                        }
                    }
                }
            }
        });
    }
}
