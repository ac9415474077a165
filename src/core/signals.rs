//! 唤醒信号与请求/回复关联
//!
//! WakeSignals：每个 Actor 一个 watch 计数器，sleep_with_early_wake 在订阅时
//! 丢弃陈旧的唤醒（borrow_and_update），再让超时与 changed() 竞速。
//! ReplyRouter：关联 id -> oneshot 发送端，resolve 先移除再发送，天然至多一次。

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::core::state::{ActorId, MessagePayload};

/// 每 Actor 一个可重置的唤醒信号；notify 幂等
#[derive(Default)]
pub struct WakeSignals {
    channels: Mutex<HashMap<ActorId, watch::Sender<u64>>>,
}

impl WakeSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, id: &ActorId) -> watch::Sender<u64> {
        let mut channels = self.channels.lock();
        channels
            .entry(id.clone())
            .or_insert_with(|| watch::channel(0).0)
            .clone()
    }

    /// 设置目标的唤醒信号；没有等待者时也安全（幂等）
    pub fn notify(&self, id: &ActorId) {
        self.sender(id).send_modify(|n| *n = n.wrapping_add(1));
    }

    /// 让超时与唤醒竞速；唤醒早于超时返回 true。
    /// 订阅新接收端即视当前值为已读，调用前的陈旧唤醒不会误触发。
    pub async fn sleep_with_early_wake(
        &self,
        id: &ActorId,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let mut rx = self.sender(id).subscribe();
        rx.borrow_and_update();
        tokio::select! {
            _ = cancel.cancelled() => false,
            changed = rx.changed() => changed.is_ok(),
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// 清理某 Actor 的信号通道（注册表 GC 时）
    pub fn remove(&self, id: &ActorId) {
        self.channels.lock().remove(id);
    }
}

/// 关联 id -> 待决回复；每个 id 至多解析一次
#[derive(Default)]
pub struct ReplyRouter {
    pending: Mutex<HashMap<String, oneshot::Sender<MessagePayload>>>,
}

impl ReplyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记等待者；同 id 重复登记时旧等待者被替换（其接收端收到关闭）
    pub fn register(&self, id: &str) -> oneshot::Receiver<MessagePayload> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.to_string(), tx);
        rx
    }

    /// 命中则移除并投递，返回 true；未命中或等待者已消失返回 false
    pub fn resolve(&self, id: &str, payload: MessagePayload) -> bool {
        let Some(tx) = self.pending.lock().remove(id) else {
            return false;
        };
        tx.send(payload).is_ok()
    }

    pub fn has_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_early_wake_beats_timeout() {
        let signals = std::sync::Arc::new(WakeSignals::new());
        let cancel = CancellationToken::new();
        let id = ActorId::from("a1");

        let s = signals.clone();
        let i = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            s.notify(&i);
        });

        let start = Instant::now();
        let woke = signals
            .sleep_with_early_wake(&id, Duration::from_secs(1), &cancel)
            .await;
        assert!(woke);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_stale_wake_does_not_trigger() {
        let signals = WakeSignals::new();
        let cancel = CancellationToken::new();
        let id = ActorId::from("a2");

        // 在 sleep 之前到达的唤醒应被丢弃
        signals.notify(&id);
        let woke = signals
            .sleep_with_early_wake(&id, Duration::from_millis(30), &cancel)
            .await;
        assert!(!woke);
    }

    #[tokio::test]
    async fn test_timeout_returns_false() {
        let signals = WakeSignals::new();
        let cancel = CancellationToken::new();
        let woke = signals
            .sleep_with_early_wake(&ActorId::from("a3"), Duration::from_millis(20), &cancel)
            .await;
        assert!(!woke);
    }

    #[tokio::test]
    async fn test_reply_resolves_at_most_once() {
        let router = ReplyRouter::new();
        let rx = router.register("req1");

        let payload = MessagePayload {
            from_id: "b".into(),
            reply_to: Some("req1".into()),
            content: "done".into(),
            ..Default::default()
        };
        assert!(router.resolve("req1", payload.clone()));
        // 第二次解析同一 id 是 no-op（条目已被移除）
        assert!(!router.resolve("req1", payload));

        let got = rx.await.unwrap();
        assert_eq!(got.content, "done");
        assert!(!router.has_pending("req1"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_is_noop() {
        let router = ReplyRouter::new();
        assert!(!router.resolve("nope", MessagePayload::default()));
    }
}
