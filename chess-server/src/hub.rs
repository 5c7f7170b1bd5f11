//! 显示状态广播
//!
//! 持有唯一的当前显示状态，整体替换后推送给所有观察者。
//! 每个观察者的推送互相串行，不同观察者之间并发；单次推送有超时，
//! 慢或失败的观察者不影响其它观察者和对局循环。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use protocol::{DisplayState, OBSERVER_PUSH_TIMEOUT};

/// 观察者 ID
pub type ObserverId = u64;

/// 接收显示状态的观察者
#[async_trait]
pub trait Observer: Send {
    /// 推送一份完整状态
    async fn push(&mut self, state: &DisplayState) -> anyhow::Result<()>;

    /// 日志里的名字
    fn name(&self) -> String;
}

/// 已注册的观察者
struct Slot {
    id: ObserverId,
    inner: tokio::sync::Mutex<SlotInner>,
}

struct SlotInner {
    observer: Box<dyn Observer>,
    /// 已送达的状态版本
    delivered: u64,
}

/// 带版本号的当前状态
struct Current {
    version: u64,
    state: DisplayState,
}

/// 状态广播中心
pub struct StateBroadcastHub {
    current: Arc<Mutex<Current>>,
    slots: Mutex<Vec<Arc<Slot>>>,
    next_id: AtomicU64,
}

impl StateBroadcastHub {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Current {
                version: 0,
                state: DisplayState::default(),
            })),
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 当前状态的副本
    pub fn current(&self) -> DisplayState {
        self.current.lock().state.clone()
    }

    /// 替换整个状态并广播
    pub fn set(&self, state: DisplayState) {
        {
            let mut current = self.current.lock();
            current.version += 1;
            current.state = state;
        }
        self.broadcast();
    }

    /// 在锁内读改写状态；闭包返回 false 时视为未修改，不广播
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut DisplayState) -> bool,
    {
        {
            let mut current = self.current.lock();
            if !f(&mut current.state) {
                return false;
            }
            current.version += 1;
        }
        self.broadcast();
        true
    }

    /// 把当前状态推送给所有观察者
    ///
    /// 每个观察者一个短任务；同一观察者的推送由它自己的锁串行化，
    /// 拿到锁时已经送达过的版本不再重复推送。
    pub fn broadcast(&self) {
        let slots: Vec<Arc<Slot>> = self.slots.lock().clone();
        for slot in slots {
            let current = self.current.clone();
            tokio::spawn(async move {
                let mut inner = slot.inner.lock().await;
                let (version, state) = {
                    let current = current.lock();
                    (current.version, current.state.clone())
                };
                if inner.delivered >= version {
                    return;
                }
                deliver(slot.id, &mut inner, version, &state).await;
            });
        }
    }

    /// 注册观察者：先推送当前状态，再接收之后的广播
    pub async fn attach(&self, observer: Box<dyn Observer>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot {
            id,
            inner: tokio::sync::Mutex::new(SlotInner {
                observer,
                delivered: 0,
            }),
        });

        // 先占住观察者的锁，注册后的广播会排在首次推送之后
        let mut inner = slot.inner.lock().await;
        self.slots.lock().push(slot.clone());
        let (version, state) = {
            let current = self.current.lock();
            (current.version, current.state.clone())
        };
        debug!(observer = id, name = %inner.observer.name(), "观察者已注册");
        deliver(id, &mut inner, version, &state).await;

        id
    }

    /// 移除观察者；已在途的推送允许静默失败
    pub fn detach(&self, id: ObserverId) -> bool {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        let removed = slots.len() != before;
        if removed {
            debug!(observer = id, "观察者已移除");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Default for StateBroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(id: ObserverId, inner: &mut SlotInner, version: u64, state: &DisplayState) {
    match tokio::time::timeout(OBSERVER_PUSH_TIMEOUT, inner.observer.push(state)).await {
        Ok(Ok(())) => inner.delivered = version,
        Ok(Err(e)) => {
            warn!(observer = id, name = %inner.observer.name(), "推送失败: {}", e);
        }
        Err(_) => {
            warn!(observer = id, name = %inner.observer.name(), "推送超时");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// 把收到的状态转发到通道
    pub(crate) struct ChannelObserver {
        pub tx: mpsc::UnboundedSender<DisplayState>,
        pub delay: Duration,
    }

    impl ChannelObserver {
        pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<DisplayState>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    tx,
                    delay: Duration::ZERO,
                },
                rx,
            )
        }
    }

    #[async_trait]
    impl Observer for ChannelObserver {
        async fn push(&mut self, state: &DisplayState) -> anyhow::Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.tx.send(state.clone())?;
            Ok(())
        }

        fn name(&self) -> String {
            "channel".to_string()
        }
    }

    fn state_with_fen(fen: &str) -> DisplayState {
        DisplayState {
            fen: fen.to_string(),
            ..DisplayState::default()
        }
    }

    #[tokio::test]
    async fn test_attach_receives_current_state() {
        let hub = StateBroadcastHub::new();
        hub.set(state_with_fen("first"));
        assert!(hub.update(|state| {
            state.fen = "second".to_string();
            state.started = true;
            true
        }));

        let (observer, mut rx) = ChannelObserver::new();
        hub.attach(Box::new(observer)).await;

        // 注册时立即收到完整的最新状态
        let received = rx.try_recv().unwrap();
        assert_eq!(received.fen, "second");
        assert!(received.started);
        assert_eq!(hub.observer_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_update_is_not_broadcast() {
        let hub = StateBroadcastHub::new();
        hub.set(state_with_fen("game"));
        let (observer, mut rx) = ChannelObserver::new();
        hub.attach(Box::new(observer)).await;
        assert_eq!(rx.try_recv().unwrap().fen, "game");

        let changed = hub.update(|state| {
            if state.fen == "game" {
                return false;
            }
            state.fen = "preview".to_string();
            true
        });
        assert!(!changed);
        assert_eq!(hub.current().fen, "game");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_and_detach() {
        let hub = StateBroadcastHub::new();
        let (first, mut first_rx) = ChannelObserver::new();
        let (second, mut second_rx) = ChannelObserver::new();
        let first_id = hub.attach(Box::new(first)).await;
        hub.attach(Box::new(second)).await;
        first_rx.recv().await.unwrap();
        second_rx.recv().await.unwrap();

        hub.set(state_with_fen("after e4"));
        assert_eq!(first_rx.recv().await.unwrap().fen, "after e4");
        assert_eq!(second_rx.recv().await.unwrap().fen, "after e4");

        assert!(hub.detach(first_id));
        assert!(!hub.detach(first_id));
        hub.set(state_with_fen("after e5"));
        assert_eq!(second_rx.recv().await.unwrap().fen, "after e5");

        // 已移除的观察者不再收到推送
        tokio::task::yield_now().await;
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_observer_does_not_block_others() {
        let hub = StateBroadcastHub::new();
        let (mut slow, mut slow_rx) = ChannelObserver::new();
        slow.delay = Duration::from_secs(30);
        let (fast, mut fast_rx) = ChannelObserver::new();

        hub.attach(Box::new(fast)).await;
        fast_rx.recv().await.unwrap();

        // 慢观察者的首次推送会超时
        let started = tokio::time::Instant::now();
        hub.attach(Box::new(slow)).await;
        assert!(started.elapsed() >= OBSERVER_PUSH_TIMEOUT);
        assert!(slow_rx.try_recv().is_err());

        hub.set(state_with_fen("moved"));
        let received = tokio::time::timeout(Duration::from_secs(1), fast_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.fen, "moved");
    }

    #[tokio::test]
    async fn test_failed_observer_is_isolated() {
        let hub = StateBroadcastHub::new();
        let (broken, broken_rx) = ChannelObserver::new();
        drop(broken_rx);
        let (healthy, mut healthy_rx) = ChannelObserver::new();

        hub.attach(Box::new(broken)).await;
        hub.attach(Box::new(healthy)).await;
        healthy_rx.recv().await.unwrap();

        hub.set(state_with_fen("still delivered"));
        assert_eq!(healthy_rx.recv().await.unwrap().fen, "still delivered");
    }
}
