//! 任务执行器：任务注册表 + 固定间隔的迭代循环

use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::status::{TaskEvent, TaskSummary};
use super::task::Task;
use crate::core::alert::AlertSink;
use crate::cta::AccountManager;
use crate::strategies::fib_swing::domain::{compute_levels, TaskConfig, TaskError, TaskResult};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 撤销结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// 任务不存在（或已被撤销）
    NotFound,
    Cancelled,
    /// 撤单失败，任务已升级错误并移除
    CancelFailed,
}

impl std::fmt::Display for CancelOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CancelOutcome::NotFound => "Unknown task",
            CancelOutcome::Cancelled => "Success task cancel",
            CancelOutcome::CancelFailed => "Task removed, cancel failed",
        };
        write!(f, "{}", text)
    }
}

struct TaskHandle {
    task: Arc<Mutex<Task>>,
    summary: watch::Receiver<TaskSummary>,
}

pub struct Executor {
    tasks: RwLock<BTreeMap<u64, TaskHandle>>,
    accounts: Arc<AccountManager>,
    alert: Arc<dyn AlertSink>,
    events: broadcast::Sender<TaskEvent>,
    last_task_id: AtomicU64,
    loop_interval: Duration,
}

impl Executor {
    pub fn new(
        accounts: Arc<AccountManager>,
        alert: Arc<dyn AlertSink>,
        loop_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tasks: RwLock::new(BTreeMap::new()),
            accounts,
            alert,
            events,
            last_task_id: AtomicU64::new(0),
            loop_interval,
        }
    }

    /// 计算价位并注册新任务，返回任务ID
    pub async fn start_task(&self, config: TaskConfig) -> TaskResult<u64> {
        let computed = compute_levels(&config)?;
        let exchange = self
            .accounts
            .get_account(config.exchange)
            .map_err(|e| TaskError::exchange("get_account", e))?;

        let id = self.last_task_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Task[{}] 启动: {} {} {} {:?}, enter={:.2} stop={:.2} take={:.2} amount={} leverage={}",
            id,
            config.strategy,
            config.exchange,
            config.symbol,
            config.mode,
            computed.enter_price,
            computed.stop_price,
            computed.take_price,
            computed.enter_amount,
            computed.leverage
        );

        let task = Task::new(
            id,
            config,
            computed,
            exchange,
            self.alert.clone(),
            self.events.clone(),
        );
        let summary = task.subscribe_summary();
        self.tasks.write().await.insert(
            id,
            TaskHandle {
                task: Arc::new(Mutex::new(task)),
                summary,
            },
        );
        Ok(id)
    }

    /// 撤销任务。无论撤单是否成功，任务都会从注册表移除
    pub async fn cancel_task(&self, id: u64) -> CancelOutcome {
        let task = match self.tasks.read().await.get(&id) {
            Some(handle) => handle.task.clone(),
            None => return CancelOutcome::NotFound,
        };

        let outcome = {
            let mut task = task.lock().await;
            // 并发撤销时后到者拿到锁，任务已被撤销
            if task.is_cancelled() {
                return CancelOutcome::NotFound;
            }
            match task.handle_cancel().await {
                Ok(()) => CancelOutcome::Cancelled,
                Err(err) => {
                    task.handle_error(err).await;
                    CancelOutcome::CancelFailed
                }
            }
        };

        self.tasks.write().await.remove(&id);
        info!("Task[{}] 已移除: {}", id, outcome);
        outcome
    }

    /// 所有任务的状态摘要（按ID排序），不等待正在迭代的任务
    pub async fn get_status(&self) -> Vec<TaskSummary> {
        self.tasks
            .read()
            .await
            .values()
            .map(|handle| handle.summary.borrow().clone())
            .collect()
    }

    pub async fn list_ids(&self) -> Vec<u64> {
        self.tasks.read().await.keys().copied().collect()
    }

    /// 订阅任务状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// 按ID顺序迭代一遍全部任务，单个任务失败不影响其它任务
    pub async fn tick(&self) {
        let snapshot: Vec<(u64, Arc<Mutex<Task>>)> = self
            .tasks
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, handle.task.clone()))
            .collect();

        for (id, task) in snapshot {
            let mut task = task.lock().await;
            if !task.is_iterable() {
                continue;
            }
            if let Err(err) = task.handle_iteration().await {
                warn!("Task[{}] 迭代失败，升级处理", id);
                task.handle_error(err).await;
            }
        }
    }

    /// 主循环，收到关闭信号后退出
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.loop_interval, self.loop_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("执行器启动，迭代间隔 {:?}", self.loop_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("执行器已停止");
    }

    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.run(shutdown).await;
        })
    }

    /// 启动配置文件中的任务，失败的任务只记录日志
    pub async fn start_all(&self, configs: Vec<TaskConfig>) -> Vec<u64> {
        let mut started = Vec::with_capacity(configs.len());
        for config in configs {
            let label = format!("{} {} {}", config.strategy, config.exchange, config.symbol);
            match self.start_task(config).await {
                Ok(id) => started.push(id),
                Err(err) => error!("任务 {} 启动失败: {}", label, err),
            }
        }
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alert::LogAlert;
    use crate::core::error::{AlertError, ExchangeError};
    use crate::core::exchange::ExchangeClient;
    use crate::core::types::{ExchangeId, MarketState, OrderRef, OrderRequest};
    use crate::exchanges::PaperExchange;
    use crate::strategies::fib_swing::domain::{StrategyType, TaskStateKind};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    /// 记录告警次数，可配置为发送失败
    struct CountingAlert {
        fail: bool,
        sent: AtomicUsize,
    }

    impl CountingAlert {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                sent: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AlertSink for CountingAlert {
        async fn notify(&self, _message: &str) -> Result<(), AlertError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AlertError::Rejected {
                    status: 500,
                    body: "down".to_string(),
                });
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    /// 撤单较慢，且像真实交易所一样拒绝重复撤单
    struct SlowCancelExchange {
        inner: PaperExchange,
        cancelled: Mutex<HashSet<String>>,
        cancel_calls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeClient for SlowCancelExchange {
        fn name(&self) -> &str {
            "slow-cancel"
        }

        async fn place_order(&self, request: OrderRequest) -> crate::core::types::Result<OrderRef> {
            self.inner.place_order(request).await
        }

        async fn move_order(&self, order: &OrderRef, new_price: f64) -> crate::core::types::Result<()> {
            self.inner.move_order(order, new_price).await
        }

        async fn cancel_order(&self, order: &OrderRef) -> crate::core::types::Result<()> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !self.cancelled.lock().await.insert(order.order_id.clone()) {
                return Err(ExchangeError::OrderNotFound {
                    order_id: order.order_id.clone(),
                    symbol: order.symbol.clone(),
                });
            }
            self.inner.cancel_order(order).await
        }

        async fn fetch_market_state(&self, symbol: &str) -> crate::core::types::Result<MarketState> {
            self.inner.fetch_market_state(symbol).await
        }
    }

    async fn setup() -> (Executor, Arc<PaperExchange>, Arc<PaperExchange>) {
        setup_with_alert(Arc::new(LogAlert)).await
    }

    async fn setup_with_alert(
        alert: Arc<dyn AlertSink>,
    ) -> (Executor, Arc<PaperExchange>, Arc<PaperExchange>) {
        let bitmex = Arc::new(PaperExchange::new("paper-bitmex"));
        let bybit = Arc::new(PaperExchange::new("paper-bybit"));
        bitmex.set_price("XBTUSD", 190.0).await;
        bybit.set_price("XBTUSD", 190.0).await;

        let mut accounts = AccountManager::new();
        accounts.add_exchange_instance(ExchangeId::Bitmex, bitmex.clone());
        accounts.add_exchange_instance(ExchangeId::Bybit, bybit.clone());
        let executor = Executor::new(Arc::new(accounts), alert, Duration::from_millis(20));
        (executor, bitmex, bybit)
    }

    fn zigzag(exchange: ExchangeId) -> TaskConfig {
        TaskConfig::retracement(StrategyType::Zigzag, exchange, 1000.0, 100.0, 200.0)
    }

    fn state_of(status: &[TaskSummary], id: u64) -> TaskStateKind {
        status.iter().find(|s| s.id == id).map(|s| s.state).unwrap()
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let (executor, _, _) = setup().await;
        let a = executor.start_task(zigzag(ExchangeId::Bitmex)).await.unwrap();
        let b = executor.start_task(zigzag(ExchangeId::Bybit)).await.unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(executor.list_ids().await, vec![1, 2]);

        let status = executor.get_status().await;
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| s.state == TaskStateKind::Initial));
    }

    #[tokio::test]
    async fn test_invalid_task_is_rejected() {
        let (executor, _, _) = setup().await;
        let bad = zigzag(ExchangeId::Bitmex);
        let bad = TaskConfig { fib_one: 100.0, ..bad };
        assert!(matches!(
            executor.start_task(bad).await,
            Err(TaskError::InvalidRange(_))
        ));
        assert!(matches!(
            executor.start_task(zigzag(ExchangeId::Okex)).await,
            Err(TaskError::ExchangeCall { operation: "get_account", .. })
        ));
        assert!(executor.list_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_frozen() {
        let (executor, bitmex, bybit) = setup().await;
        let a = executor.start_task(zigzag(ExchangeId::Bitmex)).await.unwrap();
        let b = executor.start_task(zigzag(ExchangeId::Bybit)).await.unwrap();
        bybit.fail_on("place_order").await;

        executor.tick().await;
        let status = executor.get_status().await;
        assert_eq!(state_of(&status, a), TaskStateKind::Waiting);
        assert_eq!(state_of(&status, b), TaskStateKind::HandledError);

        // 错误任务不再被迭代，恢复交易所也不会自动继续
        bybit.recover("place_order").await;
        let bybit_calls = bybit.calls().await.len();
        let bitmex_calls = bitmex.calls().await.len();
        executor.tick().await;
        assert_eq!(bybit.calls().await.len(), bybit_calls);
        assert!(bitmex.calls().await.len() > bitmex_calls);
        assert_eq!(state_of(&executor.get_status().await, b), TaskStateKind::HandledError);
    }

    #[tokio::test]
    async fn test_unhandled_error_is_skipped_by_tick() {
        let alert = CountingAlert::new(true);
        let (executor, bitmex, bybit) = setup_with_alert(alert.clone()).await;
        let a = executor.start_task(zigzag(ExchangeId::Bitmex)).await.unwrap();
        let b = executor.start_task(zigzag(ExchangeId::Bybit)).await.unwrap();
        bybit.fail_on("fetch_market_state").await;

        executor.tick().await;
        let status = executor.get_status().await;
        assert_eq!(state_of(&status, a), TaskStateKind::Waiting);
        assert_eq!(state_of(&status, b), TaskStateKind::UnhandledError);
        assert_eq!(alert.sent.load(Ordering::SeqCst), 1);

        // A 继续迭代，B 不再被访问也不重复告警
        bybit.recover("fetch_market_state").await;
        let bybit_calls = bybit.calls().await.len();
        let bitmex_calls = bitmex.calls().await.len();
        executor.tick().await;
        assert!(bitmex.calls().await.len() > bitmex_calls);
        assert_eq!(bybit.calls().await.len(), bybit_calls);
        assert_eq!(alert.sent.load(Ordering::SeqCst), 1);
        assert_eq!(state_of(&executor.get_status().await, b), TaskStateKind::UnhandledError);
    }

    #[tokio::test]
    async fn test_concurrent_cancel_calls_exchange_once() {
        let exchange = Arc::new(SlowCancelExchange {
            inner: PaperExchange::new("paper"),
            cancelled: Mutex::new(HashSet::new()),
            cancel_calls: AtomicUsize::new(0),
        });
        exchange.inner.set_price("XBTUSD", 190.0).await;
        let mut accounts = AccountManager::new();
        accounts.add_exchange_instance(ExchangeId::Bitmex, exchange.clone());
        let alert = CountingAlert::new(false);
        let executor = Executor::new(Arc::new(accounts), alert.clone(), Duration::from_secs(1));

        let id = executor.start_task(zigzag(ExchangeId::Bitmex)).await.unwrap();
        executor.tick().await;
        assert_eq!(state_of(&executor.get_status().await, id), TaskStateKind::Waiting);

        let (first, second) = tokio::join!(executor.cancel_task(id), executor.cancel_task(id));
        let mut outcomes = vec![first, second];
        outcomes.sort_by_key(|o| o.to_string());
        assert_eq!(outcomes, vec![CancelOutcome::Cancelled, CancelOutcome::NotFound]);
        assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 2);
        assert_eq!(alert.sent.load(Ordering::SeqCst), 0);
        assert!(exchange.inner.open_orders().await.is_empty());
        assert!(executor.list_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (executor, bitmex, _) = setup().await;
        let id = executor.start_task(zigzag(ExchangeId::Bitmex)).await.unwrap();
        executor.tick().await;
        assert_eq!(bitmex.open_orders().await.len(), 2);

        assert_eq!(executor.cancel_task(id).await, CancelOutcome::Cancelled);
        assert!(bitmex.open_orders().await.is_empty());

        let calls = bitmex.calls().await.len();
        assert_eq!(executor.cancel_task(id).await, CancelOutcome::NotFound);
        assert_eq!(bitmex.calls().await.len(), calls);
        assert!(executor.list_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_cancel_makes_no_calls() {
        let (executor, bitmex, _) = setup().await;
        assert_eq!(executor.cancel_task(42).await, CancelOutcome::NotFound);
        assert!(bitmex.calls().await.is_empty());
        assert_eq!(CancelOutcome::NotFound.to_string(), "Unknown task");
    }

    #[tokio::test]
    async fn test_failed_cancel_still_removes_task() {
        let (executor, bitmex, _) = setup().await;
        let id = executor.start_task(zigzag(ExchangeId::Bitmex)).await.unwrap();
        executor.tick().await;
        bitmex.fail_on("cancel_order").await;

        assert_eq!(executor.cancel_task(id).await, CancelOutcome::CancelFailed);
        assert!(executor.list_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_and_events() {
        let (executor, _, _) = setup().await;
        let executor = Arc::new(executor);
        let mut events = executor.subscribe();
        let id = executor.start_task(zigzag(ExchangeId::Bitmex)).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = executor.spawn(shutdown_rx);

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.task_id, id);
        assert_eq!(event.to, TaskStateKind::Waiting);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
