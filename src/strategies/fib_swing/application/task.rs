//! 单个波段任务的状态机
//!
//! 每次迭代读取一次行情，按当前状态决定挂单、移单、撤单或状态迁移。
//! 失败统一交给 handle_error 升级为告警，错误状态不再自动迭代。

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use super::status::{TaskEvent, TaskSummary};
use crate::core::alert::AlertSink;
use crate::core::exchange::ExchangeClient;
use crate::core::types::{MarketState, OrderRef, OrderRequest, OrderType};
use crate::strategies::fib_swing::domain::{
    ComputedLevels, EntryMode, Side, StopStage, TaskConfig, TaskError, TaskResult, TaskState,
    TaskStateKind, TrendCalculator, WorkingLevels,
};
use crate::utils::order_id::{OrderIdGenerator, OrderRole};

/// 保本止损阶梯：触发价与止损目标价
#[derive(Debug, Clone, Copy)]
struct StopLadder {
    initial: f64,
    zero: f64,
    to_zero_trigger: f64,
    min_profit: f64,
    to_min_profit_trigger: f64,
}

impl StopLadder {
    fn stop_for(&self, stage: StopStage) -> f64 {
        match stage {
            StopStage::Initial => self.initial,
            StopStage::Zero => self.zero,
            StopStage::MinProfit => self.min_profit,
        }
    }
}

pub struct Task {
    id: u64,
    state: TaskState,
    previous_state: Option<TaskStateKind>,
    config: TaskConfig,
    computed: ComputedLevels,
    start_time: DateTime<Utc>,
    current: Option<WorkingLevels>,
    cancelled: bool,
    /// 已在交易所挂出、但不属于当前状态的订单（部分失败时留下）
    stray_orders: Vec<OrderRef>,
    exchange: Arc<dyn ExchangeClient>,
    alert: Arc<dyn AlertSink>,
    order_ids: OrderIdGenerator,
    events: broadcast::Sender<TaskEvent>,
    summary_tx: watch::Sender<TaskSummary>,
}

impl Task {
    pub fn new(
        id: u64,
        config: TaskConfig,
        computed: ComputedLevels,
        exchange: Arc<dyn ExchangeClient>,
        alert: Arc<dyn AlertSink>,
        events: broadcast::Sender<TaskEvent>,
    ) -> Self {
        let start_time = Utc::now();
        let (summary_tx, _) = watch::channel(TaskSummary {
            id,
            state: TaskStateKind::Initial,
            previous_state: None,
            strategy: config.strategy,
            mode: config.mode,
            exchange: config.exchange,
            symbol: config.symbol.clone(),
            computed: computed.clone(),
            current: None,
            open_orders: Vec::new(),
            stop_stage: None,
            active_stop: None,
            cancelled: false,
            start_time,
            updated_at: start_time,
        });

        Self {
            id,
            state: TaskState::Initial,
            previous_state: None,
            order_ids: OrderIdGenerator::new(id, config.exchange),
            config,
            computed,
            start_time,
            current: None,
            cancelled: false,
            stray_orders: Vec::new(),
            exchange,
            alert,
            events,
            summary_tx,
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn current(&self) -> Option<WorkingLevels> {
        self.current
    }

    /// 订阅状态摘要
    pub fn subscribe_summary(&self) -> watch::Receiver<TaskSummary> {
        self.summary_tx.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// 是否应被执行器迭代：未撤销、未结束且不处于错误状态
    pub fn is_iterable(&self) -> bool {
        let kind = self.state.kind();
        !self.cancelled && !kind.is_error() && !kind.is_finished()
    }

    pub fn explain(&self) -> TaskSummary {
        let active = self.active_stop();
        TaskSummary {
            id: self.id,
            state: self.state.kind(),
            previous_state: self.previous_state,
            strategy: self.config.strategy,
            mode: self.config.mode,
            exchange: self.config.exchange,
            symbol: self.config.symbol.clone(),
            computed: self.computed.clone(),
            current: self.current,
            open_orders: self.tracked_orders(),
            stop_stage: active.map(|(stage, _)| stage),
            active_stop: active.map(|(_, price)| price),
            cancelled: self.cancelled,
            start_time: self.start_time,
            updated_at: Utc::now(),
        }
    }

    /// 执行一次迭代
    pub async fn handle_iteration(&mut self) -> TaskResult<()> {
        match self.state.clone() {
            TaskState::Initial => self.on_initial().await,
            TaskState::Waiting { enter, take } => self.on_waiting(enter, take).await,
            TaskState::InPosition { stop, take, stage } => {
                self.on_in_position(stop, take, stage).await
            }
            TaskState::Stop
            | TaskState::Take
            | TaskState::UnhandledError { .. }
            | TaskState::HandledError { .. } => Ok(()),
        }
    }

    /// 撤销任务：撤掉当前状态持有的挂单。已撤销的任务不再访问交易所
    pub async fn handle_cancel(&mut self) -> TaskResult<()> {
        if self.cancelled {
            return Ok(());
        }
        self.cancelled = true;
        let result = match self.state.clone() {
            TaskState::Waiting { enter, take } => self.cancel_all(&[enter, take]).await,
            TaskState::InPosition { stop, take, .. } => {
                let result = self.cancel_all(&[stop, take]).await;
                warn!("Task[{}] 已撤销止损和止盈，持仓需人工处理", self.id);
                result
            }
            TaskState::UnhandledError { orders } | TaskState::HandledError { orders } => {
                for order in &orders {
                    warn!(
                        "Task[{}] 处于 {}，不自动撤单，请人工处理挂单 {}",
                        self.id,
                        self.state.kind(),
                        order
                    );
                }
                Ok(())
            }
            TaskState::Initial | TaskState::Stop | TaskState::Take => Ok(()),
        };
        self.publish();
        result
    }

    /// 错误升级：进入 UNHANDLED_ERROR，告警送达后转为 HANDLED_ERROR
    pub async fn handle_error(&mut self, err: TaskError) {
        let failed_in = self.state.kind();
        let orders = self.tracked_orders();
        self.stray_orders.clear();
        error!("Task[{}] 在 {} 状态下失败: {}", self.id, failed_in, err);
        self.update_state(TaskState::UnhandledError {
            orders: orders.clone(),
        });

        let message = format!(
            "swingcta Task[{}] {} {} {} 在 {} 状态下失败: {}",
            self.id, self.config.strategy, self.config.exchange, self.config.symbol, failed_in, err
        );
        match self.alert.notify(&message).await {
            Ok(()) => {
                info!("Task[{}] 告警已通过 {} 发送", self.id, self.alert.name());
                self.update_state(TaskState::HandledError { orders });
            }
            Err(alert_err) => {
                let err = TaskError::from(alert_err);
                error!("Task[{}] 告警发送失败({}): {}", self.id, self.alert.name(), err);
            }
        }
    }

    async fn on_initial(&mut self) -> TaskResult<()> {
        let market = self.fetch_market().await?;
        self.sync_current_values(&market)?;
        let current = self.working()?;

        let enter = self
            .place(OrderRole::Enter, OrderType::Limit, current.enter, current.amount)
            .await?;
        let take = match self
            .place(OrderRole::Take, OrderType::Limit, current.take, current.amount)
            .await
        {
            Ok(take) => take,
            Err(err) => {
                // 先撤掉已挂出的入场单，撤不掉就交给错误状态跟踪
                let cancelled = self.cancel(&enter).await;
                match cancelled {
                    Ok(()) => warn!("Task[{}] 止盈单下单失败，已撤销入场单 {}", self.id, enter),
                    Err(cancel_err) => {
                        error!(
                            "Task[{}] 止盈单下单失败，入场单 {} 撤销失败: {}",
                            self.id, enter, cancel_err
                        );
                        self.stray_orders.push(enter);
                    }
                }
                return Err(err);
            }
        };

        self.update_state(TaskState::Waiting { enter, take });
        Ok(())
    }

    async fn on_waiting(&mut self, enter: OrderRef, take: OrderRef) -> TaskResult<()> {
        let market = self.fetch_market().await?;
        let current = self.working()?;

        if self.computed.reached_in_loss(market.last_price, current.enter) {
            let stop = self
                .place(OrderRole::Stop, OrderType::StopMarket, current.stop, current.amount)
                .await?;
            info!(
                "Task[{}] 价格 {} 到达入场价 {}，止损单 {} @ {}",
                self.id, market.last_price, current.enter, stop, current.stop
            );
            self.update_state(TaskState::InPosition {
                stop,
                take,
                stage: StopStage::Initial,
            });
            return Ok(());
        }

        if self.sync_current_values(&market)? {
            let moved = self.working()?;
            self.exchange
                .move_order(&enter, moved.enter)
                .await
                .map_err(|e| TaskError::exchange("move_order", e))?;
            self.exchange
                .move_order(&take, moved.take)
                .await
                .map_err(|e| TaskError::exchange("move_order", e))?;
            info!(
                "Task[{}] 移动挂单: enter {} -> {}, take {} -> {}",
                self.id, current.enter, moved.enter, current.take, moved.take
            );
            self.publish();
        }
        Ok(())
    }

    async fn on_in_position(
        &mut self,
        stop: OrderRef,
        take: OrderRef,
        stage: StopStage,
    ) -> TaskResult<()> {
        let market = self.fetch_market().await?;
        let price = market.last_price;
        let current = self.working()?;
        let ladder = self.stop_ladder(&current);
        let stop_level = ladder.stop_for(stage);

        if self.computed.reached_in_loss(price, stop_level) {
            self.cancel(&take).await?;
            self.update_state(TaskState::Stop);
            return Ok(());
        }

        if self.computed.reached_in_profit(price, current.take) {
            self.cancel(&stop).await?;
            self.update_state(TaskState::Take);
            return Ok(());
        }

        let next = if stage < StopStage::MinProfit
            && self.computed.reached_in_profit(price, ladder.to_min_profit_trigger)
        {
            Some((StopStage::MinProfit, ladder.min_profit))
        } else if stage < StopStage::Zero
            && self.computed.reached_in_profit(price, ladder.to_zero_trigger)
        {
            Some((StopStage::Zero, ladder.zero))
        } else {
            None
        };

        if let Some((next_stage, stop_price)) = next {
            self.exchange
                .move_order(&stop, stop_price)
                .await
                .map_err(|e| TaskError::exchange("move_order", e))?;
            info!(
                "Task[{}] 价格 {} 触发保本，止损 {:?} -> {:?} @ {}",
                self.id, price, stage, next_stage, stop_price
            );
            self.state = TaskState::InPosition {
                stop,
                take,
                stage: next_stage,
            };
            self.publish();
        }
        Ok(())
    }

    /// 刷新工作价位，返回挂单是否需要移动
    fn sync_current_values(&mut self, market: &MarketState) -> TaskResult<bool> {
        let fresh = match self.config.mode {
            EntryMode::Retracement => WorkingLevels {
                bottom: self.config.fib_zero,
                enter: self.computed.enter_price,
                stop: self.computed.stop_price,
                take: self.computed.take_price,
                amount: self.computed.enter_amount,
            },
            EntryMode::Trend => {
                let calculator = TrendCalculator::new(&self.config)?;
                let candle_secs = calculator.candle_size().duration().num_seconds().max(1);
                let elapsed = (market.timestamp - self.start_time).num_seconds().max(0) / candle_secs;
                let observed = match self.computed.side {
                    Side::Long => market.lowest_low_since(self.start_time),
                    Side::Short => market.highest_high_since(self.start_time),
                };
                let bottom = calculator.extend_bottom(observed);
                calculator.working_levels(calculator.line_at(elapsed), bottom)?
            }
        };

        let changed = match &self.current {
            None => true,
            Some(old) => old.moved_materially(&fresh),
        };
        if changed {
            self.current = Some(fresh);
        }
        Ok(changed)
    }

    /// 趋势模式下入场价会移动，阶梯随入场价整体平移
    fn stop_ladder(&self, current: &WorkingLevels) -> StopLadder {
        let shift = current.enter - self.computed.enter_price;
        StopLadder {
            initial: current.stop,
            zero: self.computed.zero_price + shift,
            to_zero_trigger: self.computed.to_zero_trigger_price + shift,
            min_profit: self.computed.min_profit_price + shift,
            to_min_profit_trigger: self.computed.to_min_profit_trigger_price + shift,
        }
    }

    /// 持仓时止损所处阶段和实际止损价
    fn active_stop(&self) -> Option<(StopStage, f64)> {
        match &self.state {
            TaskState::InPosition { stage, .. } => {
                let current = self.current?;
                Some((*stage, self.stop_ladder(&current).stop_for(*stage)))
            }
            _ => None,
        }
    }

    /// 状态持有的挂单加上游离挂单
    fn tracked_orders(&self) -> Vec<OrderRef> {
        self.state
            .open_orders()
            .into_iter()
            .chain(self.stray_orders.iter())
            .cloned()
            .collect()
    }

    fn working(&self) -> TaskResult<WorkingLevels> {
        self.current.ok_or_else(|| {
            TaskError::InvalidRange(format!("Task[{}] 工作价位尚未初始化", self.id))
        })
    }

    async fn fetch_market(&self) -> TaskResult<MarketState> {
        self.exchange
            .fetch_market_state(&self.config.symbol)
            .await
            .map_err(|e| TaskError::exchange("fetch_market_state", e))
    }

    async fn place(
        &self,
        role: OrderRole,
        order_type: OrderType,
        price: f64,
        amount: f64,
    ) -> TaskResult<OrderRef> {
        let entry_side = self.computed.side.entry_order_side();
        let mut request = match role {
            OrderRole::Enter => {
                OrderRequest::new(&self.config.symbol, entry_side, order_type, amount, price)
            }
            OrderRole::Take | OrderRole::Stop => OrderRequest::new(
                &self.config.symbol,
                entry_side.opposite(),
                order_type,
                amount,
                price,
            )
            .reduce_only(),
        };
        request = request.with_client_order_id(self.order_ids.generate(role));

        self.exchange
            .place_order(request)
            .await
            .map_err(|e| TaskError::exchange("place_order", e))
    }

    async fn cancel(&self, order: &OrderRef) -> TaskResult<()> {
        self.exchange
            .cancel_order(order)
            .await
            .map_err(|e| TaskError::exchange("cancel_order", e))
    }

    /// 逐个撤单，失败不中断，返回第一个错误
    async fn cancel_all(&self, orders: &[OrderRef]) -> TaskResult<()> {
        let mut first_err = None;
        for order in orders {
            if let Err(err) = self.cancel(order).await {
                error!("Task[{}] 撤单 {} 失败: {}", self.id, order, err);
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn update_state(&mut self, next: TaskState) {
        let from = self.state.kind();
        let to = next.kind();
        self.previous_state = Some(from);
        self.state = next;

        let summary = self.explain();
        let detail = serde_json::to_string(&summary).unwrap_or_default();
        info!("Task[{}] {}=>{}, {}", self.id, from, to, detail);

        // 没有订阅者时发送失败，可以忽略
        let _ = self.events.send(TaskEvent {
            task_id: self.id,
            from,
            to,
            at: summary.updated_at,
        });
        self.summary_tx.send_replace(summary);
    }

    fn publish(&self) {
        self.summary_tx.send_replace(self.explain());
    }

    #[cfg(test)]
    pub(crate) fn set_start_time(&mut self, start_time: DateTime<Utc>) {
        self.start_time = start_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AlertError;
    use crate::core::types::{CandleSize, ExchangeId, Kline, OrderSide};
    use crate::exchanges::PaperExchange;
    use crate::strategies::fib_swing::domain::{compute_levels, StrategyType};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct RecordingAlert {
        fail: bool,
        messages: Mutex<Vec<String>>,
    }

    impl RecordingAlert {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                messages: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AlertSink for RecordingAlert {
        async fn notify(&self, message: &str) -> Result<(), AlertError> {
            self.messages.lock().await.push(message.to_string());
            if self.fail {
                return Err(AlertError::Rejected {
                    status: 500,
                    body: "down".to_string(),
                });
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    async fn zigzag_task(
        price: f64,
        alert: Arc<RecordingAlert>,
    ) -> (Task, Arc<PaperExchange>, broadcast::Receiver<TaskEvent>) {
        let exchange = Arc::new(PaperExchange::new("paper"));
        exchange.set_price("XBTUSD", price).await;
        let config =
            TaskConfig::retracement(StrategyType::Zigzag, ExchangeId::Bitmex, 1000.0, 100.0, 200.0);
        let computed = compute_levels(&config).unwrap();
        let (events, rx) = broadcast::channel(16);
        let task = Task::new(1, config, computed, exchange.clone(), alert, events);
        (task, exchange, rx)
    }

    #[tokio::test]
    async fn test_initial_places_enter_and_take() {
        let (mut task, exchange, mut events) = zigzag_task(190.0, RecordingAlert::new(false)).await;

        task.handle_iteration().await.unwrap();
        assert_eq!(task.state().kind(), TaskStateKind::Waiting);

        let orders = exchange.open_orders().await;
        assert_eq!(orders.len(), 2);
        let enter = &orders[0].1;
        assert_eq!(enter.request.side, OrderSide::Buy);
        assert_eq!(enter.request.order_type, OrderType::Limit);
        assert!((enter.price - 163.0).abs() < 1e-9);
        assert_eq!(enter.request.amount, 640.0);
        assert!(enter.request.client_order_id.as_deref().unwrap().starts_with("SW1-EN"));
        let take = &orders[1].1;
        assert_eq!(take.request.side, OrderSide::Sell);
        assert!(take.request.reduce_only);
        assert!((take.price - 220.0).abs() < 1e-9);

        let event = events.recv().await.unwrap();
        assert_eq!(event.from, TaskStateKind::Initial);
        assert_eq!(event.to, TaskStateKind::Waiting);
        assert_eq!(task.subscribe_summary().borrow().state, TaskStateKind::Waiting);
    }

    #[tokio::test]
    async fn test_full_cycle_with_breakeven_stop() {
        let (mut task, exchange, _events) = zigzag_task(190.0, RecordingAlert::new(false)).await;
        task.handle_iteration().await.unwrap();

        // 未到入场价，回撤模式价位不变，不移单
        exchange.set_price("XBTUSD", 170.0).await;
        task.handle_iteration().await.unwrap();
        assert_eq!(task.state().kind(), TaskStateKind::Waiting);
        assert!(!exchange.calls().await.contains(&"move_order".to_string()));

        exchange.set_price("XBTUSD", 160.0).await;
        task.handle_iteration().await.unwrap();
        let stop = match task.state() {
            TaskState::InPosition { stop, stage, .. } => {
                assert_eq!(*stage, StopStage::Initial);
                stop.clone()
            }
            other => panic!("unexpected state {:?}", other),
        };
        let stop_order = exchange
            .open_orders()
            .await
            .into_iter()
            .find(|(r, _)| *r == stop)
            .unwrap()
            .1;
        assert_eq!(stop_order.request.order_type, OrderType::StopMarket);
        assert!((stop_order.price - 138.0).abs() < 1e-9);

        exchange.set_price("XBTUSD", 186.0).await;
        task.handle_iteration().await.unwrap();
        assert!(matches!(
            task.state(),
            TaskState::InPosition { stage: StopStage::Zero, .. }
        ));
        let summary = task.explain();
        assert_eq!(summary.stop_stage, Some(StopStage::Zero));
        assert!((summary.active_stop.unwrap() - 166.0).abs() < 1e-9);

        exchange.set_price("XBTUSD", 201.0).await;
        task.handle_iteration().await.unwrap();
        assert!(matches!(
            task.state(),
            TaskState::InPosition { stage: StopStage::MinProfit, .. }
        ));
        // 状态摘要展示移动后的止损价
        let summary = task.subscribe_summary().borrow().clone();
        assert_eq!(summary.stop_stage, Some(StopStage::MinProfit));
        assert!(summary.relevant_levels().contains(&("stop", 175.0)));
        assert!(summary.explain().contains("stop_stage = MinProfit"));

        // 止损已抬到 175，176 不触发
        exchange.set_price("XBTUSD", 176.0).await;
        task.handle_iteration().await.unwrap();
        assert_eq!(task.state().kind(), TaskStateKind::InPosition);

        exchange.set_price("XBTUSD", 174.0).await;
        task.handle_iteration().await.unwrap();
        assert_eq!(task.state().kind(), TaskStateKind::Stop);
        // 止损单由交易所触发，止盈单已撤销
        let open = exchange.open_orders().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].0, stop);
        assert!((open[0].1.price - 175.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_take_cancels_stop() {
        let (mut task, exchange, _events) = zigzag_task(190.0, RecordingAlert::new(false)).await;
        task.handle_iteration().await.unwrap();
        exchange.set_price("XBTUSD", 150.0).await;
        task.handle_iteration().await.unwrap();

        exchange.set_price("XBTUSD", 221.0).await;
        task.handle_iteration().await.unwrap();
        assert_eq!(task.state().kind(), TaskStateKind::Take);
        let open = exchange.open_orders().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].1.request.order_type, OrderType::Limit);

        // 终态迭代不再访问交易所
        let calls = exchange.calls().await.len();
        task.handle_iteration().await.unwrap();
        assert_eq!(exchange.calls().await.len(), calls);
    }

    #[tokio::test]
    async fn test_error_escalation_with_alert() {
        let alert = RecordingAlert::new(false);
        let (mut task, exchange, _events) = zigzag_task(190.0, alert.clone()).await;
        exchange.fail_on("place_order").await;

        let err = task.handle_iteration().await.unwrap_err();
        assert!(matches!(err, TaskError::ExchangeCall { operation: "place_order", .. }));
        task.handle_error(err).await;

        assert_eq!(task.state().kind(), TaskStateKind::HandledError);
        assert!(!task.is_iterable());
        let messages = alert.messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Task[1]"));
    }

    #[tokio::test]
    async fn test_error_stays_unhandled_when_alert_fails() {
        let alert = RecordingAlert::new(true);
        let (mut task, exchange, _events) = zigzag_task(190.0, alert.clone()).await;
        exchange.fail_on("fetch_market_state").await;

        let err = task.handle_iteration().await.unwrap_err();
        task.handle_error(err).await;

        assert_eq!(task.state().kind(), TaskStateKind::UnhandledError);
        assert_eq!(alert.messages.lock().await.len(), 1);
        assert_eq!(task.explain().previous_state, Some(TaskStateKind::Initial));
    }

    #[tokio::test]
    async fn test_cancel_waiting_cancels_both_orders() {
        let (mut task, exchange, _events) = zigzag_task(190.0, RecordingAlert::new(false)).await;
        task.handle_iteration().await.unwrap();

        task.handle_cancel().await.unwrap();
        assert!(exchange.open_orders().await.is_empty());
        assert!(!task.is_iterable());
        assert!(task.subscribe_summary().borrow().cancelled);
    }

    #[tokio::test]
    async fn test_take_failure_cancels_placed_enter() {
        let (mut task, exchange, _events) = zigzag_task(190.0, RecordingAlert::new(false)).await;
        exchange.fail_nth("place_order", 2).await;

        let err = task.handle_iteration().await.unwrap_err();
        assert!(exchange.open_orders().await.is_empty());
        task.handle_error(err).await;

        assert_eq!(task.state().kind(), TaskStateKind::HandledError);
        assert!(task.explain().open_orders.is_empty());
    }

    #[tokio::test]
    async fn test_take_failure_tracks_enter_that_cannot_be_cancelled() {
        let (mut task, exchange, _events) = zigzag_task(190.0, RecordingAlert::new(false)).await;
        exchange.fail_nth("place_order", 2).await;
        exchange.fail_on("cancel_order").await;

        let err = task.handle_iteration().await.unwrap_err();
        task.handle_error(err).await;

        let live = exchange.open_orders().await;
        assert_eq!(live.len(), 1);
        let tracked = task.explain().open_orders;
        assert_eq!(tracked, vec![live[0].0.clone()]);
        assert!(matches!(task.state(), TaskState::HandledError { orders } if orders.len() == 1));

        // 错误状态撤销只记录挂单，不访问交易所
        let calls = exchange.calls().await.len();
        task.handle_cancel().await.unwrap();
        assert_eq!(exchange.calls().await.len(), calls);
    }

    #[tokio::test]
    async fn test_cancel_attempts_every_order() {
        let (mut task, exchange, _events) = zigzag_task(190.0, RecordingAlert::new(false)).await;
        task.handle_iteration().await.unwrap();
        exchange.fail_nth("cancel_order", 1).await;

        let err = task.handle_cancel().await.unwrap_err();
        assert!(matches!(err, TaskError::ExchangeCall { operation: "cancel_order", .. }));
        let cancels = |calls: Vec<String>| calls.iter().filter(|c| *c == "cancel_order").count();
        assert_eq!(cancels(exchange.calls().await), 2);
        // 入场单撤销失败，止盈单仍被撤掉
        let open = exchange.open_orders().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].1.request.side, OrderSide::Buy);

        // 再次撤销不访问交易所
        task.handle_cancel().await.unwrap();
        assert_eq!(cancels(exchange.calls().await), 2);
    }

    #[tokio::test]
    async fn test_cancel_in_error_state_keeps_orders() {
        let (mut task, exchange, _events) = zigzag_task(190.0, RecordingAlert::new(false)).await;
        task.handle_iteration().await.unwrap();
        task.handle_error(TaskError::InvalidRange("boom".to_string())).await;

        assert_eq!(task.explain().open_orders.len(), 2);

        let calls = exchange.calls().await.len();
        task.handle_cancel().await.unwrap();
        assert_eq!(exchange.calls().await.len(), calls);
        assert_eq!(exchange.open_orders().await.len(), 2);
    }

    #[tokio::test]
    async fn test_trend_orders_follow_line() {
        let exchange = Arc::new(PaperExchange::new("paper"));
        exchange.set_price("XBTUSD", 120.0).await;
        let mut config =
            TaskConfig::retracement(StrategyType::Zigzag, ExchangeId::Bitmex, 1000.0, 0.0, 0.0);
        config.mode = EntryMode::Trend;
        config.direction = Some(Side::Long);
        config.risk_amount = Some(10.0);
        config.line_start = Some(100.0);
        config.line_10 = Some(110.0);
        config.bottom = Some(91.0);
        config.candle_size = Some(CandleSize::H1);
        let computed = compute_levels(&config).unwrap();
        let (events, _rx) = broadcast::channel(16);
        let mut task = Task::new(
            2,
            config,
            computed,
            exchange.clone(),
            RecordingAlert::new(false),
            events,
        );

        task.set_start_time(Utc::now() - chrono::Duration::minutes(3 * 60 + 10));
        task.handle_iteration().await.unwrap();
        let current = task.current().unwrap();
        assert!((current.enter - 103.0).abs() < 1e-9);
        assert!((current.stop - 99.0).abs() < 1e-9);
        assert!((current.take - 115.0).abs() < 1e-9);

        task.set_start_time(Utc::now() - chrono::Duration::minutes(5 * 60 + 10));
        task.handle_iteration().await.unwrap();
        assert_eq!(task.state().kind(), TaskStateKind::Waiting);
        let prices: Vec<f64> = exchange
            .open_orders()
            .await
            .into_iter()
            .map(|(_, o)| o.price)
            .collect();
        assert!((prices[0] - 105.0).abs() < 1e-9);
        assert!((prices[1] - 119.0).abs() < 1e-9);

        // 任务开始后的新低扩展底部，止盈随之变远
        let open_time = Utc::now() - chrono::Duration::hours(1);
        exchange
            .push_candle(
                "XBTUSD",
                Kline {
                    open_time,
                    close_time: open_time + chrono::Duration::hours(1),
                    open: 100.0,
                    high: 101.0,
                    low: 85.0,
                    close: 100.0,
                    volume: 1.0,
                },
            )
            .await;
        task.handle_iteration().await.unwrap();
        let current = task.current().unwrap();
        assert_eq!(current.bottom, 85.0);
        assert!((current.take - 125.0).abs() < 1e-9);
    }
}
