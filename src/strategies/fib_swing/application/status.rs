use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::{ExchangeId, OrderRef};
use crate::strategies::fib_swing::domain::{
    ComputedLevels, EntryMode, StopStage, StrategyType, TaskStateKind, WorkingLevels,
};

/// 任务状态摘要，状态查询只读取它，不触碰任务本身
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: u64,
    pub state: TaskStateKind,
    pub previous_state: Option<TaskStateKind>,
    pub strategy: StrategyType,
    pub mode: EntryMode,
    pub exchange: ExchangeId,
    pub symbol: String,
    pub computed: ComputedLevels,
    pub current: Option<WorkingLevels>,
    pub open_orders: Vec<OrderRef>,
    /// 持仓时止损所处阶段
    pub stop_stage: Option<StopStage>,
    /// 持仓时交易所上止损单的实际价格
    pub active_stop: Option<f64>,
    pub cancelled: bool,
    pub start_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSummary {
    /// 当前状态下最相关的价位
    pub fn relevant_levels(&self) -> Vec<(&'static str, f64)> {
        let c = &self.computed;
        let (enter, stop, take) = match &self.current {
            Some(w) => (w.enter, w.stop, w.take),
            None => (c.enter_price, c.stop_price, c.take_price),
        };
        match self.state {
            TaskStateKind::Initial | TaskStateKind::Waiting => vec![
                ("enter", enter),
                ("take", take),
                ("stop", stop),
                ("amount", c.enter_amount),
                ("leverage", c.leverage),
            ],
            TaskStateKind::InPosition => vec![
                ("stop", self.active_stop.unwrap_or(stop)),
                ("take", take),
                ("zero", c.zero_price),
                ("to_zero_trigger", c.to_zero_trigger_price),
                ("min_profit", c.min_profit_price),
                ("to_min_profit_trigger", c.to_min_profit_trigger_price),
            ],
            TaskStateKind::Stop => vec![("stop", stop), ("stop_amount", c.stop_amount)],
            TaskStateKind::Take => vec![("take", take), ("take_amount", c.take_amount)],
            TaskStateKind::UnhandledError | TaskStateKind::HandledError => vec![
                ("enter", enter),
                ("stop", stop),
                ("take", take),
            ],
        }
    }

    /// 多行文本，每行 key = value
    pub fn explain(&self) -> String {
        let mut lines = vec![
            format!("id = {}", self.id),
            format!("state = {}", self.state),
        ];
        if let Some(previous) = self.previous_state {
            lines.push(format!("previous_state = {}", previous));
        }
        lines.push(format!("strategy = {}", self.strategy));
        lines.push(format!("exchange = {}", self.exchange));
        lines.push(format!("symbol = {}", self.symbol));
        lines.push(format!("side = {}", self.computed.side));
        if let Some(stage) = self.stop_stage {
            lines.push(format!("stop_stage = {:?}", stage));
        }
        for (name, value) in self.relevant_levels() {
            lines.push(format!("{} = {:.2}", name, value));
        }
        for order in &self.open_orders {
            lines.push(format!("order = {}", order));
        }
        lines.push(format!(
            "start_time = {}",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        lines.join("\n")
    }
}

/// 状态变化事件
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub task_id: u64,
    pub from: TaskStateKind,
    pub to: TaskStateKind,
    pub at: DateTime<Utc>,
}
