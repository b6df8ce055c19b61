use serde::{Deserialize, Serialize};

use super::config::Side;

/// 入场/止盈挂单需要移动的最小相对变化（百分比）
pub const MOVE_THRESHOLD_PERCENT: f64 = 0.05;

/// 趋势模式的趋势线投影
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendProjection {
    /// 每根K线的趋势线步长
    pub step: f64,
    /// 第20根K线时的趋势线价格
    pub line_20: f64,
    /// 趋势线方向：上升为 +1，下降为 -1
    pub slope_sign: f64,
}

/// 计算得到的价位，任务启动前写入一次，之后只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedLevels {
    pub side: Side,
    pub enter_price: f64,
    pub stop_price: f64,
    pub zero_price: f64,
    pub take_price: f64,
    pub to_zero_trigger_price: f64,
    pub min_profit_price: f64,
    pub to_min_profit_trigger_price: f64,
    /// 入场到止损的百分比距离（含滑点缓冲）
    pub stop_indent: f64,
    pub leverage: f64,
    pub enter_amount: f64,
    pub stop_amount: f64,
    pub zero_amount: f64,
    pub min_profit_amount: f64,
    pub take_amount: f64,
    #[serde(default)]
    pub trend: Option<TrendProjection>,
}

impl ComputedLevels {
    /// 价格是否已到达（穿越）某价位，方向按仓位盈利方向判断
    pub fn reached_in_profit(&self, price: f64, level: f64) -> bool {
        match self.side {
            Side::Long => price >= level,
            Side::Short => price <= level,
        }
    }

    /// 价格是否已到达（穿越）某价位，方向按仓位亏损方向判断
    pub fn reached_in_loss(&self, price: f64, level: f64) -> bool {
        match self.side {
            Side::Long => price <= level,
            Side::Short => price >= level,
        }
    }
}

/// 当前工作价位，入场前可随行情结构刷新
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkingLevels {
    pub bottom: f64,
    pub enter: f64,
    pub stop: f64,
    pub take: f64,
    pub amount: f64,
}

impl WorkingLevels {
    /// 入场价或止盈价是否有实质性变化
    pub fn moved_materially(&self, other: &WorkingLevels) -> bool {
        relative_change_percent(self.enter, other.enter) > MOVE_THRESHOLD_PERCENT
            || relative_change_percent(self.take, other.take) > MOVE_THRESHOLD_PERCENT
    }
}

fn relative_change_percent(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return if new == 0.0 { 0.0 } else { f64::INFINITY };
    }
    ((new - old) / old).abs() * 100.0
}
