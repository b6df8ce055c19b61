//! 波段任务配置模块

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::TaskError;
use crate::core::types::{CandleSize, ExchangeId, OrderSide};

/// 回撤形态（决定使用哪一组斐波那契比例）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyType {
    Zigzag,
    Camel,
    Flat,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::Zigzag => "ZIGZAG",
            StrategyType::Camel => "CAMEL",
            StrategyType::Flat => "FLAT",
        }
    }

    /// 形态对应的七个回撤比例
    ///
    /// ZIGZAG 与 CAMEL 共用同一组比例。
    pub fn ratios(&self) -> FibRatios {
        match self {
            StrategyType::Zigzag | StrategyType::Camel => FibRatios {
                enter: 0.63,
                stop: 0.38,
                zero: 0.66,
                take: 1.2,
                to_zero_trigger: 0.85,
                min_profit: 0.75,
                to_min_profit_trigger: 1.0,
            },
            StrategyType::Flat => FibRatios {
                enter: 0.5,
                stop: 0.236,
                zero: 0.53,
                take: 1.0,
                to_zero_trigger: 0.7,
                min_profit: 0.618,
                to_min_profit_trigger: 0.85,
            },
        }
    }
}

impl std::fmt::Display for StrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ZIGZAG" => Ok(StrategyType::Zigzag),
            "CAMEL" => Ok(StrategyType::Camel),
            "FLAT" => Ok(StrategyType::Flat),
            other => Err(TaskError::InvalidConfig(format!("未知的形态: {}", other))),
        }
    }
}

/// 一组回撤比例，0 对应 fib_zero，1 对应 fib_one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibRatios {
    pub enter: f64,
    pub stop: f64,
    pub zero: f64,
    pub take: f64,
    pub to_zero_trigger: f64,
    pub min_profit: f64,
    pub to_min_profit_trigger: f64,
}

/// 仓位方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// 开仓订单方向
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// 价格朝盈利方向移动时为 +1
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

impl FromStr for Side {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            other => Err(TaskError::InvalidConfig(format!("未知的方向: {}", other))),
        }
    }
}

/// 入场判定模式，两种模式互斥
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryMode {
    /// 斐波那契回撤入场
    #[default]
    Retracement,
    /// 趋势线确认入场
    Trend,
}

fn default_symbol() -> String {
    "XBTUSD".to_string()
}

fn default_max_fund_loss_percent() -> f64 {
    10.0
}

/// 波段任务配置，任务启动后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// 回撤形态
    pub strategy: StrategyType,

    /// 交易所
    pub exchange: ExchangeId,

    /// 交易对
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// 账户总资金
    pub fund: f64,

    /// 斐波那契 0 位价格
    #[serde(default)]
    pub fib_zero: f64,

    /// 斐波那契 1 位价格
    #[serde(default)]
    pub fib_one: f64,

    /// 止损时允许亏损的资金百分比
    #[serde(default = "default_max_fund_loss_percent")]
    pub max_fund_loss_percent: f64,

    /// 入场模式
    #[serde(default)]
    pub mode: EntryMode,

    /// 趋势模式：固定风险金额
    #[serde(default)]
    pub risk_amount: Option<f64>,

    /// 趋势模式：趋势线起点价格
    #[serde(default)]
    pub line_start: Option<f64>,

    /// 趋势模式：10根K线后的趋势线价格
    #[serde(default)]
    pub line_10: Option<f64>,

    /// 趋势模式：方向
    #[serde(default)]
    pub direction: Option<Side>,

    /// 趋势模式：当前底部（做空时为顶部）
    #[serde(default)]
    pub bottom: Option<f64>,

    /// 趋势模式：K线周期
    #[serde(default)]
    pub candle_size: Option<CandleSize>,
}

impl TaskConfig {
    /// 回撤模式配置
    pub fn retracement(
        strategy: StrategyType,
        exchange: ExchangeId,
        fund: f64,
        fib_zero: f64,
        fib_one: f64,
    ) -> Self {
        Self {
            strategy,
            exchange,
            symbol: default_symbol(),
            fund,
            fib_zero,
            fib_one,
            max_fund_loss_percent: default_max_fund_loss_percent(),
            mode: EntryMode::Retracement,
            risk_amount: None,
            line_start: None,
            line_10: None,
            direction: None,
            bottom: None,
            candle_size: None,
        }
    }

    /// 趋势模式配置，K线周期默认 1 小时
    pub fn trend(
        direction: Side,
        exchange: ExchangeId,
        fund: f64,
        risk_amount: f64,
        line_start: f64,
        line_10: f64,
        bottom: f64,
    ) -> Self {
        Self {
            mode: EntryMode::Trend,
            risk_amount: Some(risk_amount),
            line_start: Some(line_start),
            line_10: Some(line_10),
            direction: Some(direction),
            bottom: Some(bottom),
            ..Self::retracement(StrategyType::Zigzag, exchange, fund, 0.0, 0.0)
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn with_max_fund_loss_percent(mut self, percent: f64) -> Self {
        self.max_fund_loss_percent = percent;
        self
    }
}
