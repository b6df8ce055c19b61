use chrono::{DateTime, Utc};
/// 统一的类型定义模块
/// 交易能力层使用的订单、行情数据结构
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, crate::core::error::ExchangeError>;

/// 交易所标识，每个交易所对应一个账户
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExchangeId {
    Bitmex,
    Binance,
    Bybit,
    Huobi,
    Okex,
    Deribit,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 6] = [
        ExchangeId::Bitmex,
        ExchangeId::Binance,
        ExchangeId::Bybit,
        ExchangeId::Huobi,
        ExchangeId::Okex,
        ExchangeId::Deribit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Bitmex => "BITMEX",
            ExchangeId::Binance => "BINANCE",
            ExchangeId::Bybit => "BYBIT",
            ExchangeId::Huobi => "HUOBI",
            ExchangeId::Okex => "OKEX",
            ExchangeId::Deribit => "DERIBIT",
        }
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = crate::core::error::ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        ExchangeId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::core::error::ExchangeError::UnsupportedExchange(s.to_string()))
    }
}

// ============= 订单 =============

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    StopMarket,
}

/// 订单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: f64,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        amount: f64,
        price: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type,
            amount,
            price,
            client_order_id: None,
            reduce_only: false,
        }
    }

    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// 交易所返回的订单引用，后续移动/撤单都以此为准
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef {
    pub order_id: String,
    pub symbol: String,
}

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}@{}", self.order_id, self.symbol)
    }
}

// ============= 行情 =============

/// K线周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleSize {
    H1,
    H4,
}

impl CandleSize {
    pub fn duration(&self) -> chrono::Duration {
        match self {
            CandleSize::H1 => chrono::Duration::hours(1),
            CandleSize::H4 => chrono::Duration::hours(4),
        }
    }
}

/// K线数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 市场快照：最新价格 + 最近K线
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub symbol: String,
    pub last_price: f64,
    pub candles: Vec<Kline>,
    pub timestamp: DateTime<Utc>,
}

impl MarketState {
    pub fn new(symbol: impl Into<String>, last_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            last_price,
            candles: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// 指定时间之后（含）收盘K线的最低价
    pub fn lowest_low_since(&self, since: DateTime<Utc>) -> Option<f64> {
        self.candles
            .iter()
            .filter(|k| k.open_time >= since)
            .map(|k| k.low)
            .fold(None, |acc, low| Some(acc.map_or(low, |a: f64| a.min(low))))
    }

    /// 指定时间之后（含）收盘K线的最高价
    pub fn highest_high_since(&self, since: DateTime<Utc>) -> Option<f64> {
        self.candles
            .iter()
            .filter(|k| k.open_time >= since)
            .map(|k| k.high)
            .fold(None, |acc, high| Some(acc.map_or(high, |a: f64| a.max(high))))
    }
}
