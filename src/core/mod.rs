// 核心模块 - 类型、错误、配置和外部能力接口
pub mod alert;
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use alert::{AlertSink, CompositeAlert, LogAlert};
pub use config::*;
pub use error::*;
pub use exchange::*;
pub use types::{
    CandleSize, ExchangeId, Kline, MarketState, OrderRef, OrderRequest, OrderSide, OrderType,
};
