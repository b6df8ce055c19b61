use thiserror::Error;

/// 交易所能力层错误
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("订单错误: {0}")]
    OrderError(String),

    #[error("订单未找到: ID {order_id} (交易对: {symbol})")]
    OrderNotFound { order_id: String, symbol: String },

    #[error("交易对未找到: {0}")]
    SymbolNotFound(String),

    #[error("不支持的交易所: {0}")]
    UnsupportedExchange(String),

    #[error("配置错误: {0}")]
    ConfigError(String),
}

/// 告警通道错误
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("告警请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("告警服务返回异常: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("告警配置错误: {0}")]
    Config(String),
}
