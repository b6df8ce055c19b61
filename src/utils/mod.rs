// 工具模块 - 日志、订单ID、告警通道
pub mod order_id;
pub mod phone_call;
pub mod unified_logger;
pub mod webhook;

pub use order_id::{OrderIdGenerator, OrderRole};
pub use phone_call::SmscPhoneCall;
pub use unified_logger::{init_logger, LogConfig};
pub use webhook::WeComAlert;
