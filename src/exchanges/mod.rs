// 交易所实现：真实交易所接入通过 ExchangeClient 注入，这里只提供模拟盘
pub mod paper;

pub use paper::{PaperExchange, PaperOrder, PaperOrderStatus};
