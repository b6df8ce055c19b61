/// 客户端订单ID生成器
///
/// 为每个任务的每张挂单生成唯一且可识别的订单ID，格式:
/// [SW][任务ID][分隔符][角色][时间戳][序列号]
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::types::ExchangeId;

const STRATEGY_CODE: &str = "SW";

/// 交易所订单ID规则
#[derive(Debug, Clone)]
pub struct ExchangeOrderIdRules {
    pub max_length: usize,
    pub allow_dash: bool,
    pub case_sensitive: bool,
}

impl ExchangeOrderIdRules {
    pub fn for_exchange(exchange: ExchangeId) -> Self {
        match exchange {
            // Binance: 不允许横线
            ExchangeId::Binance => Self {
                max_length: 36,
                allow_dash: false,
                case_sensitive: true,
            },
            // OKX: 不区分大小写
            ExchangeId::Okex => Self {
                max_length: 32,
                allow_dash: true,
                case_sensitive: false,
            },
            ExchangeId::Bitmex | ExchangeId::Bybit => Self {
                max_length: 36,
                allow_dash: true,
                case_sensitive: true,
            },
            ExchangeId::Huobi | ExchangeId::Deribit => Self {
                max_length: 32,
                allow_dash: true,
                case_sensitive: true,
            },
        }
    }
}

/// 挂单在任务中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Enter,
    Take,
    Stop,
}

impl OrderRole {
    fn tag(&self) -> &'static str {
        match self {
            OrderRole::Enter => "EN",
            OrderRole::Take => "TK",
            OrderRole::Stop => "ST",
        }
    }
}

/// 订单ID生成器（每个任务一个）
pub struct OrderIdGenerator {
    task_id: u64,
    sequence: AtomicU32,
    rules: ExchangeOrderIdRules,
}

impl OrderIdGenerator {
    pub fn new(task_id: u64, exchange: ExchangeId) -> Self {
        Self {
            task_id,
            sequence: AtomicU32::new(0),
            rules: ExchangeOrderIdRules::for_exchange(exchange),
        }
    }

    /// 生成订单ID
    pub fn generate(&self, role: OrderRole) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let separator = if self.rules.allow_dash { "-" } else { "" };

        let mut order_id = format!(
            "{}{}{}{}{}{:04}",
            STRATEGY_CODE,
            self.task_id,
            separator,
            role.tag(),
            Self::generate_timestamp(),
            seq % 10000
        );

        // 确保不超过最大长度
        if order_id.len() > self.rules.max_length {
            order_id.truncate(self.rules.max_length);
        }

        if !self.rules.case_sensitive {
            order_id = order_id.to_uppercase();
        }

        order_id
    }

    /// 紧凑时间戳: MMDDHHMM
    fn generate_timestamp() -> String {
        Utc::now().format("%m%d%H%M").to_string()
    }
}
