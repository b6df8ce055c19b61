//! 模拟盘交易所
//!
//! 订单只记录在内存中，价格由外部设置。用于 dry-run 和测试。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::core::error::ExchangeError;
use crate::core::exchange::ExchangeClient;
use crate::core::types::{Kline, MarketState, OrderRef, OrderRequest, Result};

/// 模拟订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperOrderStatus {
    Open,
    Canceled,
}

/// 模拟订单
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub request: OrderRequest,
    pub price: f64,
    pub status: PaperOrderStatus,
}

#[derive(Default)]
struct PaperBook {
    prices: HashMap<String, f64>,
    candles: HashMap<String, Vec<Kline>>,
    orders: BTreeMap<u64, PaperOrder>,
    next_order_id: u64,
    calls: Vec<String>,
    failing: HashSet<&'static str>,
    /// 只失败一次：操作名 -> 还剩几次调用后失败
    fail_once: HashMap<&'static str, usize>,
}

impl PaperBook {
    fn record(&mut self, operation: &'static str) -> Result<()> {
        self.calls.push(operation.to_string());
        let scheduled = match self.fail_once.get_mut(operation) {
            Some(left) => {
                *left -= 1;
                *left == 0
            }
            None => false,
        };
        if scheduled {
            self.fail_once.remove(operation);
        }
        if scheduled || self.failing.contains(operation) {
            return Err(ExchangeError::ApiError {
                code: 503,
                message: format!("模拟 {} 失败", operation),
            });
        }
        Ok(())
    }

    fn order_mut(&mut self, order: &OrderRef) -> Result<&mut PaperOrder> {
        order
            .order_id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.orders.get_mut(&id))
            .ok_or_else(|| ExchangeError::OrderNotFound {
                order_id: order.order_id.clone(),
                symbol: order.symbol.clone(),
            })
    }
}

/// 内存模拟交易所
pub struct PaperExchange {
    name: String,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            book: Mutex::new(PaperBook::default()),
        }
    }

    /// 设置最新价格
    pub async fn set_price(&self, symbol: &str, price: f64) {
        let mut book = self.book.lock().await;
        book.prices.insert(symbol.to_string(), price);
    }

    /// 追加一根K线
    pub async fn push_candle(&self, symbol: &str, candle: Kline) {
        let mut book = self.book.lock().await;
        book.candles.entry(symbol.to_string()).or_default().push(candle);
    }

    /// 让某个操作此后一直失败，用于演练错误升级
    pub async fn fail_on(&self, operation: &'static str) {
        self.book.lock().await.failing.insert(operation);
    }

    /// 让某个操作的第 nth 次调用（从现在起，1 开始）失败一次
    pub async fn fail_nth(&self, operation: &'static str, nth: usize) {
        if nth > 0 {
            self.book.lock().await.fail_once.insert(operation, nth);
        }
    }

    pub async fn recover(&self, operation: &'static str) {
        self.book.lock().await.failing.remove(operation);
    }

    /// 已调用的操作名称（按顺序）
    pub async fn calls(&self) -> Vec<String> {
        self.book.lock().await.calls.clone()
    }

    pub async fn open_orders(&self) -> Vec<(OrderRef, PaperOrder)> {
        let book = self.book.lock().await;
        book.orders
            .iter()
            .filter(|(_, order)| order.status == PaperOrderStatus::Open)
            .map(|(id, order)| {
                (
                    OrderRef {
                        order_id: id.to_string(),
                        symbol: order.request.symbol.clone(),
                    },
                    order.clone(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderRef> {
        let mut book = self.book.lock().await;
        book.record("place_order")?;

        if !(request.amount.is_finite() && request.amount > 0.0) {
            return Err(ExchangeError::OrderError(format!(
                "数量无效: {}",
                request.amount
            )));
        }

        book.next_order_id += 1;
        let order_id = book.next_order_id;
        let order_ref = OrderRef {
            order_id: order_id.to_string(),
            symbol: request.symbol.clone(),
        };
        log::debug!(
            "[{}] 模拟下单 #{} {} {:?} {} @ {}",
            self.name,
            order_id,
            request.side,
            request.order_type,
            request.amount,
            request.price
        );
        book.orders.insert(
            order_id,
            PaperOrder {
                price: request.price,
                request,
                status: PaperOrderStatus::Open,
            },
        );
        Ok(order_ref)
    }

    async fn move_order(&self, order: &OrderRef, new_price: f64) -> Result<()> {
        let mut book = self.book.lock().await;
        book.record("move_order")?;
        let paper = book.order_mut(order)?;
        if paper.status != PaperOrderStatus::Open {
            return Err(ExchangeError::OrderError(format!("订单 {} 已撤销，无法改价", order)));
        }
        paper.price = new_price;
        Ok(())
    }

    async fn cancel_order(&self, order: &OrderRef) -> Result<()> {
        let mut book = self.book.lock().await;
        book.record("cancel_order")?;
        // 重复撤单视为成功
        book.order_mut(order)?.status = PaperOrderStatus::Canceled;
        Ok(())
    }

    async fn fetch_market_state(&self, symbol: &str) -> Result<MarketState> {
        let mut book = self.book.lock().await;
        book.record("fetch_market_state")?;
        let last_price = *book
            .prices
            .get(symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;
        Ok(MarketState {
            symbol: symbol.to_string(),
            last_price,
            candles: book.candles.get(symbol).cloned().unwrap_or_default(),
            timestamp: Utc::now(),
        })
    }
}
