use crate::core::types::{MarketState, OrderRef, OrderRequest, Result};
use async_trait::async_trait;

/// 交易所能力接口
///
/// 仓位任务只依赖这四个操作，不关心具体交易所的实现细节。
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 下单，返回交易所订单引用
    async fn place_order(&self, request: OrderRequest) -> Result<OrderRef>;

    /// 改价（原地移动挂单）
    async fn move_order(&self, order: &OrderRef, new_price: f64) -> Result<()>;

    /// 撤单
    async fn cancel_order(&self, order: &OrderRef) -> Result<()>;

    /// 获取最新价格和K线
    async fn fetch_market_state(&self, symbol: &str) -> Result<MarketState>;
}
