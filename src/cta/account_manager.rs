use crate::core::{
    config::AccountConfig, error::ExchangeError, exchange::ExchangeClient, types::ExchangeId,
    types::Result,
};
use crate::exchanges::PaperExchange;
use std::collections::HashMap;
use std::sync::Arc;

/// 账户管理器：每个交易所一个交易能力实例
#[derive(Default)]
pub struct AccountManager {
    accounts: HashMap<ExchangeId, Arc<dyn ExchangeClient>>,
}

impl AccountManager {
    /// 创建账户管理器
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    /// 按配置添加模拟盘账户，未启用的账户返回 None
    pub async fn add_paper_account(
        &mut self,
        account_config: &AccountConfig,
    ) -> Result<Option<Arc<PaperExchange>>> {
        if !account_config.enabled {
            log::info!("账户 {} 未启用，跳过", account_config.exchange);
            return Ok(None);
        }
        if self.accounts.contains_key(&account_config.exchange) {
            return Err(ExchangeError::ConfigError(format!(
                "账户 {} 重复配置",
                account_config.exchange
            )));
        }

        let paper = Arc::new(PaperExchange::new(format!(
            "paper-{}",
            account_config.exchange.as_str().to_lowercase()
        )));
        for (symbol, price) in &account_config.initial_prices {
            paper.set_price(symbol, *price).await;
        }
        self.add_exchange_instance(account_config.exchange, paper.clone());
        Ok(Some(paper))
    }

    /// 直接添加交易所实例
    pub fn add_exchange_instance(&mut self, exchange: ExchangeId, client: Arc<dyn ExchangeClient>) {
        log::info!("成功添加账户: {} ({})", exchange, client.name());
        self.accounts.insert(exchange, client);
    }

    /// 获取账户
    pub fn get_account(&self, exchange: ExchangeId) -> Result<Arc<dyn ExchangeClient>> {
        self.accounts
            .get(&exchange)
            .cloned()
            .ok_or_else(|| ExchangeError::UnsupportedExchange(exchange.to_string()))
    }

    pub fn exchanges(&self) -> Vec<ExchangeId> {
        let mut ids: Vec<ExchangeId> = self.accounts.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paper_accounts() {
        let mut manager = AccountManager::new();
        let mut prices = HashMap::new();
        prices.insert("XBTUSD".to_string(), 150.0);
        let bitmex = AccountConfig {
            exchange: ExchangeId::Bitmex,
            enabled: true,
            initial_prices: prices,
        };
        let paper = manager.add_paper_account(&bitmex).await.unwrap();
        assert_eq!(paper.unwrap().name(), "paper-bitmex");
        assert!(manager.add_paper_account(&bitmex).await.is_err());

        let skipped = manager
            .add_paper_account(&AccountConfig {
                exchange: ExchangeId::Bybit,
                enabled: false,
                initial_prices: HashMap::new(),
            })
            .await
            .unwrap();
        assert!(skipped.is_none());

        assert_eq!(manager.exchanges(), vec![ExchangeId::Bitmex]);
        let client = manager.get_account(ExchangeId::Bitmex).unwrap();
        assert_eq!(client.fetch_market_state("XBTUSD").await.unwrap().last_price, 150.0);
        assert!(matches!(
            manager.get_account(ExchangeId::Bybit),
            Err(ExchangeError::UnsupportedExchange(_))
        ));
    }
}
