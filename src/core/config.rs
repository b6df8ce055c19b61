use crate::core::error::ExchangeError;
use crate::core::types::ExchangeId;
use crate::strategies::fib_swing::TaskConfig;
use crate::utils::unified_logger::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

fn default_loop_interval_secs() -> u64 {
    5
}

/// 应用主配置（config/swing.yaml）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 调度循环间隔（秒）
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub alert: AlertConfig,
    /// 启动时直接创建的任务
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl AppConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败 {}: {}", path, e)))?;
        let config: AppConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.loop_interval_secs == 0 {
            return Err(ExchangeError::ConfigError(
                "loop_interval_secs 必须大于0".to_string(),
            ));
        }
        let mut seen = Vec::new();
        for account in &self.accounts {
            if seen.contains(&account.exchange) {
                return Err(ExchangeError::ConfigError(format!(
                    "交易所 {} 配置了多个账户",
                    account.exchange
                )));
            }
            seen.push(account.exchange);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            loop_interval_secs: default_loop_interval_secs(),
            log: LogConfig::default(),
            accounts: Vec::new(),
            alert: AlertConfig::default(),
            tasks: Vec::new(),
        }
    }
}

/// 账户配置，每个交易所一个
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub exchange: ExchangeId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 模拟盘初始价格（交易对 -> 价格）
    #[serde(default)]
    pub initial_prices: HashMap<String, f64>,
}

fn default_true() -> bool {
    true
}

/// 告警配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub smsc: Option<SmscConfig>,
    #[serde(default)]
    pub wechat_work: Option<WeChatWorkConfig>,
}

/// SMSC 语音呼叫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmscConfig {
    pub login: String,
    /// 密码所在的环境变量名
    pub password_env: String,
    /// 逗号分隔的号码
    pub phones: String,
}

/// 企业微信 webhook 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeChatWorkConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub mentioned_mobile_list: Vec<String>,
}

/// 从环境变量读取单个密钥
pub fn secret_from_env(name: &str) -> Result<String, ExchangeError> {
    dotenv::dotenv().ok();
    std::env::var(name).map_err(|_| ExchangeError::ConfigError(format!("未找到环境变量 {}", name)))
}
