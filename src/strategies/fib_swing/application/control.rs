//! 控制台：按行读取命令，调用执行器的控制接口

use anyhow::{anyhow, bail, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use super::executor::Executor;
use crate::core::types::ExchangeId;
use crate::exchanges::PaperExchange;
use crate::strategies::fib_swing::domain::{Side, StrategyType, TaskConfig, TaskStateKind};

const HELP: &str = "\
start <ZIGZAG|CAMEL|FLAT> <EXCHANGE> <FUND> <FIB_ZERO> <FIB_ONE> [SYMBOL]
trend <LONG|SHORT> <EXCHANGE> <FUND> <RISK> <LINE_START> <LINE_10> <BOTTOM> [SYMBOL]  (1h candles)
cancel <ID>
status [STATE]
ids
price <EXCHANGE> <SYMBOL> <PRICE>
ping
quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start(TaskConfig),
    Cancel(u64),
    Status(Option<TaskStateKind>),
    Ids,
    Price {
        exchange: ExchangeId,
        symbol: String,
        price: f64,
    },
    Ping,
    Help,
    Quit,
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (name, args) = parts
            .split_first()
            .ok_or_else(|| anyhow!("空命令"))?;

        match name.to_lowercase().as_str() {
            "start" => {
                if args.len() < 5 || args.len() > 6 {
                    bail!("用法: start <STRATEGY> <EXCHANGE> <FUND> <FIB_ZERO> <FIB_ONE> [SYMBOL]");
                }
                let strategy: StrategyType = args[0].parse()?;
                let exchange: ExchangeId = args[1].parse()?;
                let fund = parse_number(args[2], "fund")?;
                let fib_zero = parse_number(args[3], "fib_zero")?;
                let fib_one = parse_number(args[4], "fib_one")?;
                let mut config =
                    TaskConfig::retracement(strategy, exchange, fund, fib_zero, fib_one);
                if let Some(symbol) = args.get(5) {
                    config = config.with_symbol(symbol.to_uppercase());
                }
                Ok(ControlCommand::Start(config))
            }
            "trend" => {
                if args.len() < 7 || args.len() > 8 {
                    bail!("用法: trend <LONG|SHORT> <EXCHANGE> <FUND> <RISK> <LINE_START> <LINE_10> <BOTTOM> [SYMBOL]");
                }
                let direction: Side = args[0].parse()?;
                let exchange: ExchangeId = args[1].parse()?;
                let mut config = TaskConfig::trend(
                    direction,
                    exchange,
                    parse_number(args[2], "fund")?,
                    parse_number(args[3], "risk_amount")?,
                    parse_number(args[4], "line_start")?,
                    parse_number(args[5], "line_10")?,
                    parse_number(args[6], "bottom")?,
                );
                if let Some(symbol) = args.get(7) {
                    config = config.with_symbol(symbol.to_uppercase());
                }
                Ok(ControlCommand::Start(config))
            }
            "cancel" => {
                let id = args
                    .first()
                    .ok_or_else(|| anyhow!("用法: cancel <ID>"))?
                    .parse::<u64>()
                    .map_err(|_| anyhow!("任务ID必须是整数"))?;
                Ok(ControlCommand::Cancel(id))
            }
            "status" => {
                let filter = match args.first() {
                    Some(state) => Some(state.parse::<TaskStateKind>()?),
                    None => None,
                };
                Ok(ControlCommand::Status(filter))
            }
            "ids" => Ok(ControlCommand::Ids),
            "price" => {
                if args.len() != 3 {
                    bail!("用法: price <EXCHANGE> <SYMBOL> <PRICE>");
                }
                Ok(ControlCommand::Price {
                    exchange: args[0].parse()?,
                    symbol: args[1].to_uppercase(),
                    price: parse_number(args[2], "price")?,
                })
            }
            "ping" => Ok(ControlCommand::Ping),
            "help" => Ok(ControlCommand::Help),
            "quit" | "exit" => Ok(ControlCommand::Quit),
            other => bail!("未知命令: {}", other),
        }
    }
}

fn parse_number(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| anyhow!("{} 不是有效数字: {}", field, raw))
}

pub struct ControlConsole {
    executor: Arc<Executor>,
    paper: HashMap<ExchangeId, Arc<PaperExchange>>,
}

impl ControlConsole {
    pub fn new(executor: Arc<Executor>, paper: HashMap<ExchangeId, Arc<PaperExchange>>) -> Self {
        Self { executor, paper }
    }

    /// 执行一条命令，返回回复文本
    pub async fn execute(&self, command: ControlCommand) -> String {
        match command {
            ControlCommand::Start(config) => match self.executor.start_task(config).await {
                Ok(id) => format!("Task success started! id={}", id),
                Err(err) => format!("Task start failed: {}", err),
            },
            ControlCommand::Cancel(id) => self.executor.cancel_task(id).await.to_string(),
            ControlCommand::Status(filter) => {
                let summaries: Vec<String> = self
                    .executor
                    .get_status()
                    .await
                    .into_iter()
                    .filter(|s| filter.map_or(true, |state| s.state == state))
                    .map(|s| s.explain())
                    .collect();
                if summaries.is_empty() {
                    "No tasks".to_string()
                } else {
                    summaries.join("\n\n")
                }
            }
            ControlCommand::Ids => {
                let ids = self.executor.list_ids().await;
                if ids.is_empty() {
                    "No tasks".to_string()
                } else {
                    ids.iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            }
            ControlCommand::Price {
                exchange,
                symbol,
                price,
            } => match self.paper.get(&exchange) {
                Some(paper) => {
                    paper.set_price(&symbol, price).await;
                    format!("{} {} = {}", exchange, symbol, price)
                }
                None => format!("{} 不是模拟盘账户", exchange),
            },
            ControlCommand::Ping => "pong".to_string(),
            ControlCommand::Help => HELP.to_string(),
            ControlCommand::Quit => "bye".to_string(),
        }
    }

    /// 解析并执行一行输入，空行返回 None
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        match line.parse::<ControlCommand>() {
            Ok(command) => Some(self.execute(command).await),
            Err(err) => Some(err.to_string()),
        }
    }

    /// 从 stdin 读取命令，quit 时发出关闭信号
    pub async fn run_stdin(self, shutdown: watch::Sender<bool>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("控制台已就绪，输入 help 查看命令");

        while let Some(line) = lines.next_line().await? {
            let quit = matches!(line.parse::<ControlCommand>(), Ok(ControlCommand::Quit));
            if let Some(reply) = self.handle_line(&line).await {
                println!("{}", reply);
            }
            if quit {
                if shutdown.send(true).is_err() {
                    warn!("执行器已退出");
                }
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alert::LogAlert;
    use crate::core::exchange::ExchangeClient;
    use crate::cta::AccountManager;
    use crate::strategies::fib_swing::domain::EntryMode;
    use std::time::Duration;

    async fn console() -> (ControlConsole, Arc<PaperExchange>) {
        let paper = Arc::new(PaperExchange::new("paper-bitmex"));
        paper.set_price("XBTUSD", 190.0).await;
        let mut accounts = AccountManager::new();
        accounts.add_exchange_instance(ExchangeId::Bitmex, paper.clone());
        let executor = Arc::new(Executor::new(
            Arc::new(accounts),
            Arc::new(LogAlert),
            Duration::from_secs(1),
        ));
        let mut papers = HashMap::new();
        papers.insert(ExchangeId::Bitmex, paper.clone());
        (ControlConsole::new(executor, papers), paper)
    }

    #[test]
    fn test_parse_commands() {
        let start: ControlCommand = "start zigzag bitmex 1000 100 200 ethusd".parse().unwrap();
        match start {
            ControlCommand::Start(config) => {
                assert_eq!(config.strategy, StrategyType::Zigzag);
                assert_eq!(config.exchange, ExchangeId::Bitmex);
                assert_eq!(config.symbol, "ETHUSD");
                assert_eq!(config.fib_one, 200.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        let trend: ControlCommand = "trend long bitmex 1000 10 100 110 91".parse().unwrap();
        match trend {
            ControlCommand::Start(config) => {
                assert_eq!(config.mode, EntryMode::Trend);
                assert_eq!(config.direction, Some(Side::Long));
                assert_eq!(config.risk_amount, Some(10.0));
                assert_eq!(config.bottom, Some(91.0));
                assert_eq!(config.symbol, "XBTUSD");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!("trend sideways bitmex 1000 10 100 110 91".parse::<ControlCommand>().is_err());
        assert!("trend long bitmex 1000 10 100".parse::<ControlCommand>().is_err());

        assert_eq!("cancel 3".parse::<ControlCommand>().unwrap(), ControlCommand::Cancel(3));
        assert_eq!(
            "status waiting".parse::<ControlCommand>().unwrap(),
            ControlCommand::Status(Some(TaskStateKind::Waiting))
        );
        assert!("status SLEEPING".parse::<ControlCommand>().is_err());
        assert!("start ZIGZAG BITMEX abc 1 2".parse::<ControlCommand>().is_err());
        assert!("cancel".parse::<ControlCommand>().is_err());
        assert!("launch".parse::<ControlCommand>().is_err());
    }

    #[tokio::test]
    async fn test_console_round_trip() {
        let (console, paper) = console().await;

        assert_eq!(console.handle_line("ping").await.unwrap(), "pong");
        assert_eq!(console.handle_line("   ").await, None);
        assert_eq!(console.handle_line("ids").await.unwrap(), "No tasks");

        let reply = console.handle_line("start ZIGZAG BITMEX 1000 100 200").await.unwrap();
        assert_eq!(reply, "Task success started! id=1");
        assert_eq!(console.handle_line("ids").await.unwrap(), "1");

        let status = console.handle_line("status INITIAL").await.unwrap();
        assert!(status.contains("state = INITIAL"));
        assert!(status.contains("enter = 163.00"));
        assert_eq!(console.handle_line("status TAKE").await.unwrap(), "No tasks");

        console.handle_line("price BITMEX XBTUSD 150").await.unwrap();
        assert_eq!(
            paper.fetch_market_state("XBTUSD").await.unwrap().last_price,
            150.0
        );
        assert!(console
            .handle_line("price BYBIT XBTUSD 150")
            .await
            .unwrap()
            .contains("不是模拟盘账户"));

        let reply = console.handle_line("trend LONG BITMEX 1000 10 100 110 91").await.unwrap();
        assert_eq!(reply, "Task success started! id=2");
        assert_eq!(console.handle_line("ids").await.unwrap(), "1, 2");

        assert_eq!(console.handle_line("cancel 1").await.unwrap(), "Success task cancel");
        assert_eq!(console.handle_line("cancel 1").await.unwrap(), "Unknown task");
    }
}
