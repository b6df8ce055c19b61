use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use swingcta::{
    core::{
        alert::{AlertSink, CompositeAlert, LogAlert},
        config::{AlertConfig, AppConfig},
    },
    cta::AccountManager,
    strategies::fib_swing::{compute_levels, ControlConsole, Executor},
    utils::{init_logger, SmscPhoneCall, WeComAlert},
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenv::dotenv().ok();

    // 解析命令行参数
    let matches = Command::new("swingcta")
        .version("0.1")
        .about("斐波那契回撤波段交易")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/swing.yaml"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("只计算并打印任务价位，不下单")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-console")
                .long("no-console")
                .help("不从标准输入读取控制命令")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/swing.yaml");
    let app_config = AppConfig::from_file(config_file)
        .with_context(|| format!("加载配置失败: {}", config_file))?;

    init_logger(&app_config.log)?;
    log::info!("📋 配置已加载: {}", config_file);

    if matches.get_flag("dry-run") {
        for task in &app_config.tasks {
            match compute_levels(task) {
                Ok(levels) => log::info!(
                    "{} {} {}: {}",
                    task.strategy,
                    task.exchange,
                    task.symbol,
                    serde_json::to_string(&levels)?
                ),
                Err(e) => log::error!("{} {} {}: {}", task.strategy, task.exchange, task.symbol, e),
            }
        }
        return Ok(());
    }

    // 创建账户管理器
    let mut account_manager = AccountManager::new();
    let mut paper_accounts = HashMap::new();
    for account in &app_config.accounts {
        match account_manager.add_paper_account(account).await {
            Ok(Some(paper)) => {
                paper_accounts.insert(account.exchange, paper);
            }
            Ok(None) => {}
            Err(e) => log::warn!("⚠️ 添加账户 {} 失败: {}", account.exchange, e),
        }
    }

    log::info!("✅ 可用账户: {:?}", account_manager.exchanges());

    let alert = build_alert_sink(&app_config.alert);
    let executor = Arc::new(Executor::new(
        Arc::new(account_manager),
        alert,
        Duration::from_secs(app_config.loop_interval_secs),
    ));

    let started = executor.start_all(app_config.tasks.clone()).await;
    log::info!("✅ 已启动 {} 个任务", started.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = executor.spawn(shutdown_rx.clone());

    if !matches.get_flag("no-console") {
        let console = ControlConsole::new(executor.clone(), paper_accounts);
        let console_shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = console.run_stdin(console_shutdown).await {
                log::error!("控制台退出: {}", e);
            }
        });
    }

    // 等待退出信号
    let mut quit = shutdown_rx;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("收到退出信号，正在停止执行器...");
        }
        _ = quit.changed() => {
            log::info!("控制台请求退出，正在停止执行器...");
        }
    }

    // 控制台可能已经发过，忽略发送结果
    let _ = shutdown_tx.send(true);
    scheduler.await?;

    for summary in executor.get_status().await {
        if !summary.open_orders.is_empty() {
            log::warn!(
                "Task[{}] 退出时仍持有挂单 ({}): {:?}",
                summary.id,
                summary.state,
                summary.open_orders
            );
        }
    }
    log::info!("执行器已停止");
    Ok(())
}

/// 按配置组合告警通道，未配置或创建失败时退回日志告警
fn build_alert_sink(config: &AlertConfig) -> Arc<dyn AlertSink> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();

    if let Some(smsc) = &config.smsc {
        match SmscPhoneCall::from_config(smsc) {
            Ok(call) => sinks.push(Arc::new(call)),
            Err(e) => log::warn!("⚠️ SMSC 告警不可用: {}", e),
        }
    }
    if let Some(wechat) = &config.wechat_work {
        match WeComAlert::new(wechat.clone()) {
            Ok(webhook) => sinks.push(Arc::new(webhook)),
            Err(e) => log::warn!("⚠️ 企业微信告警不可用: {}", e),
        }
    }

    let composite = CompositeAlert::new(sinks);
    if composite.is_empty() {
        log::warn!("⚠️ 未配置告警通道，错误只写入日志");
        return Arc::new(LogAlert);
    }
    Arc::new(composite)
}
