/// 统一日志初始化
/// 控制台输出 + 按大小滚动的日志文件
use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::{Deserialize, Serialize};
use std::path::Path;

const LOG_FILE_NAME: &str = "swingcta";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub root_dir: String,
    pub default_level: String,
    pub max_file_size_mb: u64,
    /// 保留的滚动文件个数
    pub retention_files: u32,
    pub console_output: bool,
    /// log4rs 格式
    pub pattern: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            root_dir: "logs".to_string(),
            default_level: "INFO".to_string(),
            max_file_size_mb: 10,
            retention_files: 30,
            console_output: true,
            pattern: "[{d(%Y-%m-%d %H:%M:%S%.3f)}] [{l}] [{M}] {m}{n}".to_string(),
        }
    }
}

impl LogConfig {
    pub fn level(&self) -> Result<LevelFilter> {
        self.default_level
            .parse::<LevelFilter>()
            .with_context(|| format!("无效的日志级别: {}", self.default_level))
    }

    fn build(&self) -> Result<Config> {
        let level = self.level()?;
        let root_dir = Path::new(&self.root_dir);
        let active = root_dir.join(format!("{}.log", LOG_FILE_NAME));
        let archive = root_dir.join(format!("{}.{{}}.log", LOG_FILE_NAME));

        let roller = FixedWindowRoller::builder()
            .build(&archive.to_string_lossy(), self.retention_files.max(1))
            .context("创建日志滚动策略失败")?;
        let trigger = SizeTrigger::new(self.max_file_size_mb.max(1) * 1024 * 1024);
        let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

        let file = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(&self.pattern)))
            .build(active, Box::new(policy))
            .context("创建日志文件失败")?;

        let mut builder =
            Config::builder().appender(Appender::builder().build("file", Box::new(file)));
        let mut root = Root::builder().appender("file");

        if self.console_output {
            let console = ConsoleAppender::builder()
                .encoder(Box::new(PatternEncoder::new(&self.pattern)))
                .build();
            builder = builder.appender(Appender::builder().build("console", Box::new(console)));
            root = root.appender("console");
        }

        builder.build(root.build(level)).context("日志配置无效")
    }
}

/// 初始化全局日志，进程内只能调用一次
pub fn init_logger(config: &LogConfig) -> Result<()> {
    let log_config = config.build()?;
    log4rs::init_config(log_config).context("日志系统已初始化")?;
    log::info!(
        "日志已初始化: 级别={} 目录={} 单文件上限={}MB",
        config.default_level,
        config.root_dir,
        config.max_file_size_mb
    );
    Ok(())
}
