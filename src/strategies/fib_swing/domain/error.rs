use thiserror::Error;

use crate::core::error::{AlertError, ExchangeError};

/// 波段任务错误，只影响单个任务
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("价格区间无效: {0}")]
    InvalidRange(String),

    #[error("未知的任务状态: {0}")]
    UnknownState(String),

    #[error("交易所调用失败 [{operation}]: {source}")]
    ExchangeCall {
        operation: &'static str,
        #[source]
        source: ExchangeError,
    },

    #[error("告警发送失败: {0}")]
    AlertDelivery(#[from] AlertError),

    #[error("配置错误: {0}")]
    InvalidConfig(String),
}

impl TaskError {
    pub fn exchange(operation: &'static str, source: ExchangeError) -> Self {
        TaskError::ExchangeCall { operation, source }
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;
