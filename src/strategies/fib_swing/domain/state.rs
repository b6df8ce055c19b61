use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::TaskError;
use crate::core::types::OrderRef;

/// 止损单当前所处的位置，只会前进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StopStage {
    Initial,
    Zero,
    MinProfit,
}

/// 任务状态，每个状态携带它持有的挂单
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Initial,
    Waiting {
        enter: OrderRef,
        take: OrderRef,
    },
    InPosition {
        stop: OrderRef,
        take: OrderRef,
        stage: StopStage,
    },
    Stop,
    Take,
    /// 出错时仍挂着的订单留在状态里，供人工处理
    UnhandledError {
        orders: Vec<OrderRef>,
    },
    HandledError {
        orders: Vec<OrderRef>,
    },
}

impl TaskState {
    pub fn kind(&self) -> TaskStateKind {
        match self {
            TaskState::Initial => TaskStateKind::Initial,
            TaskState::Waiting { .. } => TaskStateKind::Waiting,
            TaskState::InPosition { .. } => TaskStateKind::InPosition,
            TaskState::Stop => TaskStateKind::Stop,
            TaskState::Take => TaskStateKind::Take,
            TaskState::UnhandledError { .. } => TaskStateKind::UnhandledError,
            TaskState::HandledError { .. } => TaskStateKind::HandledError,
        }
    }

    /// 该状态下仍在交易所挂着的订单
    pub fn open_orders(&self) -> Vec<&OrderRef> {
        match self {
            TaskState::Waiting { enter, take } => vec![enter, take],
            TaskState::InPosition { stop, take, .. } => vec![stop, take],
            TaskState::UnhandledError { orders } | TaskState::HandledError { orders } => {
                orders.iter().collect()
            }
            TaskState::Initial | TaskState::Stop | TaskState::Take => Vec::new(),
        }
    }
}

/// 不带数据的状态名，用于展示、筛选和事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStateKind {
    Initial,
    Waiting,
    InPosition,
    Stop,
    Take,
    UnhandledError,
    HandledError,
}

impl TaskStateKind {
    pub const ALL: [TaskStateKind; 7] = [
        TaskStateKind::Initial,
        TaskStateKind::Waiting,
        TaskStateKind::InPosition,
        TaskStateKind::Stop,
        TaskStateKind::Take,
        TaskStateKind::UnhandledError,
        TaskStateKind::HandledError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStateKind::Initial => "INITIAL",
            TaskStateKind::Waiting => "WAITING",
            TaskStateKind::InPosition => "IN_POSITION",
            TaskStateKind::Stop => "STOP",
            TaskStateKind::Take => "TAKE",
            TaskStateKind::UnhandledError => "UNHANDLED_ERROR",
            TaskStateKind::HandledError => "HANDLED_ERROR",
        }
    }

    /// 错误状态的任务不再被调度
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TaskStateKind::UnhandledError | TaskStateKind::HandledError
        )
    }

    /// 止损/止盈后不再有订单活动
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStateKind::Stop | TaskStateKind::Take)
    }
}

impl std::fmt::Display for TaskStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStateKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStateKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TaskError::UnknownState(s.to_string()))
    }
}
