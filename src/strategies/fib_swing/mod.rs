//! 斐波那契回撤波段策略
//!
//! domain 层为纯计算和状态定义，application 层负责任务状态机、执行器和控制台。

pub mod application;
pub mod domain;

pub use application::{CancelOutcome, ControlCommand, ControlConsole, Executor, Task, TaskEvent, TaskSummary};
pub use domain::{
    compute_levels, ComputedLevels, EntryMode, Side, StrategyType, TaskConfig, TaskError,
    TaskResult, TaskState, TaskStateKind,
};
