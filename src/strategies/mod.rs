// 核心策略模块
pub mod fib_swing;

pub use fib_swing::{Executor, TaskConfig};
