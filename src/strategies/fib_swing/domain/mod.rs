pub mod calculator;
pub mod config;
pub mod error;
pub mod levels;
pub mod state;

pub use calculator::{compute_levels, LevelCalculator, TrendCalculator, MAX_LEVERAGE};
pub use config::{EntryMode, FibRatios, Side, StrategyType, TaskConfig};
pub use error::{TaskError, TaskResult};
pub use levels::{ComputedLevels, TrendProjection, WorkingLevels};
pub use state::{StopStage, TaskState, TaskStateKind};
