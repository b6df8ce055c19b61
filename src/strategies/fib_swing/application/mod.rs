pub mod control;
pub mod executor;
pub mod status;
pub mod task;

pub use control::{ControlCommand, ControlConsole};
pub use executor::{CancelOutcome, Executor};
pub use status::{TaskEvent, TaskSummary};
pub use task::Task;
