pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod report;
pub mod result;
pub mod scheduler;
pub mod task;

pub use config::{HostsConfig, Settings};
pub use context::{RunContext, SystemClock};
pub use error::{ExecutorError, RunError, SpecError};
pub use executor::{CommandOutput, CommandRequest, Executor, HostOutput};
pub use result::{RunOutcome, RunResults, StopReason, TaskRunResult};
pub use task::{TaskList, TaskSpec};
