//! The asynchronous evaluation engine.
//!
//! Each terminal owns an [`EvalWorker`]: a dedicated thread that takes
//! [`Command`]s off a queue in order, evaluates them against a persistent
//! environment with output routed to the terminal, and reports sanitized
//! result text through a [`ResultListener`].

pub mod context;
pub mod error;
pub mod queue;
pub mod sanitize;
pub mod worker;

pub use context::{ExecutionContext, KillSwitch};
pub use error::{EngineError, EngineResult};
pub use queue::Command;
pub use sanitize::{format_failure, format_value, sanitize};
pub use worker::{EvalWorker, ResultListener, WorkerSetup, WorkerStatus};
