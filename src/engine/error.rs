use std::io;

use thiserror::Error;

use crate::router::RouterError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The end sentinel was sent; nothing more is accepted.
    #[error("worker no longer accepts commands")]
    Ended,

    /// The worker side of the queue is gone.
    #[error("command queue is closed")]
    QueueClosed,

    /// The worker stopped on an engine-side failure or a kill.
    #[error("worker is dead")]
    WorkerDead,

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("routing failed: {0}")]
    Routing(#[from] RouterError),

    #[error("interpreter panicked: {0}")]
    InterpreterPanic(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
