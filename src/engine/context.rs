//! What evaluated code sees of the engine: routed output, the kill switch,
//! and a way to start threads that stay attached to both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::EngineResult;
use crate::consts::EVAL_STACK_SIZE;
use crate::router::{OutputRouter, RoutedStdout};

/// Cooperative cancellation shared by a worker and every thread its
/// evaluated code spawns. Once set it stays set.
#[derive(Debug, Default)]
pub struct KillSwitch {
    killed: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the switch and wake every sleeper.
    pub fn kill(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.killed.store(true, Ordering::SeqCst);
        self.wake.notify_all();
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless killed first.
    /// Returns `true` when the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_killed() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            guard = self
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Handed to the interpreter with every command.
#[derive(Clone)]
pub struct ExecutionContext {
    router: Arc<OutputRouter>,
    kill: Arc<KillSwitch>,
}

impl ExecutionContext {
    pub fn new(router: Arc<OutputRouter>) -> Self {
        Self::with_kill_switch(router, Arc::new(KillSwitch::new()))
    }

    pub fn with_kill_switch(router: Arc<OutputRouter>, kill: Arc<KillSwitch>) -> Self {
        Self { router, kill }
    }

    pub fn router(&self) -> &Arc<OutputRouter> {
        &self.router
    }

    /// Standard output for evaluated code, resolved per writing thread.
    pub fn stdout(&self) -> RoutedStdout {
        self.router.stdout()
    }

    pub fn kill_switch(&self) -> &Arc<KillSwitch> {
        &self.kill
    }

    pub fn is_killed(&self) -> bool {
        self.kill.is_killed()
    }

    /// Interruptible sleep; `false` means the switch was flipped.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.kill.sleep(duration)
    }

    /// Start a thread on behalf of evaluated code.
    ///
    /// The new thread is linked to the caller in the router before this
    /// returns, so its output follows the caller's terminal, and it shares
    /// the caller's kill switch.
    pub fn spawn<F, T>(&self, name: &str, f: F) -> EngineResult<JoinHandle<T>>
    where
        F: FnOnce(&ExecutionContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        let parent = thread::current().id();
        let linked = Arc::new(Barrier::new(2));
        let context = self.clone();
        let child_linked = Arc::clone(&linked);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .stack_size(EVAL_STACK_SIZE)
            .spawn(move || {
                let router = Arc::clone(&context.router);
                let _link = router.adopt(parent);
                child_linked.wait();
                f(&context)
            })
            .inspect_err(|e| warn!(error = %e, "could not spawn evaluation thread"))?;

        linked.wait();
        debug!(?parent, child = ?handle.thread().id(), "evaluation thread spawned");
        Ok(handle)
    }
}
