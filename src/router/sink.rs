use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use super::OutputRouter;

/// Identity of a sink in the router. Terminals use their own id here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(pub u64);

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that accepts output text.
///
/// Implementations must never fail: a sink that can no longer render
/// (a closed terminal, say) writes to the process error stream instead.
pub trait Sink: Send + Sync {
    fn write(&self, text: &str);
}

/// The last resort of the routing chain: the process's own stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorStreamSink;

impl Sink for ErrorStreamSink {
    fn write(&self, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

/// Standard-output entry point for evaluated code.
///
/// Every write is resolved against the router from the *writing* thread,
/// so code running on spawned threads lands on the right terminal too.
#[derive(Clone)]
pub struct RoutedStdout {
    router: Arc<OutputRouter>,
}

impl RoutedStdout {
    pub fn new(router: Arc<OutputRouter>) -> Self {
        Self { router }
    }
}

impl Write for RoutedStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.router.write(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
