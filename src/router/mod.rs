//! Process-wide routing of standard output to terminals.
//!
//! A worker registers its thread against its terminal's sink before it
//! invokes the interpreter. Writes made by evaluated code are resolved from
//! the writing thread through an explicit chain of strategies, see
//! [`RouteSource`]. Threads spawned by evaluated code are linked to their
//! spawner with [`OutputRouter::adopt`], which is how they find the
//! terminal their parent is evaluating for.

mod sink;

pub use sink::{ErrorStreamSink, RoutedStdout, Sink, SinkId};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, trace};

/// A sink plus the identity it is registered under.
#[derive(Clone)]
pub struct Route {
    pub id: SinkId,
    pub sink: Arc<dyn Sink>,
}

impl Route {
    pub fn new(id: SinkId, sink: Arc<dyn Sink>) -> Self {
        Self { id, sink }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("id", &self.id).finish()
    }
}

/// Which step of the lookup chain produced a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// The writing thread is itself registered.
    Direct,
    /// An ancestor, or another registered member of the same spawn group.
    SpawnGroup,
    /// Nothing in the group: the most recently registered live sink.
    /// Racy when two terminals evaluate at once; kept on purpose.
    MostRecent,
    /// No sink registered at all.
    ErrorStream,
}

/// The outcome of resolving a write.
pub struct Resolution {
    pub source: RouteSource,
    pub id: Option<SinkId>,
    sink: Arc<dyn Sink>,
}

impl Resolution {
    pub fn write(&self, text: &str) {
        self.sink.write(text);
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("source", &self.source)
            .field("id", &self.id)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("execution context {0:?} is already routed to sink {1}")]
    AlreadyRouted(ThreadId, SinkId),
}

struct Entry {
    route: Route,
    seq: u64,
}

#[derive(Default)]
struct RouterState {
    routes: HashMap<ThreadId, Entry>,
    /// child → spawning thread, recorded at spawn time.
    parents: HashMap<ThreadId, ThreadId>,
    /// One route per sink, most recently registered last.
    recent: Vec<Route>,
    seq: u64,
}

impl RouterState {
    /// Spawning chain of `context`, nearest ancestor first.
    fn ancestors(&self, context: ThreadId) -> Vec<ThreadId> {
        let mut chain = Vec::new();
        let mut current = context;
        while let Some(&parent) = self.parents.get(&current) {
            if parent == context || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    fn group_root(&self, context: ThreadId) -> ThreadId {
        self.ancestors(context).last().copied().unwrap_or(context)
    }

    fn direct(&self, context: ThreadId) -> Option<&Route> {
        self.routes.get(&context).map(|entry| &entry.route)
    }

    fn spawn_group(&self, context: ThreadId) -> Option<&Route> {
        let ancestors = self.ancestors(context);
        if let Some(entry) = ancestors.iter().find_map(|a| self.routes.get(a)) {
            return Some(&entry.route);
        }

        let root = ancestors.last().copied().unwrap_or(context);
        self.routes
            .iter()
            .filter(|(member, _)| **member != context && self.group_root(**member) == root)
            .max_by_key(|(_, entry)| entry.seq)
            .map(|(_, entry)| &entry.route)
    }

    fn most_recent(&self) -> Option<&Route> {
        self.recent.last()
    }
}

/// Registry of execution context → sink, shared by every worker.
pub struct OutputRouter {
    state: Mutex<RouterState>,
    fallback: Arc<dyn Sink>,
}

impl Default for OutputRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputRouter {
    /// A router whose last resort is the process's stderr.
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(ErrorStreamSink))
    }

    /// A router with a custom last-resort sink (tests capture it).
    pub fn with_fallback(fallback: Arc<dyn Sink>) -> Self {
        Self {
            state: Mutex::new(RouterState::default()),
            fallback,
        }
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route everything `context` writes to `route` until the guard drops.
    pub fn register(
        &self,
        context: ThreadId,
        route: Route,
    ) -> Result<RouteGuard<'_>, RouterError> {
        let mut state = self.state();
        if let Some(existing) = state.routes.get(&context) {
            return Err(RouterError::AlreadyRouted(context, existing.route.id));
        }
        state.seq += 1;
        let seq = state.seq;
        let id = route.id;
        state.recent.retain(|r| r.id != id);
        state.recent.push(route.clone());
        state.routes.insert(context, Entry { route, seq });
        debug!(?context, sink = %id, "route registered");
        Ok(RouteGuard {
            router: self,
            context,
        })
    }

    /// [`register`](Self::register) for the calling thread.
    pub fn register_current(&self, route: Route) -> Result<RouteGuard<'_>, RouterError> {
        self.register(thread::current().id(), route)
    }

    /// Remove the route of `context`, if any.
    pub fn unregister(&self, context: ThreadId) -> Option<Route> {
        let removed = self.state().routes.remove(&context).map(|entry| entry.route);
        if let Some(route) = &removed {
            debug!(?context, sink = %route.id, "route removed");
        }
        removed
    }

    /// Forget a sink for the most-recent fallback (its terminal closed).
    /// Live registrations are untouched so an in-flight command still
    /// writes through its own sink.
    pub fn release(&self, id: SinkId) {
        self.state().recent.retain(|r| r.id != id);
    }

    /// Record the calling thread as spawned by `parent`.
    /// The link is removed when the returned guard drops; children of the
    /// calling thread are re-linked to `parent` so chains stay intact.
    pub fn adopt(&self, parent: ThreadId) -> SpawnLink<'_> {
        let child = thread::current().id();
        self.state().parents.insert(child, parent);
        trace!(?child, ?parent, "spawn link recorded");
        SpawnLink {
            router: self,
            child,
        }
    }

    fn disown(&self, child: ThreadId) {
        let mut state = self.state();
        let parent = state.parents.remove(&child);
        if let Some(parent) = parent {
            for link in state.parents.values_mut() {
                if *link == child {
                    *link = parent;
                }
            }
        } else {
            state.parents.retain(|_, link| *link != child);
        }
    }

    /// Resolve the target for a write made by `context`.
    pub fn resolve(&self, context: ThreadId) -> Resolution {
        let state = self.state();
        let found = state
            .direct(context)
            .map(|route| (RouteSource::Direct, route))
            .or_else(|| {
                state
                    .spawn_group(context)
                    .map(|route| (RouteSource::SpawnGroup, route))
            })
            .or_else(|| {
                state
                    .most_recent()
                    .map(|route| (RouteSource::MostRecent, route))
            });

        match found {
            Some((source, route)) => {
                if source == RouteSource::MostRecent {
                    debug!(?context, sink = %route.id, "no route in spawn group, using most recent sink");
                }
                Resolution {
                    source,
                    id: Some(route.id),
                    sink: Arc::clone(&route.sink),
                }
            }
            None => {
                debug!(?context, "no sink registered, writing to error stream");
                Resolution {
                    source: RouteSource::ErrorStream,
                    id: None,
                    sink: Arc::clone(&self.fallback),
                }
            }
        }
    }

    pub fn resolve_current(&self) -> Resolution {
        self.resolve(thread::current().id())
    }

    /// Write `text` wherever the calling thread's output belongs.
    /// The sink runs after the registry lock is released.
    pub fn write(&self, text: &str) {
        self.resolve_current().write(text);
    }

    /// A `std::io::Write` handle over [`write`](Self::write).
    pub fn stdout(self: &Arc<Self>) -> RoutedStdout {
        RoutedStdout::new(Arc::clone(self))
    }

    /// The last-resort sink. Output of closed terminals goes here too.
    pub fn fallback(&self) -> Arc<dyn Sink> {
        Arc::clone(&self.fallback)
    }

    pub fn is_routed(&self, context: ThreadId) -> bool {
        self.state().routes.contains_key(&context)
    }
}

/// Live registration of one execution context. Dropping it unregisters.
#[must_use = "dropping the guard removes the route"]
pub struct RouteGuard<'a> {
    router: &'a OutputRouter,
    context: ThreadId,
}

impl RouteGuard<'_> {
    pub fn context(&self) -> ThreadId {
        self.context
    }

    /// Unregister now. Same as dropping, but reads better at call sites.
    pub fn release(self) {}
}

impl Drop for RouteGuard<'_> {
    fn drop(&mut self) {
        self.router.unregister(self.context);
    }
}

/// Parent link of a spawned thread. Dropping it removes the link.
#[must_use = "dropping the link detaches the thread from its spawn group"]
pub struct SpawnLink<'a> {
    router: &'a OutputRouter,
    child: ThreadId,
}

impl Drop for SpawnLink<'_> {
    fn drop(&mut self) {
        self.router.disown(self.child);
    }
}
