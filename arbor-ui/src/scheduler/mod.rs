mod backoff;
mod timer;
mod wait;

pub use backoff::Backoff;
pub use timer::TimerId;
pub(crate) use timer::{TimerJob, Timers};
pub use wait::{WaitGroup, WaitGuard};

use crate::action::Action;
use crate::context::Context;
use crate::node::{Event, ListenerId, NodeId};
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;
use url::Url;

pub type Callback = Box<dyn FnOnce(&mut Context<'_>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Run on the next pass, then re-render the enclosing component.
    Update,
    /// Run after the next reconciliation pass.
    Defer,
    /// Run on the next pass without re-rendering anything.
    Next,
}

/// Lifecycle notifications delivered to a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Mount,
    Nav(Url),
    Resize,
    AppUpdate,
}

pub(crate) enum Job {
    Call(Callback),
    Event { listener: ListenerId, event: Event },
    Hook(Hook),
    Action(Action),
    State(String),
    Navigate(Url),
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Call(_) => f.write_str("Call"),
            Job::Event { listener, event } => write!(f, "Event({}, {listener:?})", event.name),
            Job::Hook(hook) => write!(f, "Hook({hook:?})"),
            Job::Action(action) => write!(f, "Action({})", action.name),
            Job::State(key) => write!(f, "State({key})"),
            Job::Navigate(url) => write!(f, "Navigate({url})"),
        }
    }
}

/// A unit of work waiting in the engine's queue.
///
/// `source` is the node the work belongs to. Work whose source has been
/// dismounted by the time it runs is dropped.
#[derive(Debug)]
pub struct Dispatch {
    pub(crate) mode: DispatchMode,
    pub(crate) source: Option<NodeId>,
    pub(crate) job: Job,
}

impl Dispatch {
    pub(crate) fn new(mode: DispatchMode, source: Option<NodeId>, job: Job) -> Self {
        Self { mode, source, job }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }
}

/// Thread-safe handle for feeding work to an engine.
///
/// This is the only way to reach the engine from another thread: results of
/// background work, host events and timers all come back through here.
#[derive(Clone)]
pub struct Dispatcher {
    tx: Sender<Dispatch>,
    wake: Arc<AtomicBool>,
}

impl Dispatcher {
    pub(crate) fn channel() -> (Self, Receiver<Dispatch>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let dispatcher = Self {
            tx,
            wake: Arc::new(AtomicBool::new(false)),
        };
        (dispatcher, rx)
    }

    pub(crate) fn submit(&self, dispatch: Dispatch) {
        self.wake.store(true, Ordering::Release);
        if let Err(err) = self.tx.send(dispatch) {
            warn!(job = ?err.0.job, "engine stopped, dropping dispatch");
        }
    }

    /// Runs `f` for `source`, then re-renders its enclosing component.
    pub fn dispatch<F>(&self, source: NodeId, f: F)
    where
        F: FnOnce(&mut Context<'_>) + Send + 'static,
    {
        self.submit(Dispatch::new(
            DispatchMode::Update,
            Some(source),
            Job::Call(Box::new(f)),
        ));
    }

    /// Runs `f` once the next reconciliation pass is over.
    pub fn defer<F>(&self, source: NodeId, f: F)
    where
        F: FnOnce(&mut Context<'_>) + Send + 'static,
    {
        self.submit(Dispatch::new(
            DispatchMode::Defer,
            Some(source),
            Job::Call(Box::new(f)),
        ));
    }

    /// Runs `f` for `source` without marking anything dirty.
    pub fn next<F>(&self, source: NodeId, f: F)
    where
        F: FnOnce(&mut Context<'_>) + Send + 'static,
    {
        self.submit(Dispatch::new(
            DispatchMode::Next,
            Some(source),
            Job::Call(Box::new(f)),
        ));
    }

    /// Delivers a native event to the handler registered as `listener`.
    pub fn emit(&self, listener: ListenerId, event: Event) {
        self.submit(Dispatch::new(
            DispatchMode::Update,
            None,
            Job::Event { listener, event },
        ));
    }

    pub fn post(&self, action: Action) {
        self.submit(Dispatch::new(DispatchMode::Next, None, Job::Action(action)));
    }

    pub fn navigate(&self, url: Url) {
        self.submit(Dispatch::new(DispatchMode::Next, None, Job::Navigate(url)));
    }

    /// Asks the engine to drop its idle backoff on the next tick.
    pub fn request_immediate(&self) {
        self.wake.store(true, Ordering::Release);
    }

    pub(crate) fn take_wake(&self) -> bool {
        self.wake.swap(false, Ordering::AcqRel)
    }
}

/// Cooperative stop signal for [`Engine::run`](crate::Engine::run).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
