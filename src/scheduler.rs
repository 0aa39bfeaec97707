//! Task scheduling for background compilation
//!
//! Compiling a call site is handed to a [`TaskScheduler`] so the thread that
//! crossed the compilation threshold is never blocked by it. Tests inject
//! [`ImmediateScheduler`] for deterministic behaviour.

use once_cell::sync::OnceCell;
use std::sync::mpsc::{self, Sender};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// A unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks, usually off the calling thread.
pub trait TaskScheduler: Send + Sync {
    /// Queue `task` for execution. Must not block on the task itself.
    fn schedule(&self, task: Task);
}

/// Runs every task inline on the scheduling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl TaskScheduler for ImmediateScheduler {
    #[inline]
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Runs tasks on one dedicated worker thread, spawned on first use.
///
/// The worker exits once the scheduler is dropped and its queue is drained.
/// If the thread cannot be spawned, tasks run inline instead.
#[derive(Default)]
pub struct BackgroundScheduler {
    sender: OnceCell<Sender<Task>>,
}

impl BackgroundScheduler {
    /// Create a scheduler; the worker thread starts lazily
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self) -> &Sender<Task> {
        self.sender.get_or_init(|| {
            let (sender, receiver) = mpsc::channel::<Task>();

            let spawned = std::thread::Builder::new()
                .name("tiered-injector-compiler".into())
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        task();
                    }
                });

            match spawned {
                Ok(_) => {
                    #[cfg(feature = "logging")]
                    debug!(target: "tiered_injector", "Started background compilation worker");
                }
                Err(_err) => {
                    // The receiver was dropped with the closure, so every send
                    // fails and the task runs inline.
                    #[cfg(feature = "logging")]
                    warn!(
                        target: "tiered_injector",
                        error = %_err,
                        "Could not spawn compilation worker, compiling inline"
                    );
                }
            }

            sender
        })
    }
}

impl TaskScheduler for BackgroundScheduler {
    fn schedule(&self, task: Task) {
        if let Err(mpsc::SendError(task)) = self.sender().send(task) {
            task();
        }
    }
}

impl std::fmt::Debug for BackgroundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundScheduler")
            .field("started", &self.sender.get().is_some())
            .finish()
    }
}

/// Runs tasks on a tokio runtime's blocking pool.
#[cfg(feature = "async")]
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "async")]
impl TokioScheduler {
    /// Use the given runtime
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on, if any
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(feature = "async")]
impl TaskScheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        // Dropping the JoinHandle detaches the task.
        drop(self.handle.spawn_blocking(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_immediate_runs_inline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        ImmediateScheduler.schedule(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_background_runs_off_thread() {
        let scheduler = BackgroundScheduler::new();
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();

        scheduler.schedule(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));

        let worker = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }
}
