//! Disposal tracking
//!
//! Every scope owns a [`DisposalTracker`]. Instances created by a registration that
//! opted into disposal are appended as they are constructed, and released in
//! reverse creation order when the scope is disposed.

use crate::contract::{Injectable, Instance, downcast};
use crate::error::{BoxError, DiError, DisposeFailure, Result};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// A service that releases resources when its owning scope is disposed.
///
/// Implement on the concrete type, or make it a supertrait of a contract trait so
/// that `dyn Contract` can be registered with `.disposable()`.
///
/// ```rust
/// use tiered_injector::{BoxError, Dispose};
///
/// struct Connection;
///
/// impl Dispose for Connection {
///     fn dispose(&self) -> Result<(), BoxError> {
///         // close sockets, flush buffers...
///         Ok(())
///     }
/// }
/// ```
pub trait Dispose: Send + Sync {
    /// Release the resources held by this instance.
    fn dispose(&self) -> std::result::Result<(), BoxError>;
}

/// Type-erased disposal hook stored on a descriptor.
pub(crate) type DisposeFn = Arc<dyn Fn(&Instance) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Disposal hook for a registration whose contract implements [`Dispose`].
#[derive(Clone)]
pub(crate) struct Disposer {
    type_name: &'static str,
    dispose: DisposeFn,
}

impl Disposer {
    pub(crate) fn of<T: ?Sized + Injectable + Dispose>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            dispose: Arc::new(|instance: &Instance| match downcast::<T>(instance) {
                Some(service) => service.dispose(),
                None => Err(format!(
                    "tracked instance is not an Arc<{}>",
                    std::any::type_name::<T>()
                )
                .into()),
            }),
        }
    }
}

/// A tracked instance waiting for its scope to end.
struct Tracked {
    instance: Instance,
    disposer: Disposer,
}

impl Tracked {
    fn release(self) -> std::result::Result<(), DisposeFailure> {
        (self.disposer.dispose)(&self.instance).map_err(|err| DisposeFailure {
            type_name: self.disposer.type_name,
            reason: err.to_string(),
        })
    }
}

#[derive(Default)]
struct TrackerState {
    disposed: bool,
    items: Vec<Tracked>,
}

/// Ordered list of disposables created within one scope.
#[derive(Default)]
pub(crate) struct DisposalTracker {
    state: Mutex<TrackerState>,
}

impl DisposalTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // Disposal hooks never run under this lock, so poisoning cannot leave
        // the list half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `instance` for disposal. No-op without a disposer.
    ///
    /// If the tracker was already drained the instance is disposed on the spot and
    /// `ObjectDisposed` is returned, so nothing created during teardown leaks.
    pub(crate) fn track(
        &self,
        instance: &Instance,
        disposer: Option<&Disposer>,
        scope: &dyn std::fmt::Display,
    ) -> Result<()> {
        let Some(disposer) = disposer else {
            return Ok(());
        };

        let tracked = Tracked {
            instance: Arc::clone(instance),
            disposer: disposer.clone(),
        };

        let late = {
            let mut state = self.lock();
            if state.disposed {
                Some(tracked)
            } else {
                state.items.push(tracked);

                #[cfg(feature = "logging")]
                trace!(
                    target: "tiered_injector",
                    service = disposer.type_name,
                    scope = %scope,
                    tracked = state.items.len(),
                    "Tracking disposable instance"
                );

                None
            }
        };

        match late {
            None => Ok(()),
            Some(tracked) => {
                if let Err(failure) = tracked.release() {
                    #[cfg(feature = "logging")]
                    warn!(
                        target: "tiered_injector",
                        service = failure.type_name,
                        reason = %failure.reason,
                        "Disposing instance created after scope teardown failed"
                    );
                    #[cfg(not(feature = "logging"))]
                    let _ = failure;
                }
                Err(DiError::disposed(scope))
            }
        }
    }

    /// Number of instances currently tracked
    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Dispose everything in reverse creation order.
    ///
    /// Only the first call does any work. Every entry is attempted even when an
    /// earlier one fails; failures are returned together.
    pub(crate) fn dispose_all(&self) -> Vec<DisposeFailure> {
        let items = {
            let mut state = self.lock();
            if state.disposed {
                return Vec::new();
            }
            state.disposed = true;
            std::mem::take(&mut state.items)
        };

        items
            .into_iter()
            .rev()
            .filter_map(|tracked| tracked.release().err())
            .collect()
    }
}
