//! Error types for dependency resolution

use thiserror::Error;

/// Boxed error returned by [`Dispose`](crate::Dispose) implementations and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single disposal that failed while tearing down a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposeFailure {
    /// Implementation type that failed to dispose
    pub type_name: &'static str,
    /// Rendered error message
    pub reason: String,
}

impl std::fmt::Display for DisposeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.reason)
    }
}

/// Errors that can occur while building or executing a resolution plan
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// A required service has no registration
    #[error("Service not found: {type_name}")]
    NotFound { type_name: &'static str },

    /// A required constructor dependency has no registration
    #[error("Unable to resolve service {type_name} while activating {requested_by}")]
    MissingDependency {
        type_name: &'static str,
        requested_by: &'static str,
    },

    /// The dependency graph of a service contains a cycle
    #[error("Circular dependency detected while resolving {type_name}: {path}")]
    CircularDependency {
        type_name: &'static str,
        path: String,
    },

    /// The scope (or container) was already disposed
    #[error("Cannot access a disposed scope ({scope})")]
    ObjectDisposed { scope: String },

    /// A singleton depends on a scoped service
    #[error("Cannot consume scoped service {dependency} from singleton {consumer}")]
    CaptiveDependency {
        consumer: &'static str,
        dependency: &'static str,
    },

    /// A scoped service was requested from the root container
    #[error("Cannot resolve {type_name} from the root container because it requires scoped service {scoped}")]
    ScopedFromRoot {
        type_name: &'static str,
        scoped: &'static str,
    },

    /// A factory or activator failed to create the service
    #[error("Failed to create service {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// One or more tracked instances failed to dispose
    #[error("{} disposable(s) failed during scope disposal: {}", .failures.len(), join(.failures))]
    DisposalFailed { failures: Vec<DisposeFailure> },

    /// Eager validation found problems in the registrations
    #[error("{} invalid registration(s): {}", .errors.len(), join(.errors))]
    InvalidRegistrations { errors: Vec<DiError> },
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DiError {
    /// Create a NotFound error for a type
    #[inline]
    pub fn not_found<T: ?Sized + 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create an ObjectDisposed error for a scope
    #[inline]
    pub fn disposed(scope: impl std::fmt::Display) -> Self {
        Self::ObjectDisposed {
            scope: scope.to_string(),
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency_message_names_both_types() {
        let err = DiError::MissingDependency {
            type_name: "app::Logger",
            requested_by: "app::Repository",
        };
        let msg = err.to_string();
        assert!(msg.contains("app::Logger"));
        assert!(msg.contains("app::Repository"));
    }

    #[test]
    fn test_disposal_failed_lists_every_failure() {
        let err = DiError::DisposalFailed {
            failures: vec![
                DisposeFailure {
                    type_name: "A",
                    reason: "boom".into(),
                },
                DisposeFailure {
                    type_name: "B",
                    reason: "bang".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 disposable(s) failed during scope disposal: A: boom; B: bang"
        );
    }
}
