//! Activator capability
//!
//! An [`Activator`] tells the engine two things about an implementation: which
//! contracts its constructor needs, and how to build it once those are resolved.
//! Both executors consume activators the same way, so a hand-written, generated or
//! reflective activator can be plugged in without touching the engine.
//!
//! The typed [`ConstructorActivator`] derives the dependency list from a
//! [`Dependencies`] type:
//!
//! - `()` - no dependencies
//! - `Arc<T>` - required dependency
//! - `Option<Arc<T>>` - optional dependency (`None` when unregistered)
//! - `Vec<Arc<T>>` - every registration of `T`, in registration order
//! - tuples of the above (up to 12)
//!
//! # Example
//!
//! ```rust
//! use tiered_injector::{Activator, ConstructorActivator, Dependency, ServiceKey};
//! use std::sync::Arc;
//!
//! struct Config;
//! struct Repository {
//!     config: Arc<Config>,
//! }
//!
//! let activator = ConstructorActivator::new(|config: Arc<Config>| Arc::new(Repository { config }));
//! assert_eq!(
//!     activator.dependencies(),
//!     &[Dependency::Required(ServiceKey::of::<Config>())]
//! );
//! ```

use crate::contract::{Injectable, Instance, ServiceKey, downcast, downcast_list, erase};
use crate::error::{DiError, Result};
use std::marker::PhantomData;
use std::sync::Arc;

// =============================================================================
// Dependency declarations
// =============================================================================

/// One constructor parameter, as seen by the graph builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Must be registered; otherwise activation fails with `MissingDependency`
    Required(ServiceKey),
    /// `None` is passed when not registered
    Optional(ServiceKey),
    /// Every registration, possibly none
    All(ServiceKey),
}

impl Dependency {
    /// Contract key the parameter refers to
    pub fn key(&self) -> ServiceKey {
        match self {
            Self::Required(key) | Self::Optional(key) | Self::All(key) => *key,
        }
    }
}

/// Resolved constructor arguments, in declaration order.
///
/// `None` marks an optional dependency that had no registration.
pub struct Arguments {
    values: std::vec::IntoIter<Option<Instance>>,
    requester: &'static str,
}

impl Arguments {
    pub(crate) fn new(values: Vec<Option<Instance>>, requester: &'static str) -> Self {
        Self {
            values: values.into_iter(),
            requester,
        }
    }

    /// Name of the implementation being activated
    pub fn requester(&self) -> &'static str {
        self.requester
    }

    /// Take the next raw argument.
    pub fn next_raw(&mut self) -> Result<Option<Instance>> {
        self.values.next().ok_or_else(|| DiError::CreationFailed {
            type_name: self.requester,
            reason: "activator consumed more arguments than it declared".into(),
        })
    }

    /// Take the next argument as `I`.
    pub fn next<I: Inject>(&mut self) -> Result<I> {
        let raw = self.next_raw()?;
        I::from_argument(raw, self.requester)
    }
}

/// A single injectable parameter type.
pub trait Inject: Sized + Send + 'static {
    /// How the graph builder should satisfy this parameter
    fn dependency() -> Dependency;

    /// Convert the resolved argument into the parameter value
    fn from_argument(value: Option<Instance>, requester: &'static str) -> Result<Self>;
}

fn mismatch<T: ?Sized + 'static>(requester: &'static str) -> DiError {
    DiError::CreationFailed {
        type_name: requester,
        reason: format!("argument is not an {}", std::any::type_name::<T>()),
    }
}

impl<T: ?Sized + Injectable> Inject for Arc<T> {
    fn dependency() -> Dependency {
        Dependency::Required(ServiceKey::of::<T>())
    }

    fn from_argument(value: Option<Instance>, requester: &'static str) -> Result<Self> {
        let value = value.ok_or(DiError::MissingDependency {
            type_name: std::any::type_name::<T>(),
            requested_by: requester,
        })?;
        downcast::<T>(&value).ok_or_else(|| mismatch::<T>(requester))
    }
}

impl<T: ?Sized + Injectable> Inject for Option<Arc<T>> {
    fn dependency() -> Dependency {
        Dependency::Optional(ServiceKey::of::<T>())
    }

    fn from_argument(value: Option<Instance>, requester: &'static str) -> Result<Self> {
        value
            .map(|value| downcast::<T>(&value).ok_or_else(|| mismatch::<T>(requester)))
            .transpose()
    }
}

impl<T: ?Sized + Injectable> Inject for Vec<Arc<T>> {
    fn dependency() -> Dependency {
        Dependency::All(ServiceKey::of::<T>())
    }

    fn from_argument(value: Option<Instance>, requester: &'static str) -> Result<Self> {
        match value {
            Some(value) => downcast_list::<T>(&value).ok_or_else(|| mismatch::<T>(requester)),
            None => Ok(Vec::new()),
        }
    }
}

/// The full parameter list of a constructor.
pub trait Dependencies: Sized + Send + 'static {
    /// Declared dependencies, in order
    fn dependencies() -> Vec<Dependency>;

    /// Build the parameter value from resolved arguments
    fn from_arguments(arguments: &mut Arguments) -> Result<Self>;
}

// No dependencies
impl Dependencies for () {
    #[inline]
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    #[inline]
    fn from_arguments(_arguments: &mut Arguments) -> Result<Self> {
        Ok(())
    }
}

// A bare parameter without a tuple
macro_rules! impl_dependencies_single {
    ($($ty:ty),+) => {
        $(
            impl<T: ?Sized + Injectable> Dependencies for $ty {
                #[inline]
                fn dependencies() -> Vec<Dependency> {
                    vec![<$ty as Inject>::dependency()]
                }

                #[inline]
                fn from_arguments(arguments: &mut Arguments) -> Result<Self> {
                    arguments.next::<$ty>()
                }
            }
        )+
    };
}

impl_dependencies_single!(Arc<T>, Option<Arc<T>>, Vec<Arc<T>>);

// Tuple implementations (1-12 elements)
macro_rules! impl_dependencies_tuple {
    ($($T:ident),+) => {
        impl<$($T: Inject),+> Dependencies for ($($T,)+) {
            #[inline]
            fn dependencies() -> Vec<Dependency> {
                vec![$($T::dependency()),+]
            }

            #[inline]
            fn from_arguments(arguments: &mut Arguments) -> Result<Self> {
                Ok(($(arguments.next::<$T>()?,)+))
            }
        }
    };
}

impl_dependencies_tuple!(A);
impl_dependencies_tuple!(A, B);
impl_dependencies_tuple!(A, B, C);
impl_dependencies_tuple!(A, B, C, D);
impl_dependencies_tuple!(A, B, C, D, E);
impl_dependencies_tuple!(A, B, C, D, E, F);
impl_dependencies_tuple!(A, B, C, D, E, F, G);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

// =============================================================================
// Activator
// =============================================================================

/// Supplies an implementation's dependency list and construction function.
pub trait Activator: Send + Sync {
    /// Constructor parameters, in the order `activate` consumes them
    fn dependencies(&self) -> &[Dependency];

    /// Build the instance. The result must be an erased `Arc<T>` for the contract.
    fn activate(&self, arguments: Arguments) -> Result<Instance>;
}

/// Activator backed by a typed constructor closure.
pub struct ConstructorActivator<T: ?Sized, D, F> {
    constructor: F,
    dependencies: Vec<Dependency>,
    _marker: PhantomData<fn(D) -> Arc<T>>,
}

impl<T, D, F> ConstructorActivator<T, D, F>
where
    T: ?Sized + Injectable,
    D: Dependencies,
    F: Fn(D) -> Arc<T> + Send + Sync + 'static,
{
    /// Wrap a constructor taking its dependencies as `D`
    pub fn new(constructor: F) -> Self {
        Self {
            constructor,
            dependencies: D::dependencies(),
            _marker: PhantomData,
        }
    }
}

impl<T, D, F> Activator for ConstructorActivator<T, D, F>
where
    T: ?Sized + Injectable,
    D: Dependencies,
    F: Fn(D) -> Arc<T> + Send + Sync + 'static,
{
    #[inline]
    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn activate(&self, mut arguments: Arguments) -> Result<Instance> {
        let deps = D::from_arguments(&mut arguments)?;
        Ok(erase((self.constructor)(deps)))
    }
}

impl<T: ?Sized, D, F> std::fmt::Debug for ConstructorActivator<T, D, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorActivator")
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Config(u8);
    struct Plugin;

    #[test]
    fn test_tuple_dependency_order() {
        type Deps = (Arc<Config>, Option<Arc<Plugin>>, Vec<Arc<Plugin>>);
        assert_eq!(
            Deps::dependencies(),
            vec![
                Dependency::Required(ServiceKey::of::<Config>()),
                Dependency::Optional(ServiceKey::of::<Plugin>()),
                Dependency::All(ServiceKey::of::<Plugin>()),
            ]
        );
    }

    #[test]
    fn test_activate_with_optional_absent() {
        let activator = ConstructorActivator::new(|(config, plugin): (Arc<Config>, Option<Arc<Plugin>>)| {
            assert!(plugin.is_none());
            Arc::new(config.0)
        });

        let args = Arguments::new(vec![Some(erase(Arc::new(Config(7)))), None], "test");
        let instance = activator.activate(args).unwrap();
        assert_eq!(*downcast::<u8>(&instance).unwrap(), 7);
    }

    #[test]
    fn test_required_argument_missing_reports_requester() {
        let mut args = Arguments::new(vec![None], "app::Service");
        let err = args.next::<Arc<Config>>().unwrap_err();
        match err {
            DiError::MissingDependency { requested_by, .. } => assert_eq!(requested_by, "app::Service"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overconsumed_arguments_fail() {
        let mut args = Arguments::new(Vec::new(), "app::Service");
        assert!(matches!(args.next_raw(), Err(DiError::CreationFailed { .. })));
    }
}
