//! Container and engine
//!
//! The [`Container`] is built once from a [`ServiceCollection`](crate::ServiceCollection)
//! and owns the root [`ServiceScope`]. Every scope opened from it shares one
//! engine: the registry, the call-site builder, the resolution cache and the
//! optional validator.

use crate::builder::CallSiteFactory;
use crate::call_site::CallSite;
use crate::contract::{Contract, Instance};
use crate::error::{DiError, Result};
use crate::registry::ServiceRegistry;
use crate::resolution::{ExecutorKind, ResolutionCache, ResolutionObserver};
use crate::scheduler::{BackgroundScheduler, TaskScheduler};
use crate::scope::ServiceScope;
use crate::validation::CallSiteValidator;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// How realized contracts are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverMode {
    /// Interpret first, compile once a contract is hot
    #[default]
    Tiered,
    /// Always interpret
    Interpreted,
}

/// Options for [`ServiceCollection::build_with`](crate::ServiceCollection::build_with).
///
/// # Examples
///
/// ```rust
/// use tiered_injector::{ContainerOptions, ImmediateScheduler, ServiceCollection};
/// use std::sync::Arc;
///
/// let options = ContainerOptions::new()
///     .validate_scopes(true)
///     .compilation_threshold(4)
///     .scheduler(Arc::new(ImmediateScheduler));
///
/// let container = ServiceCollection::new().build_with(options).unwrap();
/// ```
#[derive(Clone)]
pub struct ContainerOptions {
    validate_scopes: bool,
    validate_on_build: bool,
    compilation_threshold: usize,
    mode: ResolverMode,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    observer: Option<Arc<dyn ResolutionObserver>>,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            validate_scopes: false,
            validate_on_build: false,
            compilation_threshold: 2,
            mode: ResolverMode::Tiered,
            scheduler: None,
            observer: None,
        }
    }
}

impl ContainerOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject singletons that capture scoped services, and scoped services
    /// resolved from the root scope.
    pub fn validate_scopes(mut self, enabled: bool) -> Self {
        self.validate_scopes = enabled;
        self
    }

    /// Build every registered contract while building the container and fail
    /// with [`DiError::InvalidRegistrations`] if any of them is broken.
    pub fn validate_on_build(mut self, enabled: bool) -> Self {
        self.validate_on_build = enabled;
        self
    }

    /// Number of interpreted calls before a contract is compiled (minimum 1)
    pub fn compilation_threshold(mut self, calls: usize) -> Self {
        self.compilation_threshold = calls;
        self
    }

    /// Execution mode
    pub fn mode(mut self, mode: ResolverMode) -> Self {
        self.mode = mode;
        self
    }

    /// Scheduler for background compilation (defaults to a [`BackgroundScheduler`])
    pub fn scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Observe which executor serves each resolution
    pub fn observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl std::fmt::Debug for ContainerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerOptions")
            .field("validate_scopes", &self.validate_scopes)
            .field("validate_on_build", &self.validate_on_build)
            .field("compilation_threshold", &self.compilation_threshold)
            .field("mode", &self.mode)
            .field("custom_scheduler", &self.scheduler.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// State shared by every scope of one container.
pub(crate) struct Engine {
    call_sites: CallSiteFactory,
    resolutions: ResolutionCache,
    validator: Option<CallSiteValidator>,
}

impl Engine {
    fn new(registry: ServiceRegistry, options: ContainerOptions) -> Self {
        let threshold = match options.mode {
            ResolverMode::Tiered => Some(options.compilation_threshold),
            ResolverMode::Interpreted => None,
        };
        let scheduler = options
            .scheduler
            .unwrap_or_else(|| Arc::new(BackgroundScheduler::new()));

        Self {
            call_sites: CallSiteFactory::new(Arc::new(registry)),
            resolutions: ResolutionCache::new(scheduler, options.observer, threshold),
            validator: options.validate_scopes.then(CallSiteValidator::new),
        }
    }

    pub(crate) fn registry(&self) -> &ServiceRegistry {
        self.call_sites.registry()
    }

    fn realize(&self, contract: &Contract) -> Result<Option<Arc<CallSite>>> {
        let site = self.call_sites.build(contract)?;
        if let (Some(validator), Some(site)) = (&self.validator, &site) {
            validator.validate_call_site(contract, site)?;
        }
        Ok(site)
    }

    /// Realized plan for `contract`
    pub(crate) fn call_site(&self, contract: &Contract) -> Result<Option<Arc<CallSite>>> {
        let accessor = self.resolutions.accessor(contract, |c| self.realize(c))?;
        Ok(accessor.call_site().cloned())
    }

    pub(crate) fn resolve(&self, contract: &Contract, scope: &ServiceScope) -> Result<Option<Instance>> {
        let accessor = self.resolutions.accessor(contract, |c| self.realize(c))?;
        if let Some(validator) = &self.validator {
            validator.validate_resolution(contract, scope.is_root())?;
        }
        self.resolutions.invoke(contract, &accessor, scope)
    }

    /// Realize every registration, collecting every failure.
    fn validate_all(&self) -> Vec<DiError> {
        let registry = self.registry();
        registry
            .keys()
            .iter()
            .filter_map(|key| self.call_site(&Contract::Collection(*key)).err())
            .collect()
    }
}

/// A built dependency injection container.
///
/// Dereferences to its root [`ServiceScope`], so everything a scope can do
/// (resolve, open child scopes, dispose) is available directly. Singletons live
/// in the root scope and are disposed with it.
///
/// # Examples
///
/// ```rust
/// use tiered_injector::ServiceCollection;
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".into()
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.singleton(|()| -> Arc<dyn Greeter> { Arc::new(English) });
///
/// let container = services.build().unwrap();
/// let greeter = container.resolve_required::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// ```
pub struct Container {
    root: ServiceScope,
}

impl Container {
    pub(crate) fn from_registry(registry: ServiceRegistry, options: ContainerOptions) -> Result<Self> {
        #[cfg(feature = "logging")]
        debug!(
            target: "tiered_injector",
            descriptors = registry.len(),
            contracts = registry.keys().len(),
            mode = ?options.mode,
            validate_scopes = options.validate_scopes,
            "Building container"
        );

        let validate_on_build = options.validate_on_build;
        let engine = Arc::new(Engine::new(registry, options));

        if validate_on_build {
            let errors = engine.validate_all();
            if !errors.is_empty() {
                #[cfg(feature = "logging")]
                warn!(
                    target: "tiered_injector",
                    errors = errors.len(),
                    "Container validation failed"
                );
                return Err(DiError::InvalidRegistrations { errors });
            }
        }

        Ok(Self {
            root: ServiceScope::root(engine),
        })
    }

    /// The root scope
    #[inline]
    pub fn root(&self) -> &ServiceScope {
        &self.root
    }

    /// Registrations this container was built from
    pub fn registry(&self) -> &ServiceRegistry {
        self.root.engine().registry()
    }

    /// Realize every registered contract now, returning all problems found.
    pub fn validate(&self) -> Result<()> {
        let errors = self.root.engine().validate_all();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiError::InvalidRegistrations { errors })
        }
    }

    /// Executor currently installed for `contract`; `None` until it is first
    /// resolved, or when it has no registration.
    pub fn executor(&self, contract: &Contract) -> Option<ExecutorKind> {
        self.root.engine().resolutions.executor(contract)
    }

    /// Number of contracts realized so far
    pub fn realized_contracts(&self) -> usize {
        self.root.engine().resolutions.len()
    }
}

impl std::ops::Deref for Container {
    type Target = ServiceScope;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registry", self.registry())
            .field("realized", &self.realized_contracts())
            .field("root", &self.root)
            .finish()
    }
}
