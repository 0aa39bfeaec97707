//! Scope validation
//!
//! Checks a realized call-site tree for lifetime mistakes:
//!
//! - a singleton that (transitively) depends on a scoped service would keep that
//!   scoped instance alive for the whole container ([`DiError::CaptiveDependency`]);
//! - a contract whose tree contains a scoped service cannot be resolved from the
//!   root scope ([`DiError::ScopedFromRoot`]).
//!
//! Transient services consumed by singletons are allowed.

use crate::call_site::{Argument, CallSite};
use crate::contract::{Contract, Lifetime, ServiceKey};
use crate::error::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;

/// Validates call sites and remembers which contracts need a child scope.
#[derive(Default)]
pub(crate) struct CallSiteValidator {
    /// First scoped service reachable from each validated contract
    scoped_services: DashMap<Contract, Option<ServiceKey>, RandomState>,
}

impl CallSiteValidator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Validate the tree realized for `contract`.
    pub(crate) fn validate_call_site(&self, contract: &Contract, site: &CallSite) -> Result<()> {
        let scoped = self.visit(site, None)?;
        self.scoped_services.insert(*contract, scoped);
        Ok(())
    }

    /// Reject resolving a scope-bound contract from the root scope.
    pub(crate) fn validate_resolution(&self, contract: &Contract, from_root: bool) -> Result<()> {
        if !from_root {
            return Ok(());
        }

        let scoped = self.scoped_services.get(contract).and_then(|entry| *entry.value());
        match scoped {
            Some(scoped) => Err(DiError::ScopedFromRoot {
                type_name: contract.key().type_name(),
                scoped: scoped.type_name(),
            }),
            None => Ok(()),
        }
    }

    /// Returns the first scoped service found under `site`. `singleton` is the
    /// nearest enclosing singleton, if any.
    fn visit(&self, site: &CallSite, singleton: Option<ServiceKey>) -> Result<Option<ServiceKey>> {
        match site {
            CallSite::Lifetime(cached) => match cached.lifetime {
                Lifetime::Singleton => {
                    // Whatever is scoped below has already been reported.
                    self.visit(&cached.inner, Some(site.key()))?;
                    Ok(None)
                }
                _ => {
                    if let Some(consumer) = singleton {
                        return Err(DiError::CaptiveDependency {
                            consumer: consumer.type_name(),
                            dependency: site.key().type_name(),
                        });
                    }
                    self.visit(&cached.inner, None)?;
                    Ok(Some(site.key()))
                }
            },
            CallSite::Constructor(ctor) => {
                let mut first = None;
                for argument in &ctor.arguments {
                    if let Argument::Site(inner) = argument {
                        let scoped = self.visit(inner, singleton)?;
                        first = first.or(scoped);
                    }
                }
                Ok(first)
            }
            CallSite::Enumerable(enumerable) => {
                let mut first = None;
                for item in &enumerable.items {
                    let scoped = self.visit(item, singleton)?;
                    first = first.or(scoped);
                }
                Ok(first)
            }
            CallSite::Factory(_) | CallSite::Constant(_) | CallSite::EmptyEnumerable(_) | CallSite::Scope => Ok(None),
        }
    }
}
