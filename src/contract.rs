//! Contract identities, lifetimes and type-erased instances
//!
//! A contract is the type client code asks for. It may be a concrete type or an
//! unsized trait object such as `dyn Logger`. Instances travel through the engine
//! erased as [`Instance`], whose payload is always an `Arc<T>` for the contract `T`.

use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Type-erased service instance.
///
/// The concrete value behind the `dyn Any` is an `Arc<T>` for the contract `T`,
/// which lets unsized contracts be stored and recovered without unsafe casts.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Marker trait for types that can be used as a contract.
///
/// Automatically implemented for every `Send + Sync + 'static` type, including
/// trait objects like `dyn Logger` when the trait requires `Send + Sync`.
pub trait Injectable: Send + Sync + 'static {}

impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// Identity of a contract type.
///
/// Equality and hashing only consider the `TypeId`; the name is kept for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceKey {
    /// Key for contract `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Underlying `TypeId`
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Human-readable type name
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ServiceKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl std::fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}

/// A resolution request: one instance of a contract, or every registration of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contract {
    /// The last registration of the contract
    Single(ServiceKey),
    /// All registrations of the contract, in registration order
    Collection(ServiceKey),
}

impl Contract {
    /// Single-instance request for `T`
    #[inline]
    pub fn single<T: ?Sized + 'static>() -> Self {
        Self::Single(ServiceKey::of::<T>())
    }

    /// Collection request for `T`
    #[inline]
    pub fn collection<T: ?Sized + 'static>() -> Self {
        Self::Collection(ServiceKey::of::<T>())
    }

    /// Element key of the request
    #[inline]
    pub fn key(&self) -> ServiceKey {
        match self {
            Self::Single(key) | Self::Collection(key) => *key,
        }
    }
}

impl std::fmt::Display for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(key) => write!(f, "{key}"),
            Self::Collection(key) => write!(f, "[{key}]"),
        }
    }
}

/// Service lifetime policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// One instance per container, created on first use
    #[default]
    Singleton,

    /// One instance per scope
    Scoped,

    /// New instance created on every resolve
    Transient,
}

impl Lifetime {
    /// Lowercase name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        }
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Erased result of a collection request.
pub struct ServiceList(pub(crate) Vec<Instance>);

impl ServiceList {
    /// Number of items
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no registration matched
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Items in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.0.iter()
    }
}

/// Erase a typed instance.
#[inline]
pub fn erase<T: ?Sized + Injectable>(instance: Arc<T>) -> Instance {
    Arc::new(instance)
}

/// Recover the typed instance from an erased one.
///
/// Returns `None` when the payload is not an `Arc<T>`.
#[inline]
pub fn downcast<T: ?Sized + Injectable>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}

/// Recover a typed collection from an erased [`ServiceList`] instance.
pub(crate) fn downcast_list<T: ?Sized + Injectable>(instance: &Instance) -> Option<Vec<Arc<T>>> {
    let list = downcast::<ServiceList>(instance)?;
    list.iter().map(downcast::<T>).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn test_key_identity_ignores_name_formatting() {
        assert_eq!(ServiceKey::of::<dyn Greeter>(), ServiceKey::of::<dyn Greeter>());
        assert_ne!(ServiceKey::of::<dyn Greeter>(), ServiceKey::of::<English>());
    }

    #[test]
    fn test_erase_and_downcast_trait_object() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let erased = erase(Arc::clone(&greeter));

        let back = downcast::<dyn Greeter>(&erased).unwrap();
        assert_eq!(back.greet(), "hello");
        assert!(Arc::ptr_eq(&back, &greeter));

        assert!(downcast::<English>(&erased).is_none());
    }

    #[test]
    fn test_contract_display() {
        assert_eq!(Contract::single::<u32>().to_string(), "u32");
        assert_eq!(Contract::collection::<u32>().to_string(), "[u32]");
    }
}
