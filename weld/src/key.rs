//! Identities of bindable components.
//!
//! A [`ComponentKey`] names what a caller asks for: a requested type plus an
//! optional [`Qualifier`]. A [`ComponentRef`] wraps a key and records whether
//! the value is wanted directly or through a deferred [`Lazy`](crate::Lazy)
//! handle.

use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::Scope;

/// Tag disambiguating several bindings of the same type.
///
/// The set of qualifier kinds is closed: a qualifier either carries a name
/// (`Named`) or is a dataless marker identified by its tag (`Marker`). Values
/// of different kinds never compare equal.
///
/// # Examples
///
/// ```rust
/// use weld::Qualifier;
///
/// assert_eq!(Qualifier::named("primary"), Qualifier::named("primary"));
/// assert_ne!(Qualifier::named("primary"), Qualifier::marker("primary"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Qualifier {
    /// Qualifier carrying a name; equal when the names are equal.
    Named(Cow<'static, str>),
    /// Dataless marker qualifier; equal when the tags are equal.
    Marker(&'static str),
}

impl Qualifier {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    pub const fn marker(tag: &'static str) -> Self {
        Self::Marker(tag)
    }

    /// Returns `true` if the qualifier may be used in a binding.
    ///
    /// A qualifier with an empty name or tag does not identify anything and is
    /// rejected by the binder.
    pub fn is_legitimate(&self) -> bool {
        match self {
            Qualifier::Named(name) => !name.is_empty(),
            Qualifier::Marker(tag) => !tag.is_empty(),
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Named(name) => write!(f, "@Named({name:?})"),
            Qualifier::Marker(tag) => write!(f, "@{tag}"),
        }
    }
}

/// Identity of a bindable component: a requested type and an optional qualifier.
///
/// Two keys are equal when both the type and the qualifier are equal. The type
/// name is carried for diagnostics only.
///
/// # Examples
///
/// ```rust
/// use weld::{ComponentKey, Qualifier};
///
/// let plain = ComponentKey::of::<String>();
/// let named = ComponentKey::qualified::<String>(Qualifier::named("greeting"));
///
/// assert_ne!(plain, named);
/// assert_eq!(named.qualifier(), Some(&Qualifier::named("greeting")));
/// ```
#[derive(Clone)]
pub struct ComponentKey {
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<Qualifier>,
}

impl ComponentKey {
    /// Unqualified key of `T`.
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            qualifier: None,
        }
    }

    /// Key of `T` tagged with `qualifier`.
    pub fn qualified<T>(qualifier: Qualifier) -> Self
    where
        T: ?Sized + 'static,
    {
        Self::of::<T>().with_qualifier(Some(qualifier))
    }

    pub(crate) fn with_qualifier(&self, qualifier: Option<Qualifier>) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            qualifier,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// Returns `true` if the key requests `T`, whatever its qualifier.
    pub fn is<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.qualifier == other.qualifier
    }
}

impl Eq for ComponentKey {}

impl Hash for ComponentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.qualifier.hash(state);
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{} {}", qualifier, self.type_name),
            None => f.write_str(self.type_name),
        }
    }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKey({self})")
    }
}

/// How a dependency is requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// The value itself, built before the requiring component.
    Direct,
    /// A [`Lazy`](crate::Lazy) handle resolving the value on each invocation.
    Lazy,
}

/// A request for a component, either direct or through a deferred handle.
///
/// A lazy reference and a direct reference to the same key are different
/// values, but both resolve through the provider bound to that key. Lazy
/// references do not take part in cycle detection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentRef {
    key: ComponentKey,
    kind: RefKind,
}

impl ComponentRef {
    pub fn direct(key: ComponentKey) -> Self {
        Self {
            key,
            kind: RefKind::Direct,
        }
    }

    pub fn lazy(key: ComponentKey) -> Self {
        Self {
            key,
            kind: RefKind::Lazy,
        }
    }

    pub fn key(&self) -> &ComponentKey {
        &self.key
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }

    pub fn is_lazy(&self) -> bool {
        self.kind == RefKind::Lazy
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RefKind::Direct => write!(f, "{}", self.key),
            RefKind::Lazy => write!(f, "Lazy<{}>", self.key),
        }
    }
}

/// Extra information passed to a binder call besides the bound types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    Qualifier(Qualifier),
    Scope(Scope),
}

impl From<Qualifier> for Annotation {
    fn from(value: Qualifier) -> Self {
        Self::Qualifier(value)
    }
}

impl From<Scope> for Annotation {
    fn from(value: Scope) -> Self {
        Self::Scope(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_key_equality() {
        let a = ComponentKey::qualified::<u32>(Qualifier::named("a"));
        let b = ComponentKey::qualified::<u32>(Qualifier::named("a"));
        let c = ComponentKey::qualified::<u32>(Qualifier::marker("a"));
        let d = ComponentKey::qualified::<u64>(Qualifier::named("a"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, ComponentKey::of::<u32>());

        let keys: HashSet<_> = [a, b, c, d].into_iter().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_lazy_and_direct_refs_differ() {
        let key = ComponentKey::of::<String>();
        let direct = ComponentRef::direct(key.clone());
        let lazy = ComponentRef::lazy(key.clone());
        assert_ne!(direct, lazy);
        assert_eq!(direct.key(), lazy.key());
        assert!(lazy.is_lazy());
        assert!(!direct.is_lazy());
    }

    #[test]
    fn test_qualifier_legitimacy() {
        assert!(Qualifier::named("x").is_legitimate());
        assert!(Qualifier::marker("x").is_legitimate());
        assert!(!Qualifier::named("").is_legitimate());
        assert!(!Qualifier::marker("").is_legitimate());
    }

    #[test]
    fn test_display() {
        let key = ComponentKey::qualified::<u8>(Qualifier::named("port"));
        assert_eq!(key.to_string(), "@Named(\"port\") u8");
        assert_eq!(
            ComponentRef::lazy(ComponentKey::of::<u8>()).to_string(),
            "Lazy<u8>"
        );
    }
}
