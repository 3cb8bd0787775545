//! Scope decorations controlling how often a provider is invoked.
//!
//! A scope is registered as a factory turning a provider into a decorated
//! provider. [`Scope::SINGLETON`] is always available; other scopes are
//! registered with [`ContextConfig::scope`](crate::ContextConfig::scope).

use std::fmt;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{ComponentRef, Context, Error, Instance, Provider, StdError};

/// Tag selecting a scope decoration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Scope(&'static str);

impl Scope {
    /// One instance per container, built on first lookup.
    pub const SINGLETON: Scope = Scope("singleton");

    pub const fn custom(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Factory decorating a provider with a scope.
///
/// A factory may refuse to decorate; the binder reports the refusal as
/// [`Error::IllegalBinding`].
pub type ScopeFactory = Box<dyn Fn(Box<dyn Provider>) -> Result<Box<dyn Provider>, StdError>>;

/// Caches the first value produced by the inner provider.
///
/// The inner provider runs at most once successfully, even when several threads
/// ask for the value at the same time. A failed attempt is not cached.
pub struct SingletonProvider {
    inner: Box<dyn Provider>,
    instance: OnceCell<Instance>,
}

impl SingletonProvider {
    pub fn new(inner: Box<dyn Provider>) -> Self {
        Self {
            inner,
            instance: OnceCell::new(),
        }
    }
}

impl Provider for SingletonProvider {
    fn get(&self, context: &Context) -> Result<Instance, Error> {
        self.instance
            .get_or_try_init(|| self.inner.get(context))
            .cloned()
    }

    fn dependencies(&self) -> Vec<ComponentRef> {
        self.inner.dependencies()
    }
}

/// Keeps up to `capacity` values and hands them out round-robin.
///
/// While the pool is not full every call builds a new value; afterwards calls
/// cycle through the pooled values in creation order.
pub struct PooledProvider {
    inner: Box<dyn Provider>,
    capacity: usize,
    pool: Mutex<Pool>,
}

struct Pool {
    instances: Vec<Instance>,
    next: usize,
}

impl PooledProvider {
    /// Fails if `capacity` is zero.
    pub fn new(inner: Box<dyn Provider>, capacity: usize) -> Result<Self, StdError> {
        if capacity == 0 {
            return Err("Pool capacity must be positive".into());
        }
        Ok(Self {
            inner,
            capacity,
            pool: Mutex::new(Pool {
                instances: Vec::with_capacity(capacity),
                next: 0,
            }),
        })
    }
}

impl Provider for PooledProvider {
    fn get(&self, context: &Context) -> Result<Instance, Error> {
        let mut pool = self.pool.lock();
        if pool.instances.len() < self.capacity {
            let instance = self.inner.get(context)?;
            pool.instances.push(instance);
        }
        let instance = pool.instances[pool.next].clone();
        pool.next = (pool.next + 1) % self.capacity;
        Ok(instance)
    }

    fn dependencies(&self) -> Vec<ComponentRef> {
        self.inner.dependencies()
    }
}

/// Scope factory building [`SingletonProvider`]s.
pub fn singleton(inner: Box<dyn Provider>) -> Result<Box<dyn Provider>, StdError> {
    Ok(Box::new(SingletonProvider::new(inner)))
}

/// Scope factory building [`PooledProvider`]s of the given capacity.
///
/// A zero capacity is accepted here and rejected when a binding uses the
/// scope.
///
/// # Examples
///
/// ```rust
/// use weld::{ContextConfig, Scope, pooled};
///
/// let mut config = ContextConfig::new();
/// config.scope(Scope::custom("pooled"), pooled(4));
/// ```
pub fn pooled(
    capacity: usize,
) -> impl Fn(Box<dyn Provider>) -> Result<Box<dyn Provider>, StdError> + 'static {
    move |inner| -> Result<Box<dyn Provider>, StdError> {
        Ok(Box::new(PooledProvider::new(inner, capacity)?))
    }
}
