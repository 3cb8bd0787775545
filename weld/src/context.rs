use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::{ComponentKey, Error, Instance, Provider, Qualifier};

pub(crate) type Providers = HashMap<ComponentKey, Arc<dyn Provider>>;

thread_local! {
    /// Keys being resolved on this thread, tagged with their registry.
    static RESOLVING: RefCell<Vec<(usize, ComponentKey)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a key as being resolved until dropped.
struct Resolving;

impl Resolving {
    fn enter(registry: usize, key: &ComponentKey) -> Result<Self, Error> {
        RESOLVING.with_borrow_mut(|stack| {
            if let Some(start) = stack
                .iter()
                .position(|(other, pending)| *other == registry && pending == key)
            {
                let components = stack[start..]
                    .iter()
                    .filter(|(other, _)| *other == registry)
                    .map(|(_, pending)| pending.clone())
                    .collect();
                return Err(Error::CyclicDependency { components });
            }
            stack.push((registry, key.clone()));
            Ok(Resolving)
        })
    }
}

impl Drop for Resolving {
    fn drop(&mut self) {
        RESOLVING.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}

/// Finalized container serving component lookups.
///
/// A `Context` is produced by [`ContextConfig::context`](crate::ContextConfig::context)
/// once every binding has been validated. It is cheap to clone and can be
/// shared between threads; the bindings it serves never change.
///
/// # Examples
///
/// ```rust
/// use weld::{ContextConfig, Qualifier};
///
/// # fn main() -> Result<(), weld::Error> {
/// let mut config = ContextConfig::new();
/// config.bind_instance(8080u16, &[Qualifier::named("port").into()])?;
/// let context = config.context()?;
///
/// assert_eq!(context.get_qualified::<u16>(Qualifier::named("port"))?, Some(8080));
/// assert_eq!(context.get::<u16>()?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Context {
    providers: Arc<Providers>,
}

impl Context {
    pub(crate) fn new(providers: Providers) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    /// Looks up the unqualified binding of `T`.
    ///
    /// Returns `Ok(None)` if `T` is not bound, and the construction error if
    /// building the value failed.
    pub fn get<T>(&self) -> Result<Option<T>, Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get_key(&ComponentKey::of::<T>())
    }

    /// Looks up the binding of `T` tagged with `qualifier`.
    pub fn get_qualified<T>(&self, qualifier: Qualifier) -> Result<Option<T>, Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get_key(&ComponentKey::qualified::<T>(qualifier))
    }

    /// Looks up the binding of `key`, expecting a value of type `T`.
    ///
    /// Fails with [`Error::CyclicDependency`] when `key` is already being
    /// resolved on this thread, which only a [`Lazy`] handle invoked while
    /// building a component can cause.
    pub fn get_key<T>(&self, key: &ComponentKey) -> Result<Option<T>, Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        let Some(provider) = self.providers.get(key) else {
            return Ok(None);
        };
        let instance = {
            let _resolving = Resolving::enter(self.registry(), key)?;
            provider.get(self)?
        };
        downcast(key, &instance).map(Some)
    }

    /// Returns a deferred handle to the unqualified binding of `T`.
    ///
    /// Returns `None` if `T` is not bound. Nothing is built until the handle is
    /// invoked.
    pub fn lazy<T>(&self) -> Option<Lazy<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.lazy_key(&ComponentKey::of::<T>())
    }

    /// Returns a deferred handle to the binding of `key`.
    pub fn lazy_key<T>(&self, key: &ComponentKey) -> Option<Lazy<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.contains(key).then(|| Lazy {
            providers: Arc::downgrade(&self.providers),
            key: key.clone(),
            _marker: PhantomData,
        })
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.providers.contains_key(key)
    }

    /// Iterates over every bound key.
    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.providers.keys()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn registry(&self) -> usize {
        Arc::as_ptr(&self.providers) as usize
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("components", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn downcast<T>(key: &ComponentKey, instance: &Instance) -> Result<T, Error>
where
    T: Clone + 'static,
{
    instance
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| Error::TypeMismatch {
            component: key.clone(),
            expected: std::any::type_name::<T>(),
        })
}

/// Deferred handle to a component.
///
/// Every call to [`Lazy::get`] looks the component up again, so its scope
/// decides whether the same value is returned. Depending on a `Lazy<T>`
/// instead of `T` breaks dependency cycles: the requiring component can be
/// built before `T`.
///
/// The handle does not keep the container alive; once every [`Context`] clone
/// is dropped, invoking it fails with [`Error::ContextDropped`].
pub struct Lazy<T> {
    providers: Weak<Providers>,
    key: ComponentKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Lazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Resolves the component.
    pub fn get(&self) -> Result<T, Error> {
        let providers = self
            .providers
            .upgrade()
            .ok_or_else(|| Error::ContextDropped {
                component: self.key.clone(),
            })?;
        let context = Context { providers };
        context
            .get_key(&self.key)?
            .ok_or_else(|| Error::DependencyNotFound {
                component: self.key.clone(),
                dependency: self.key.clone(),
            })
    }

    pub fn key(&self) -> &ComponentKey {
        &self.key
    }
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            providers: self.providers.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lazy<{}>", self.key)
    }
}
