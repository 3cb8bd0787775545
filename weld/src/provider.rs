use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{ComponentRef, Context, Error, InjectionMetadata, Upcast};

/// Type-erased component value.
///
/// The boxed value always has the type requested by the key it was produced for;
/// [`Context`] clones it out when serving a lookup.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Strategy producing the value bound to a key.
///
/// Providers are created at bind time, owned by the container for its whole
/// lifetime and invoked on every lookup of their key. The dependencies they
/// declare are checked before the container is handed out.
///
/// # Examples
///
/// ```rust
/// use weld::{Context, ContextConfig, Error, Instance, Provider};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// struct Sequence(AtomicU64);
///
/// impl Provider for Sequence {
///     fn get(&self, _context: &Context) -> Result<Instance, Error> {
///         Ok(Arc::new(self.0.fetch_add(1, Ordering::SeqCst)))
///     }
/// }
///
/// # fn main() -> Result<(), Error> {
/// let mut config = ContextConfig::new();
/// config.bind_provider::<u64>(Sequence(AtomicU64::new(7)), &[])?;
/// let context = config.context()?;
///
/// assert_eq!(context.get::<u64>()?, Some(7));
/// assert_eq!(context.get::<u64>()?, Some(8));
/// # Ok(())
/// # }
/// ```
pub trait Provider: Send + Sync {
    /// Produces a value, resolving dependencies through `context`.
    fn get(&self, context: &Context) -> Result<Instance, Error>;

    /// Declares the components required by [`Provider::get`].
    fn dependencies(&self) -> Vec<ComponentRef> {
        Vec::new()
    }
}

impl<P> Provider for Box<P>
where
    P: Provider + ?Sized,
{
    fn get(&self, context: &Context) -> Result<Instance, Error> {
        P::get(self, context)
    }

    fn dependencies(&self) -> Vec<ComponentRef> {
        P::dependencies(self)
    }
}

/// Provider returning one pre-built value.
pub struct InstanceProvider {
    instance: Instance,
}

impl InstanceProvider {
    pub fn new<T>(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            instance: Arc::new(value),
        }
    }
}

impl Provider for InstanceProvider {
    fn get(&self, _context: &Context) -> Result<Instance, Error> {
        Ok(self.instance.clone())
    }
}

/// Provider building a new `I` on every call from its injection metadata and
/// exposing it as the handle type `H`.
pub struct InjectionProvider<I, H> {
    metadata: InjectionMetadata<I>,
    _handle: PhantomData<fn() -> H>,
}

impl<I, H> InjectionProvider<I, H>
where
    I: Send + Sync + 'static,
    H: Upcast<I>,
{
    pub fn new(metadata: InjectionMetadata<I>) -> Self {
        Self {
            metadata,
            _handle: PhantomData,
        }
    }
}

impl<I, H> Provider for InjectionProvider<I, H>
where
    I: Send + Sync + 'static,
    H: Upcast<I>,
{
    fn get(&self, context: &Context) -> Result<Instance, Error> {
        let component = self.metadata.build(context)?;
        Ok(Arc::new(H::upcast(Arc::new(component))))
    }

    fn dependencies(&self) -> Vec<ComponentRef> {
        self.metadata.dependencies()
    }
}
