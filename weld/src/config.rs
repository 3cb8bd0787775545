use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::Providers;
use crate::{
    Annotation, ComponentKey, Context, Error, Injectable, InjectionMetadata, InjectionProvider,
    InstanceProvider, Provider, Qualifier, Scope, ScopeFactory, StdError, Upcast, singleton,
};

/// Registry of bindings, frozen into a [`Context`] by [`ContextConfig::context`].
///
/// Binding calls validate their own arguments immediately. Dependencies
/// between bindings are only checked when the context is created, so
/// components may be bound in any order.
///
/// # Examples
///
/// ```rust
/// use weld::{ContextConfig, Injectable, Qualifier, Scope};
/// use std::sync::Arc;
///
/// #[derive(Injectable)]
/// struct Database {
///     #[named("url")]
///     url: String,
/// }
///
/// # fn main() -> Result<(), weld::Error> {
/// let mut config = ContextConfig::new();
/// config
///     .bind_instance("postgres://localhost".to_string(), &[Qualifier::named("url").into()])?
///     .bind_component::<Database>(&[Scope::SINGLETON.into()])?;
/// let context = config.context()?;
///
/// let first = context.get::<Arc<Database>>()?.unwrap();
/// let second = context.get::<Arc<Database>>()?.unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(first.url, "postgres://localhost");
/// # Ok(())
/// # }
/// ```
pub struct ContextConfig {
    providers: Providers,
    scopes: HashMap<Scope, ScopeFactory>,
}

impl ContextConfig {
    /// Creates an empty configuration with the singleton scope registered.
    pub fn new() -> Self {
        let mut scopes: HashMap<Scope, ScopeFactory> = HashMap::new();
        scopes.insert(Scope::SINGLETON, Box::new(singleton));
        Self {
            providers: HashMap::new(),
            scopes,
        }
    }

    /// Binds a pre-built value.
    ///
    /// The value is registered under every qualifier in `annotations`, or
    /// under the unqualified key of `T` when there is none. Scopes cannot be
    /// applied to instances.
    pub fn bind_instance<T>(&mut self, value: T, annotations: &[Annotation]) -> Result<&mut Self, Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = ComponentKey::of::<T>();
        let (qualifiers, scopes) = split(&key, annotations)?;
        if let Some(scope) = scopes.first() {
            return Err(Error::IllegalBinding {
                key,
                reason: format!("Scope {scope} cannot be applied to an instance"),
            });
        }
        self.register(key, qualifiers, Arc::new(InstanceProvider::new(value)));
        Ok(self)
    }

    /// Binds the handle type `T` to component type `I`.
    ///
    /// A new `I` is built on every lookup, unless a scope is given in
    /// `annotations` or declared by `I`. An explicit scope replaces the
    /// declared ones.
    ///
    /// Errors raised by the metadata of `I`, now or when building it, name the
    /// bound key, qualified by the first qualifier in `annotations`.
    pub fn bind_type<T, I>(&mut self, annotations: &[Annotation]) -> Result<&mut Self, Error>
    where
        T: Upcast<I>,
        I: Injectable,
    {
        let key = ComponentKey::of::<T>();
        let (qualifiers, scopes) = split(&key, annotations)?;
        let bound = key.with_qualifier(qualifiers.first().cloned());
        let metadata = InjectionMetadata::resolve_for(bound, I::shape())?;
        let scopes = if scopes.is_empty() {
            metadata.scopes().to_vec()
        } else {
            scopes
        };
        let provider = self.scoped(&key, &scopes, Box::new(InjectionProvider::<I, T>::new(metadata)))?;
        self.register(key, qualifiers, Arc::from(provider));
        Ok(self)
    }

    /// Binds `Arc<I>` to component type `I`.
    pub fn bind_component<I>(&mut self, annotations: &[Annotation]) -> Result<&mut Self, Error>
    where
        I: Injectable,
    {
        self.bind_type::<Arc<I>, I>(annotations)
    }

    /// Binds `T` to a custom provider.
    ///
    /// The provider must produce values of type `T`; lookups of a value of
    /// another type fail with [`Error::TypeMismatch`].
    pub fn bind_provider<T>(
        &mut self,
        provider: impl Provider + 'static,
        annotations: &[Annotation],
    ) -> Result<&mut Self, Error>
    where
        T: 'static,
    {
        let key = ComponentKey::of::<T>();
        let (qualifiers, scopes) = split(&key, annotations)?;
        let provider = self.scoped(&key, &scopes, Box::new(provider))?;
        self.register(key, qualifiers, Arc::from(provider));
        Ok(self)
    }

    /// Registers a scope decoration. Registering a scope twice replaces the
    /// previous factory.
    pub fn scope<F>(&mut self, scope: Scope, factory: F) -> &mut Self
    where
        F: Fn(Box<dyn Provider>) -> Result<Box<dyn Provider>, StdError> + 'static,
    {
        debug!(%scope, "Registered scope");
        self.scopes.insert(scope, Box::new(factory));
        self
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.providers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Validates the dependency graph and freezes the bindings.
    ///
    /// Every dependency declared by a provider must be bound, and direct
    /// dependencies must not form a cycle. Lazy dependencies are not followed.
    pub fn context(self) -> Result<Context, Error> {
        let mut used = HashMap::new();
        let mut stack = Vec::new();
        for key in self.providers.keys() {
            if !used.contains_key(key) {
                check_dependencies(key, &self.providers, &mut stack, &mut used)?;
            }
        }
        debug!(components = self.providers.len(), "Created context");
        Ok(Context::new(self.providers))
    }

    fn scoped(
        &self,
        key: &ComponentKey,
        scopes: &[Scope],
        provider: Box<dyn Provider>,
    ) -> Result<Box<dyn Provider>, Error> {
        let scope = match scopes {
            [] => return Ok(provider),
            [scope] => scope,
            _ => {
                return Err(Error::IllegalBinding {
                    key: key.clone(),
                    reason: format!("{} scopes given", scopes.len()),
                });
            }
        };
        let factory = self.scopes.get(scope).ok_or_else(|| Error::IllegalBinding {
            key: key.clone(),
            reason: format!("Scope {scope} is not registered"),
        })?;
        factory(provider).map_err(|source| Error::IllegalBinding {
            key: key.clone(),
            reason: format!("Scope {scope} rejected the binding: {source}"),
        })
    }

    fn register(&mut self, key: ComponentKey, qualifiers: Vec<Qualifier>, provider: Arc<dyn Provider>) {
        let keys = if qualifiers.is_empty() {
            vec![key]
        } else {
            qualifiers
                .into_iter()
                .map(|qualifier| key.with_qualifier(Some(qualifier)))
                .collect()
        };
        for key in keys {
            debug!(component = %key, "Bound component");
            if self.providers.insert(key.clone(), provider.clone()).is_some() {
                warn!(component = %key, "Replaced existing binding");
            }
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn split(key: &ComponentKey, annotations: &[Annotation]) -> Result<(Vec<Qualifier>, Vec<Scope>), Error> {
    let mut qualifiers = Vec::new();
    let mut scopes = Vec::new();
    for annotation in annotations {
        match annotation {
            Annotation::Qualifier(qualifier) if qualifier.is_legitimate() => {
                qualifiers.push(qualifier.clone())
            }
            Annotation::Qualifier(qualifier) => {
                return Err(Error::IllegalBinding {
                    key: key.clone(),
                    reason: format!("Illegitimate qualifier {qualifier}"),
                });
            }
            Annotation::Scope(scope) => scopes.push(*scope),
        }
    }
    Ok((qualifiers, scopes))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DependencyStatus {
    Pending,
    Ready,
}

fn check_dependencies(
    key: &ComponentKey,
    providers: &Providers,
    stack: &mut Vec<ComponentKey>,
    used: &mut HashMap<ComponentKey, DependencyStatus>,
) -> Result<(), Error> {
    let Some(provider) = providers.get(key) else {
        return Ok(());
    };
    used.insert(key.clone(), DependencyStatus::Pending);
    stack.push(key.clone());
    for dependency in provider.dependencies() {
        let dep_key = dependency.key();
        if !providers.contains_key(dep_key) {
            return Err(Error::DependencyNotFound {
                component: key.clone(),
                dependency: dep_key.clone(),
            });
        }
        if dependency.is_lazy() {
            continue;
        }
        match used.get(dep_key) {
            Some(DependencyStatus::Pending) => {
                let start = stack.iter().position(|k| k == dep_key).unwrap_or(0);
                let components: HashSet<_> = stack[start..].iter().cloned().collect();
                return Err(Error::CyclicDependency { components });
            }
            Some(DependencyStatus::Ready) => continue,
            None => {}
        }
        check_dependencies(dep_key, providers, stack, used)?;
    }
    stack.pop();
    used.insert(key.clone(), DependencyStatus::Ready);
    Ok(())
}
