//! Injection metadata: how a component type is constructed and populated.
//!
//! A component type describes its injection points with a [`TypeShape`]: the
//! constructors it declares, the injectable fields and methods of every layer
//! of its inheritance chain, and the scopes it is annotated with. The shape is
//! usually generated by `#[derive(Injectable)]` or `#[injectable]`, but can be
//! written by hand.
//!
//! [`InjectionMetadata::resolve`] applies the selection rules to a shape and
//! yields the single recipe the container runs for every new instance.
//!
//! # Examples
//!
//! A component with constructor, field and method injection:
//!
//! ```rust
//! use weld::{
//!     Constructor, ContextConfig, Error, Field, Injectable, InjectionPoint, Method, TypeShape,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Greeter {
//!     greeting: String,
//!     name: Option<String>,
//!     punctuation: char,
//! }
//!
//! impl Injectable for Greeter {
//!     fn shape() -> TypeShape<Self> {
//!         TypeShape::new()
//!             .constructor(
//!                 Constructor::inject(|arguments| {
//!                     Ok(Greeter {
//!                         greeting: arguments.next()?,
//!                         ..Default::default()
//!                     })
//!                 })
//!                 .param(InjectionPoint::of::<String>()),
//!             )
//!             .field(Field::new(
//!                 "name",
//!                 InjectionPoint::of::<&'static str>(),
//!                 |greeter: &mut Greeter, arguments| {
//!                     greeter.name = Some(arguments.next::<&'static str>()?.to_string());
//!                     Ok(())
//!                 },
//!             ))
//!             .method(
//!                 Method::inject("punctuate", |greeter: &mut Greeter, arguments| {
//!                     greeter.punctuation = arguments.next()?;
//!                     Ok(())
//!                 })
//!                 .param(InjectionPoint::of::<char>()),
//!             )
//!     }
//! }
//!
//! # fn main() -> Result<(), Error> {
//! let mut config = ContextConfig::new();
//! config
//!     .bind_instance("Hello".to_string(), &[])?
//!     .bind_instance("world", &[])?
//!     .bind_instance('!', &[])?
//!     .bind_component::<Greeter>(&[])?;
//! let context = config.context()?;
//!
//! let greeter = context.get::<Arc<Greeter>>()?.unwrap();
//! assert_eq!(greeter.greeting, "Hello");
//! assert_eq!(greeter.name.as_deref(), Some("world"));
//! assert_eq!(greeter.punctuation, '!');
//! # Ok(())
//! # }
//! ```

use std::any::{Any, type_name};
use std::sync::Arc;

use tracing::trace;

use crate::{ComponentKey, ComponentRef, Context, Error, Lazy, Qualifier, RefKind, Scope, StdError};

/// Types the container can construct and populate.
///
/// The implementation describes the type's injection points; the container
/// validates the description when the type is bound.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn shape() -> TypeShape<Self>;
}

/// Converts a built component into the handle type a key is bound to.
///
/// Every `Arc<I>` is its own handle. Trait-object handles are declared with
/// [`upcast!`](crate::upcast).
pub trait Upcast<I>: Clone + Send + Sync + 'static {
    fn upcast(component: Arc<I>) -> Self;
}

impl<I> Upcast<I> for Arc<I>
where
    I: Send + Sync + 'static,
{
    fn upcast(component: Arc<I>) -> Self {
        component
    }
}

/// Declares that components may be bound to trait-object handles.
///
/// # Examples
///
/// ```rust
/// use weld::{ContextConfig, Error, Injectable, upcast};
/// use std::sync::Arc;
///
/// trait Storage: Send + Sync {
///     fn name(&self) -> &'static str;
/// }
///
/// #[derive(Injectable)]
/// struct MemoryStorage;
///
/// impl Storage for MemoryStorage {
///     fn name(&self) -> &'static str {
///         "memory"
///     }
/// }
///
/// upcast!(MemoryStorage => dyn Storage);
///
/// # fn main() -> Result<(), Error> {
/// let mut config = ContextConfig::new();
/// config.bind_type::<Arc<dyn Storage>, MemoryStorage>(&[])?;
/// let storage = config.context()?.get::<Arc<dyn Storage>>()?.unwrap();
/// assert_eq!(storage.name(), "memory");
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! upcast {
    ($($component:ty => $interface:ty),+ $(,)?) => {
        $(
            impl $crate::Upcast<$component> for ::std::sync::Arc<$interface> {
                fn upcast(component: ::std::sync::Arc<$component>) -> Self {
                    component
                }
            }
        )+
    };
}

/// Resolved dependency values handed to a construction recipe, a field setter
/// or an injectable method, in declaration order.
pub struct Arguments {
    values: std::vec::IntoIter<Box<dyn Any + Send>>,
}

impl Arguments {
    fn new(values: Vec<Box<dyn Any + Send>>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }

    /// Takes the next argument.
    ///
    /// Fails if the arguments are exhausted or the next one is not an `A`.
    pub fn next<A>(&mut self) -> Result<A, StdError>
    where
        A: 'static,
    {
        let value = self
            .values
            .next()
            .ok_or_else(|| format!("Missing argument: {}", type_name::<A>()))?;
        match value.downcast::<A>() {
            Ok(value) => Ok(*value),
            Err(_) => Err(format!("Argument is not a {}", type_name::<A>()).into()),
        }
    }
}

type ResolveFn = fn(&Context, &ComponentKey, &ComponentKey) -> Result<Box<dyn Any + Send>, Error>;

type BuildFn<T> = Box<dyn Fn(&mut Arguments) -> Result<T, StdError> + Send + Sync>;

type ApplyFn<T> = Box<dyn Fn(&mut T, &mut Arguments) -> Result<(), StdError> + Send + Sync>;

fn resolve_direct<T>(
    context: &Context,
    component: &ComponentKey,
    dependency: &ComponentKey,
) -> Result<Box<dyn Any + Send>, Error>
where
    T: Clone + Send + Sync + 'static,
{
    let value = context
        .get_key::<T>(dependency)?
        .ok_or_else(|| Error::DependencyNotFound {
            component: component.clone(),
            dependency: dependency.clone(),
        })?;
    Ok(Box::new(value))
}

fn resolve_lazy<T>(
    context: &Context,
    component: &ComponentKey,
    dependency: &ComponentKey,
) -> Result<Box<dyn Any + Send>, Error>
where
    T: Clone + Send + Sync + 'static,
{
    let handle = context
        .lazy_key::<T>(dependency)
        .ok_or_else(|| Error::DependencyNotFound {
            component: component.clone(),
            dependency: dependency.clone(),
        })?;
    Ok(Box::new(handle))
}

/// A single injected value: a constructor or method parameter, or a field.
///
/// The required key is derived from the declared type. A point declared as
/// [`InjectionPoint::lazy`] receives a [`Lazy<T>`] and requires `T` lazily.
#[derive(Clone)]
pub struct InjectionPoint {
    declared: &'static str,
    target: ComponentKey,
    kind: RefKind,
    qualifiers: Vec<Qualifier>,
    resolve: ResolveFn,
}

impl InjectionPoint {
    /// Point receiving a `T`.
    pub fn of<T>() -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            declared: type_name::<T>(),
            target: ComponentKey::of::<T>(),
            kind: RefKind::Direct,
            qualifiers: Vec::new(),
            resolve: resolve_direct::<T>,
        }
    }

    /// Point receiving a [`Lazy<T>`].
    pub fn lazy<T>() -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            declared: type_name::<Lazy<T>>(),
            target: ComponentKey::of::<T>(),
            kind: RefKind::Lazy,
            qualifiers: Vec::new(),
            resolve: resolve_lazy::<T>,
        }
    }

    /// Adds a qualifier. More than one qualifier makes the component illegal.
    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// Name of the declared type, `Lazy<T>` for lazy points.
    pub fn declared_type(&self) -> &'static str {
        self.declared
    }

    fn requirement(&self, component: &ComponentKey) -> Result<Requirement, Error> {
        let qualifier = match self.qualifiers.as_slice() {
            [] => None,
            [qualifier] if qualifier.is_legitimate() => Some(qualifier.clone()),
            [qualifier] => {
                return Err(Error::IllegalComponent {
                    component: component.clone(),
                    reason: format!(
                        "Illegitimate qualifier {qualifier} on injection point {}",
                        self.declared
                    ),
                });
            }
            _ => {
                return Err(Error::IllegalComponent {
                    component: component.clone(),
                    reason: format!(
                        "Injection point {} has {} qualifiers",
                        self.declared,
                        self.qualifiers.len()
                    ),
                });
            }
        };
        let key = self.target.with_qualifier(qualifier);
        let reference = match self.kind {
            RefKind::Direct => ComponentRef::direct(key),
            RefKind::Lazy => ComponentRef::lazy(key),
        };
        Ok(Requirement {
            reference,
            resolve: self.resolve,
        })
    }
}

/// A declared constructor of `T`.
pub struct Constructor<T> {
    injectable: bool,
    params: Vec<InjectionPoint>,
    build: BuildFn<T>,
}

impl<T> Constructor<T> {
    /// Constructor marked for injection.
    pub fn inject<F>(build: F) -> Self
    where
        F: Fn(&mut Arguments) -> Result<T, StdError> + Send + Sync + 'static,
    {
        Self {
            injectable: true,
            params: Vec::new(),
            build: Box::new(build),
        }
    }

    /// Constructor without the injection mark.
    ///
    /// Only used when it takes no parameters and no constructor is marked.
    pub fn plain<F>(build: F) -> Self
    where
        F: Fn(&mut Arguments) -> Result<T, StdError> + Send + Sync + 'static,
    {
        Self {
            injectable: false,
            params: Vec::new(),
            build: Box::new(build),
        }
    }

    pub fn param(mut self, point: InjectionPoint) -> Self {
        self.params.push(point);
        self
    }
}

/// An injectable field of `T`.
pub struct Field<T> {
    name: &'static str,
    point: InjectionPoint,
    mutable: bool,
    set: ApplyFn<T>,
}

impl<T: 'static> Field<T> {
    pub fn new<F>(name: &'static str, point: InjectionPoint, set: F) -> Self
    where
        F: Fn(&mut T, &mut Arguments) -> Result<(), StdError> + Send + Sync + 'static,
    {
        Self {
            name,
            point,
            mutable: true,
            set: Box::new(set),
        }
    }

    /// Marks the field read-only, which makes the component illegal.
    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    fn lift<D: 'static>(self, project: fn(&mut D) -> &mut T) -> Field<D> {
        let set = self.set;
        Field {
            name: self.name,
            point: self.point,
            mutable: self.mutable,
            set: Box::new(move |component: &mut D, arguments: &mut Arguments| {
                set(project(component), arguments)
            }),
        }
    }
}

/// A method declared by `T`, injectable or not.
///
/// Non-injectable declarations matter only for override suppression: a method
/// with the same name and parameter types in a more derived layer hides the
/// base declaration.
pub struct Method<T> {
    name: &'static str,
    params: Vec<InjectionPoint>,
    signature: Vec<&'static str>,
    injectable: bool,
    generic: bool,
    invoke: ApplyFn<T>,
}

impl<T: 'static> Method<T> {
    /// Method marked for injection.
    pub fn inject<F>(name: &'static str, invoke: F) -> Self
    where
        F: Fn(&mut T, &mut Arguments) -> Result<(), StdError> + Send + Sync + 'static,
    {
        Self {
            name,
            params: Vec::new(),
            signature: Vec::new(),
            injectable: true,
            generic: false,
            invoke: Box::new(invoke),
        }
    }

    /// Method without the injection mark, described by its name and the
    /// type names of its parameters.
    pub fn plain(name: &'static str, signature: &[&'static str]) -> Self {
        Self {
            name,
            params: Vec::new(),
            signature: signature.to_vec(),
            injectable: false,
            generic: false,
            invoke: Box::new(|_: &mut T, _: &mut Arguments| Ok(())),
        }
    }

    pub fn param(mut self, point: InjectionPoint) -> Self {
        self.signature.push(point.declared);
        self.params.push(point);
        self
    }

    /// Marks the method as declaring its own type parameters, which makes the
    /// component illegal when the method is injectable.
    pub fn generic(mut self) -> Self {
        self.generic = true;
        self
    }

    fn overrides(&self, other: &Method<T>) -> bool {
        self.name == other.name && self.signature == other.signature
    }

    fn lift<D: 'static>(self, project: fn(&mut D) -> &mut T) -> Method<D> {
        let invoke = self.invoke;
        Method {
            name: self.name,
            params: self.params,
            signature: self.signature,
            injectable: self.injectable,
            generic: self.generic,
            invoke: Box::new(move |component: &mut D, arguments: &mut Arguments| {
                invoke(project(component), arguments)
            }),
        }
    }
}

/// Fields and methods declared by one type of an inheritance chain.
struct Layer<T> {
    type_name: &'static str,
    fields: Vec<Field<T>>,
    methods: Vec<Method<T>>,
}

impl<T: 'static> Layer<T> {
    fn lift<D: 'static>(self, project: fn(&mut D) -> &mut T) -> Layer<D> {
        Layer {
            type_name: self.type_name,
            fields: self.fields.into_iter().map(|f| f.lift(project)).collect(),
            methods: self.methods.into_iter().map(|m| m.lift(project)).collect(),
        }
    }
}

/// Declared shape of a component type.
pub struct TypeShape<T> {
    constructors: Vec<Constructor<T>>,
    layers: Vec<Layer<T>>,
    scopes: Vec<Scope>,
}

impl<T: 'static> TypeShape<T> {
    pub fn new() -> Self {
        Self {
            constructors: Vec::new(),
            layers: vec![Layer {
                type_name: type_name::<T>(),
                fields: Vec::new(),
                methods: Vec::new(),
            }],
            scopes: Vec::new(),
        }
    }

    pub fn constructor(mut self, constructor: Constructor<T>) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Declares a field of `T` itself.
    pub fn field(mut self, field: Field<T>) -> Self {
        self.layers[0].fields.push(field);
        self
    }

    /// Declares a method of `T` itself.
    pub fn method(mut self, method: Method<T>) -> Self {
        self.layers[0].methods.push(method);
        self
    }

    /// Declares a scope annotation on `T`.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Appends the layers of the base component `B` embedded in `T`.
    ///
    /// Fields and methods of `B` are applied through `project`. Constructors
    /// and scopes of `B` are not inherited.
    pub fn extends<B>(mut self, project: fn(&mut T) -> &mut B) -> Self
    where
        B: Injectable,
    {
        let base = B::shape();
        self.layers
            .extend(base.layers.into_iter().map(|layer| layer.lift(project)));
        self
    }
}

impl<T: 'static> Default for TypeShape<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Requirement {
    reference: ComponentRef,
    resolve: ResolveFn,
}

struct Injection<A> {
    required: Vec<Requirement>,
    apply: A,
}

impl<A> Injection<A> {
    fn new(
        component: &ComponentKey,
        points: &[InjectionPoint],
        apply: A,
    ) -> Result<Self, Error> {
        let required = points
            .iter()
            .map(|point| point.requirement(component))
            .collect::<Result<_, _>>()?;
        Ok(Self { required, apply })
    }

    fn arguments(&self, context: &Context, component: &ComponentKey) -> Result<Arguments, Error> {
        let values = self
            .required
            .iter()
            .map(|r| (r.resolve)(context, component, r.reference.key()))
            .collect::<Result<_, _>>()?;
        Ok(Arguments::new(values))
    }
}

/// Validated construction recipe of `T`.
///
/// Holds exactly one constructor, the injectable fields of every layer, and
/// the injectable methods in root-to-derived invocation order.
pub struct InjectionMetadata<T> {
    component: ComponentKey,
    constructor: Injection<BuildFn<T>>,
    fields: Vec<Injection<ApplyFn<T>>>,
    methods: Vec<Injection<ApplyFn<T>>>,
    scopes: Vec<Scope>,
}

impl<T: 'static> InjectionMetadata<T> {
    /// Applies the selection rules to a declared shape.
    ///
    /// Fails with [`Error::IllegalComponent`] when the shape declares several
    /// injectable constructors, neither an injectable nor a no-argument
    /// constructor, an immutable injectable field, a generic injectable
    /// method, or an injection point with several qualifiers.
    pub fn resolve(shape: TypeShape<T>) -> Result<Self, Error> {
        Self::resolve_for(ComponentKey::of::<T>(), shape)
    }

    /// Same as [`InjectionMetadata::resolve`], reporting errors against the
    /// key the component is bound to.
    pub fn resolve_for(component: ComponentKey, shape: TypeShape<T>) -> Result<Self, Error> {
        let constructor = select_constructor(&component, shape.constructors)?;
        let (fields, methods) = collect_members(&component, shape.layers)?;
        Ok(Self {
            component,
            constructor,
            fields,
            methods,
            scopes: shape.scopes,
        })
    }

    pub fn component(&self) -> &ComponentKey {
        &self.component
    }

    /// Scopes declared on the component type.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Keys required by the constructor, the fields and the methods.
    pub fn dependencies(&self) -> Vec<ComponentRef> {
        std::iter::once(&self.constructor.required)
            .chain(self.fields.iter().map(|f| &f.required))
            .chain(self.methods.iter().map(|m| &m.required))
            .flatten()
            .map(|r| r.reference.clone())
            .collect()
    }

    /// Builds a new instance: construct, set fields, invoke methods.
    pub fn build(&self, context: &Context) -> Result<T, Error> {
        let mut arguments = self.constructor.arguments(context, &self.component)?;
        let mut component = (self.constructor.apply)(&mut arguments)
            .map_err(|source| self.construction(source))?;
        for target in self.fields.iter().chain(&self.methods) {
            let mut arguments = target.arguments(context, &self.component)?;
            (target.apply)(&mut component, &mut arguments)
                .map_err(|source| self.construction(source))?;
        }
        trace!(component = %self.component, "Constructed component");
        Ok(component)
    }

    fn construction(&self, source: StdError) -> Error {
        Error::Construction {
            component: self.component.clone(),
            source,
        }
    }
}

fn illegal(component: &ComponentKey, reason: String) -> Error {
    Error::IllegalComponent {
        component: component.clone(),
        reason,
    }
}

fn select_constructor<T>(
    component: &ComponentKey,
    constructors: Vec<Constructor<T>>,
) -> Result<Injection<BuildFn<T>>, Error> {
    let injectable = constructors.iter().filter(|c| c.injectable).count();
    if injectable > 1 {
        return Err(illegal(
            component,
            format!("{injectable} injectable constructors declared"),
        ));
    }
    let selected = if injectable == 1 {
        constructors.into_iter().find(|c| c.injectable)
    } else {
        constructors.into_iter().find(|c| c.params.is_empty())
    };
    let constructor = selected.ok_or_else(|| {
        illegal(
            component,
            "Neither an injectable nor a no-argument constructor declared".to_string(),
        )
    })?;
    Injection::new(component, &constructor.params, constructor.build)
}

type Members<T> = (Vec<Injection<ApplyFn<T>>>, Vec<Injection<ApplyFn<T>>>);

fn collect_members<T: 'static>(
    component: &ComponentKey,
    layers: Vec<Layer<T>>,
) -> Result<Members<T>, Error> {
    let mut fields = Vec::new();
    // Injectable methods kept per layer, derived first.
    let mut kept: Vec<Vec<Method<T>>> = Vec::new();
    // Plain declarations of the layers visited so far.
    let mut hidden: Vec<Method<T>> = Vec::new();
    for layer in layers {
        for field in layer.fields {
            if !field.mutable {
                return Err(illegal(
                    component,
                    format!("Injectable field {}::{} is immutable", layer.type_name, field.name),
                ));
            }
            fields.push(Injection::new(
                component,
                std::slice::from_ref(&field.point),
                field.set,
            )?);
        }
        let (injectable, plain): (Vec<_>, Vec<_>) =
            layer.methods.into_iter().partition(|m| m.injectable);
        let mut layer_methods = Vec::new();
        for method in injectable {
            let overridden = kept.iter().flatten().any(|m| m.overrides(&method))
                || hidden.iter().any(|m| m.overrides(&method));
            if overridden {
                continue;
            }
            if method.generic {
                return Err(illegal(
                    component,
                    format!(
                        "Injectable method {}::{} declares type parameters",
                        layer.type_name, method.name
                    ),
                ));
            }
            layer_methods.push(method);
        }
        kept.push(layer_methods);
        hidden.extend(plain);
    }
    let methods = kept
        .into_iter()
        .rev()
        .flatten()
        .map(|method| Injection::new(component, &method.params, method.invoke))
        .collect::<Result<_, _>>()?;
    Ok((fields, methods))
}
