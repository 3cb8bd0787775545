use std::collections::HashSet;
use std::sync::Arc;

use weld::{
    ComponentKey, Constructor, ContextConfig, Error, Field, Injectable, InjectionPoint, Method,
    Qualifier, TypeShape, upcast,
};

#[derive(Default)]
struct Base {
    calls: Vec<&'static str>,
    dependency: Option<String>,
}

impl Injectable for Base {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(Base::default())))
            .field(Field::new(
                "dependency",
                InjectionPoint::of::<String>(),
                |base: &mut Base, arguments| {
                    base.dependency = Some(arguments.next()?);
                    Ok(())
                },
            ))
            .method(Method::inject("install", |base: &mut Base, _| {
                base.calls.push("base.install");
                Ok(())
            }))
            .method(
                Method::inject("tune", |base: &mut Base, arguments| {
                    let _: u8 = arguments.next()?;
                    base.calls.push("base.tune");
                    Ok(())
                })
                .param(InjectionPoint::of::<u8>()),
            )
            .method(Method::inject("configure", |base: &mut Base, _| {
                base.calls.push("base.configure");
                Ok(())
            }))
            .method(Method::inject("prepare", |base: &mut Base, _| {
                base.calls.push("base.prepare");
                Ok(())
            }))
    }
}

struct Derived {
    base: Base,
    port: u32,
}

impl Injectable for Derived {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(
                Constructor::inject(|arguments| {
                    Ok(Derived {
                        base: Base::default(),
                        port: arguments.next()?,
                    })
                })
                .param(InjectionPoint::of::<u32>()),
            )
            .method(Method::inject("configure", |derived: &mut Derived, _| {
                derived.base.calls.push("derived.configure");
                Ok(())
            }))
            .method(Method::plain("prepare", &[]))
            .method(Method::plain("tune", &[]))
            .method(Method::inject("start", |derived: &mut Derived, _| {
                if derived.base.dependency.is_none() {
                    return Err("fields must be injected before methods".into());
                }
                derived.base.calls.push("derived.start");
                Ok(())
            }))
            .extends::<Base>(|derived| &mut derived.base)
    }
}

fn config() -> ContextConfig {
    let mut config = ContextConfig::new();
    config
        .bind_instance(8080u32, &[])
        .unwrap()
        .bind_instance("dependency".to_string(), &[])
        .unwrap()
        .bind_instance(3u8, &[])
        .unwrap();
    config
}

#[test]
fn test_constructor_field_and_method_injection() {
    let mut config = config();
    config.bind_component::<Derived>(&[]).unwrap();
    let context = config.context().unwrap();

    let derived = context.get::<Arc<Derived>>().unwrap().unwrap();
    assert_eq!(derived.port, 8080);
    assert_eq!(derived.base.dependency.as_deref(), Some("dependency"));
    assert_eq!(
        derived.base.calls,
        vec!["base.install", "base.tune", "derived.configure", "derived.start"]
    );
}

#[test]
fn test_base_component_alone_runs_its_methods() {
    let mut config = config();
    config.bind_component::<Base>(&[]).unwrap();
    let context = config.context().unwrap();

    let base = context.get::<Arc<Base>>().unwrap().unwrap();
    assert_eq!(
        base.calls,
        vec!["base.install", "base.tune", "base.configure", "base.prepare"]
    );
}

#[test]
fn test_declared_dependencies_checked() {
    let mut config = ContextConfig::new();
    config
        .bind_instance(8080u32, &[])
        .unwrap()
        .bind_component::<Derived>(&[])
        .unwrap();
    match config.context().err().unwrap() {
        Error::DependencyNotFound {
            component,
            dependency,
        } => {
            assert_eq!(component, ComponentKey::of::<Arc<Derived>>());
            assert_eq!(dependency, ComponentKey::of::<String>());
        }
        other => panic!("Unexpected error: {other}"),
    }
}

struct Broken;

impl Injectable for Broken {
    fn shape() -> TypeShape<Self> {
        TypeShape::new().constructor(Constructor::plain(|_| Err("disk is full".into())))
    }
}

struct FailingMethod;

impl Injectable for FailingMethod {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(FailingMethod)))
            .method(Method::inject("connect", |_: &mut FailingMethod, _| {
                Err("connection refused".into())
            }))
    }
}

#[test]
fn test_construction_errors_wrapped() {
    let mut config = ContextConfig::new();
    config
        .bind_component::<Broken>(&[])
        .unwrap()
        .bind_component::<FailingMethod>(&[])
        .unwrap();
    let context = config.context().unwrap();

    match context.get::<Arc<Broken>>().err().unwrap() {
        Error::Construction { component, source } => {
            assert_eq!(component, ComponentKey::of::<Arc<Broken>>());
            assert_eq!(source.to_string(), "disk is full");
        }
        other => panic!("Unexpected error: {other}"),
    }
    match context.get::<Arc<FailingMethod>>().err().unwrap() {
        Error::Construction { source, .. } => {
            assert_eq!(source.to_string(), "connection refused");
        }
        other => panic!("Unexpected error: {other}"),
    }
}

struct Immutable;

impl Injectable for Immutable {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(Immutable)))
            .field(
                Field::new("id", InjectionPoint::of::<u8>(), |_: &mut Immutable, _| {
                    Ok(())
                })
                .immutable(),
            )
    }
}

struct Ambiguous;

impl Injectable for Ambiguous {
    fn shape() -> TypeShape<Self> {
        TypeShape::new().constructor(
            Constructor::inject(|_| Ok(Ambiguous)).param(
                InjectionPoint::of::<u8>()
                    .qualified(Qualifier::named("a"))
                    .qualified(Qualifier::named("b")),
            ),
        )
    }
}

#[test]
fn test_construction_error_names_bound_key() {
    let mut config = ContextConfig::new();
    config
        .bind_component::<Broken>(&[Qualifier::named("x").into()])
        .unwrap();
    let context = config.context().unwrap();

    let bound = ComponentKey::qualified::<Arc<Broken>>(Qualifier::named("x"));
    match context
        .get_qualified::<Arc<Broken>>(Qualifier::named("x"))
        .err()
        .unwrap()
    {
        Error::Construction { component, .. } => assert_eq!(component, bound),
        other => panic!("Unexpected error: {other}"),
    }
}

struct TwoConstructors;

impl Injectable for TwoConstructors {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::inject(|_| Ok(TwoConstructors)))
            .constructor(
                Constructor::inject(|arguments| {
                    let _: u8 = arguments.next()?;
                    Ok(TwoConstructors)
                })
                .param(InjectionPoint::of::<u8>()),
            )
    }
}

struct GenericMethod;

impl Injectable for GenericMethod {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(GenericMethod)))
            .method(Method::inject("install", |_: &mut GenericMethod, _| Ok(())).generic())
    }
}

fn illegal(err: Error) -> (ComponentKey, String) {
    match err {
        Error::IllegalComponent { component, reason } => (component, reason),
        other => panic!("Unexpected error: {other}"),
    }
}

#[test]
fn test_illegal_components_rejected_at_bind() {
    let mut config = ContextConfig::new();
    let (component, _) = illegal(config.bind_component::<Immutable>(&[]).err().unwrap());
    assert_eq!(component, ComponentKey::of::<Arc<Immutable>>());
    assert!(matches!(
        config.bind_component::<Ambiguous>(&[]),
        Err(Error::IllegalComponent { .. })
    ));

    let (component, reason) = illegal(
        config
            .bind_component::<TwoConstructors>(&[])
            .err()
            .unwrap(),
    );
    assert_eq!(component, ComponentKey::of::<Arc<TwoConstructors>>());
    assert!(reason.contains("2 injectable constructors"));

    let (_, reason) = illegal(
        config
            .bind_type::<Arc<GenericMethod>, GenericMethod>(&[Qualifier::named("g").into()])
            .err()
            .unwrap(),
    );
    assert!(reason.contains("install declares type parameters"));
    assert!(config.is_empty());
}

struct FieldLeft {
    #[allow(unused)]
    right: Option<Arc<FieldRight>>,
}

impl Injectable for FieldLeft {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(FieldLeft { right: None })))
            .field(Field::new(
                "right",
                InjectionPoint::of::<Arc<FieldRight>>(),
                |left: &mut FieldLeft, arguments| {
                    left.right = Some(arguments.next()?);
                    Ok(())
                },
            ))
    }
}

struct FieldRight {
    #[allow(unused)]
    left: Option<Arc<FieldLeft>>,
}

impl Injectable for FieldRight {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(FieldRight { left: None })))
            .field(Field::new(
                "left",
                InjectionPoint::of::<Arc<FieldLeft>>(),
                |right: &mut FieldRight, arguments| {
                    right.left = Some(arguments.next()?);
                    Ok(())
                },
            ))
    }
}

fn cycle(err: Error) -> HashSet<ComponentKey> {
    match err {
        Error::CyclicDependency { components } => components,
        other => panic!("Unexpected error: {other}"),
    }
}

#[test]
fn test_field_injection_cycle() {
    let mut config = ContextConfig::new();
    config
        .bind_component::<FieldLeft>(&[])
        .unwrap()
        .bind_component::<FieldRight>(&[])
        .unwrap();
    assert_eq!(
        cycle(config.context().err().unwrap()),
        HashSet::from([
            ComponentKey::of::<Arc<FieldLeft>>(),
            ComponentKey::of::<Arc<FieldRight>>()
        ])
    );
}

// Constructor -> field -> method -> constructor.
struct First(#[allow(unused)] Arc<Second>);

impl Injectable for First {
    fn shape() -> TypeShape<Self> {
        TypeShape::new().constructor(
            Constructor::inject(|arguments| Ok(First(arguments.next()?)))
                .param(InjectionPoint::of::<Arc<Second>>()),
        )
    }
}

struct Second;

impl Injectable for Second {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(Second)))
            .field(Field::new(
                "third",
                InjectionPoint::of::<Arc<Third>>(),
                |_: &mut Second, _| Ok(()),
            ))
    }
}

struct Third;

impl Injectable for Third {
    fn shape() -> TypeShape<Self> {
        TypeShape::new()
            .constructor(Constructor::plain(|_| Ok(Third)))
            .method(
                Method::inject("attach", |_: &mut Third, _| Ok(()))
                    .param(InjectionPoint::of::<Arc<First>>()),
            )
    }
}

#[test]
fn test_three_component_cycle_across_injection_kinds() {
    let mut config = ContextConfig::new();
    config
        .bind_component::<First>(&[])
        .unwrap()
        .bind_component::<Second>(&[])
        .unwrap()
        .bind_component::<Third>(&[])
        .unwrap();
    assert_eq!(
        cycle(config.context().err().unwrap()),
        HashSet::from([
            ComponentKey::of::<Arc<First>>(),
            ComponentKey::of::<Arc<Second>>(),
            ComponentKey::of::<Arc<Third>>()
        ])
    );
}

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct English {
    name: String,
}

impl Injectable for English {
    fn shape() -> TypeShape<Self> {
        TypeShape::new().constructor(
            Constructor::inject(|arguments| {
                Ok(English {
                    name: arguments.next()?,
                })
            })
            .param(InjectionPoint::of::<String>().qualified(Qualifier::named("name"))),
        )
    }
}

impl Greeter for English {
    fn greet(&self) -> String {
        format!("Hello, {}!", self.name)
    }
}

upcast!(English => dyn Greeter);

#[test]
fn test_trait_object_binding() {
    let mut config = ContextConfig::new();
    config
        .bind_instance("world".to_string(), &[Qualifier::named("name").into()])
        .unwrap()
        .bind_type::<Arc<dyn Greeter>, English>(&[Qualifier::marker("english").into()])
        .unwrap();
    let context = config.context().unwrap();

    let greeter = context
        .get_qualified::<Arc<dyn Greeter>>(Qualifier::marker("english"))
        .unwrap()
        .unwrap();
    assert_eq!(greeter.greet(), "Hello, world!");
    assert!(context.get::<Arc<dyn Greeter>>().unwrap().is_none());
}
