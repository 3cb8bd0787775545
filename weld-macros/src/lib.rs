use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

use syn::parse::ParseStream;
use syn::spanned::Spanned as _;
use syn::{
    Attribute, Data, DeriveInput, Error, FnArg, GenericArgument, Ident, ImplItem, ImplItemFn,
    ItemImpl, LitStr, Member, Pat, PathArguments, ReturnType, Signature, Token, Type,
};

const INJECT_ATTR: &str = "inject";
const NAMED_ATTR: &str = "named";
const QUALIFIER_ATTR: &str = "qualifier";
const SCOPE_ATTR: &str = "scope";
const EXTENDS_ATTR: &str = "extends";

fn extract_lazy_type(ty: &Type) -> Option<Type> {
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == "Lazy"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return Some(inner.clone());
    }
    None
}

fn returns_result(output: &ReturnType) -> bool {
    if let ReturnType::Type(_, ty) = output
        && let Type::Path(type_path) = ty.as_ref()
        && let Some(segment) = type_path.path.segments.last()
    {
        return segment.ident == "Result";
    }
    false
}

fn is_qualifier_attr(attr: &Attribute) -> bool {
    attr.path().is_ident(NAMED_ATTR) || attr.path().is_ident(QUALIFIER_ATTR)
}

fn qualifiers(attrs: &[Attribute]) -> Result<Vec<TokenStream2>, Error> {
    let mut qualifiers = Vec::new();
    for attr in attrs {
        if attr.path().is_ident(NAMED_ATTR) {
            let name: LitStr = attr.parse_args()?;
            qualifiers.push(quote! { ::weld::Qualifier::named(#name) });
        } else if attr.path().is_ident(QUALIFIER_ATTR) {
            let tag = attr.parse_args::<Ident>()?.to_string();
            qualifiers.push(quote! { ::weld::Qualifier::marker(#tag) });
        }
    }
    Ok(qualifiers)
}

fn scopes(attrs: &[Attribute]) -> Result<Vec<TokenStream2>, Error> {
    let mut scopes = Vec::new();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(SCOPE_ATTR)) {
        let name = attr.parse_args_with(|input: ParseStream| {
            if input.peek(LitStr) {
                Ok(input.parse::<LitStr>()?.value())
            } else {
                Ok(input.parse::<Ident>()?.to_string())
            }
        })?;
        scopes.push(if name == "singleton" {
            quote! { ::weld::Scope::SINGLETON }
        } else {
            quote! { ::weld::Scope::custom(#name) }
        });
    }
    Ok(scopes)
}

fn injection_point(ty: &Type, attrs: &[Attribute]) -> Result<TokenStream2, Error> {
    let mut point = match extract_lazy_type(ty) {
        Some(inner) => quote! { ::weld::InjectionPoint::lazy::<#inner>() },
        None => quote! { ::weld::InjectionPoint::of::<#ty>() },
    };
    for qualifier in qualifiers(attrs)? {
        point = quote! { #point.qualified(#qualifier) };
    }
    Ok(point)
}

/// Derive macro for the `Injectable` trait.
///
/// Every field is injected through the generated constructor unless marked:
///
/// - `#[inject(default)]` initializes the field with `Default::default()`;
/// - `#[inject(field)]` initializes it with `Default::default()` and injects
///   it after construction;
/// - `#[inject(base)]` initializes it with `Default::default()` and injects
///   its own fields and methods as the base layer of the component.
///
/// `#[named("name")]` and `#[qualifier(tag)]` qualify an injected field.
/// `#[scope(singleton)]` on the struct declares its scope.
#[proc_macro_derive(Injectable, attributes(inject, named, qualifier, scope))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    handle_derive_injectable(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Attribute macro for impl blocks declaring injection points.
///
/// - `#[inject]` on an associated function marks it as constructor;
/// - `#[inject]` on a `&self` or `&mut self` method marks it for method
///   injection;
/// - an unmarked `fn new()` without parameters is the fallback constructor.
///
/// Put `#[scope(...)]` and `#[extends(field: Base)]` below `#[injectable]` to
/// declare the scope and the base component.
#[proc_macro_attribute]
pub fn injectable(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return TokenStream::from(
            Error::new(
                proc_macro2::Span::call_site(),
                "#[injectable] does not take arguments",
            )
            .to_compile_error(),
        );
    }
    if let Ok(item_impl) = syn::parse::<ItemImpl>(item) {
        return handle_injectable_impl(item_impl)
            .unwrap_or_else(Error::into_compile_error)
            .into();
    }
    TokenStream::from(
        Error::new(
            proc_macro2::Span::call_site(),
            "#[injectable] can only be applied to impl blocks",
        )
        .to_compile_error(),
    )
}

enum FieldRole {
    Constructor,
    Default,
    Field,
    Base,
}

fn field_role(attrs: &[Attribute]) -> Result<FieldRole, Error> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident(INJECT_ATTR)) else {
        return Ok(FieldRole::Constructor);
    };
    let role: Ident = attr.parse_args()?;
    match role.to_string().as_str() {
        "default" => Ok(FieldRole::Default),
        "field" => Ok(FieldRole::Field),
        "base" => Ok(FieldRole::Base),
        _ => Err(Error::new(
            role.span(),
            "Expected #[inject(default)], #[inject(field)] or #[inject(base)]",
        )),
    }
}

fn handle_derive_injectable(input: DeriveInput) -> Result<TokenStream2, Error> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Generic components are not supported",
        ));
    }
    let Data::Struct(data) = &input.data else {
        return Err(Error::new(name.span(), "Only structs are supported"));
    };

    let mut lets = Vec::new();
    let mut params = Vec::new();
    let mut inits = Vec::new();
    let mut members = Vec::new();

    for (index, field) in data.fields.iter().enumerate() {
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(index.into()),
        };
        let ty = &field.ty;
        match field_role(&field.attrs)? {
            FieldRole::Constructor => {
                let binding = format_ident!("arg{}", index);
                let point = injection_point(ty, &field.attrs)?;
                lets.push(quote! { let #binding = arguments.next::<#ty>()?; });
                params.push(quote! { .param(#point) });
                inits.push(quote! { #member: #binding });
            }
            FieldRole::Default => {
                inits.push(quote! { #member: ::std::default::Default::default() });
            }
            FieldRole::Field => {
                let field_name = match &member {
                    Member::Named(ident) => ident.to_string(),
                    Member::Unnamed(index) => index.index.to_string(),
                };
                let point = injection_point(ty, &field.attrs)?;
                inits.push(quote! { #member: ::std::default::Default::default() });
                members.push(quote! {
                    .field(::weld::Field::new(
                        #field_name,
                        #point,
                        |component: &mut Self, arguments: &mut ::weld::Arguments| {
                            component.#member = arguments.next::<#ty>()?;
                            Ok(())
                        },
                    ))
                });
            }
            FieldRole::Base => {
                inits.push(quote! { #member: ::std::default::Default::default() });
                members.push(quote! {
                    .extends::<#ty>(|component| &mut component.#member)
                });
            }
        }
    }

    let arguments = if lets.is_empty() {
        quote! { _ }
    } else {
        quote! { arguments }
    };
    let scopes = scopes(&input.attrs)?;

    Ok(quote! {
        impl ::weld::Injectable for #name {
            fn shape() -> ::weld::TypeShape<Self> {
                ::weld::TypeShape::new()
                    .constructor(
                        ::weld::Constructor::inject(|#arguments: &mut ::weld::Arguments| {
                            #(#lets)*
                            Ok(Self { #(#inits,)* })
                        })
                        #(#params)*
                    )
                    #(#members)*
                    #(.scope(#scopes))*
            }
        }
    })
}

struct Params {
    names: Vec<Ident>,
    lets: Vec<TokenStream2>,
    points: Vec<TokenStream2>,
}

impl Params {
    fn arguments(&self) -> TokenStream2 {
        if self.names.is_empty() {
            quote! { _ }
        } else {
            quote! { arguments }
        }
    }
}

/// Collects the injected parameters of a signature and strips their
/// qualifier attributes.
fn injected_params(sig: &mut Signature) -> Result<Params, Error> {
    let mut params = Params {
        names: Vec::new(),
        lets: Vec::new(),
        points: Vec::new(),
    };
    for input in sig.inputs.iter_mut() {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(Error::new(
                pat_type.pat.span(),
                "Only simple bindings supported",
            ));
        };
        let ty = &pat_type.ty;
        if matches!(ty.as_ref(), Type::Reference(_) | Type::ImplTrait(_)) {
            return Err(Error::new(
                ty.span(),
                "Injected parameters must be owned values",
            ));
        }
        let name = pat_ident.ident.clone();
        params.points.push(injection_point(ty, &pat_type.attrs)?);
        params
            .lets
            .push(quote! { let #name = arguments.next::<#ty>()?; });
        params.names.push(name);
        pat_type.attrs.retain(|attr| !is_qualifier_attr(attr));
    }
    Ok(params)
}

fn check_injectable_fn(method: &ImplItemFn) -> Result<(), Error> {
    if method.sig.asyncness.is_some() {
        return Err(Error::new(
            method.sig.span(),
            "Injectable functions cannot be async",
        ));
    }
    if !method.sig.generics.params.is_empty() {
        return Err(Error::new(
            method.sig.generics.span(),
            "Injectable functions cannot declare type parameters",
        ));
    }
    Ok(())
}

fn constructor(method: &mut ImplItemFn, injectable: bool) -> Result<TokenStream2, Error> {
    check_injectable_fn(method)?;
    let fn_name = method.sig.ident.clone();
    let params = injected_params(&mut method.sig)?;
    let Params { names, lets, points } = &params;
    let arguments = params.arguments();
    let call = quote! { Self::#fn_name(#(#names),*) };
    let body = if returns_result(&method.sig.output) {
        quote! { #call.map_err(::std::convert::Into::into) }
    } else {
        quote! { Ok(#call) }
    };
    let kind = if injectable {
        quote! { inject }
    } else {
        quote! { plain }
    };
    Ok(quote! {
        .constructor(
            ::weld::Constructor::#kind(|#arguments: &mut ::weld::Arguments| {
                #(#lets)*
                #body
            })
            #(.param(#points))*
        )
    })
}

fn injectable_method(method: &mut ImplItemFn) -> Result<TokenStream2, Error> {
    check_injectable_fn(method)?;
    if let Some(receiver) = method.sig.receiver()
        && receiver.reference.is_none()
    {
        return Err(Error::new(
            receiver.span(),
            "Injectable methods must take &self or &mut self",
        ));
    }
    let fn_name = method.sig.ident.clone();
    let name = fn_name.to_string();
    let params = injected_params(&mut method.sig)?;
    let Params { names, lets, points } = &params;
    let arguments = params.arguments();
    let call = quote! { component.#fn_name(#(#names),*) };
    let body = if returns_result(&method.sig.output) {
        quote! { #call.map(|_| ()).map_err(::std::convert::Into::into) }
    } else {
        quote! {
            #call;
            Ok(())
        }
    };
    Ok(quote! {
        .method(
            ::weld::Method::inject(
                #name,
                |component: &mut Self, #arguments: &mut ::weld::Arguments| {
                    #(#lets)*
                    #body
                },
            )
            #(.param(#points))*
        )
    })
}

/// Describes an unmarked method so that it can hide injectable methods of
/// base components. Methods whose signature cannot be named are skipped.
fn plain_method(method: &ImplItemFn) -> Option<TokenStream2> {
    let receiver = method.sig.receiver()?;
    if receiver.reference.is_none() || !method.sig.generics.params.is_empty() {
        return None;
    }
    let mut types = Vec::new();
    for input in &method.sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if matches!(pat_type.ty.as_ref(), Type::Reference(_) | Type::ImplTrait(_)) {
                return None;
            }
            types.push(&pat_type.ty);
        }
    }
    let name = method.sig.ident.to_string();
    Some(quote! {
        .method(::weld::Method::plain(
            #name,
            &[#(::std::any::type_name::<#types>()),*],
        ))
    })
}

fn extends(attrs: &[Attribute]) -> Result<Vec<TokenStream2>, Error> {
    let mut bases = Vec::new();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(EXTENDS_ATTR)) {
        let (member, ty) = attr.parse_args_with(|input: ParseStream| {
            let member: Member = input.parse()?;
            input.parse::<Token![:]>()?;
            let ty: Type = input.parse()?;
            Ok((member, ty))
        })?;
        bases.push(quote! {
            .extends::<#ty>(|component| &mut component.#member)
        });
    }
    Ok(bases)
}

fn handle_injectable_impl(mut input: ItemImpl) -> Result<TokenStream2, Error> {
    if input.trait_.is_some() {
        return Err(Error::new(input.span(), "Trait impls are not supported"));
    }
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Generic components are not supported",
        ));
    }

    let scopes = scopes(&input.attrs)?;
    let bases = extends(&input.attrs)?;
    input
        .attrs
        .retain(|attr| !attr.path().is_ident(SCOPE_ATTR) && !attr.path().is_ident(EXTENDS_ATTR));

    let mut constructors = Vec::new();
    let mut methods = Vec::new();
    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let injectable = method
            .attrs
            .iter()
            .any(|attr| attr.path().is_ident(INJECT_ATTR));
        method.attrs.retain(|attr| !attr.path().is_ident(INJECT_ATTR));
        let has_receiver = method.sig.receiver().is_some();
        match (injectable, has_receiver) {
            (true, false) => constructors.push(constructor(method, true)?),
            (true, true) => methods.push(injectable_method(method)?),
            (false, false) => {
                if method.sig.ident == "new"
                    && method.sig.inputs.is_empty()
                    && method.sig.generics.params.is_empty()
                    && method.sig.asyncness.is_none()
                {
                    constructors.push(constructor(method, false)?);
                }
            }
            (false, true) => methods.extend(plain_method(method)),
        }
    }

    let self_ty = &input.self_ty;
    Ok(quote! {
        #input

        impl ::weld::Injectable for #self_ty {
            fn shape() -> ::weld::TypeShape<Self> {
                ::weld::TypeShape::new()
                    #(#constructors)*
                    #(#methods)*
                    #(#bases)*
                    #(.scope(#scopes))*
            }
        }
    })
}
