//! Procedural macros for GDNative class registration
//!
//! Provides:
//! - `#[methods]` - Export the methods of an inherent impl block to the engine
//!
//! ## Generated code
//!
//! For every method taking `&self` or `&mut self`, `#[methods]` emits an
//! `unsafe extern "C"` trampoline with the NativeScript method signature.
//! The trampoline checks the argument count, recovers the instance from the
//! host's userdata pointer, converts each argument with `FromVariant` and the
//! return value with `ToVariant`.
//!
//! It also implements `NativeClassMethods` for the type, registering every
//! trampoline under the method's name.
//!
//! ## Method attributes
//!
//! - `#[method(rename = "name")]` - register under another name
//! - `#[method(rpc = "remote")]` - RPC mode (`disabled`, `remote`, `master`,
//!   `puppet`, `remote_sync`, `master_sync`, `puppet_sync`)
//! - `#[method(skip)]` - keep the method Rust-only
//!
//! A leading parameter of type `Owner` receives the engine object instead
//! of an argument.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, Expr, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, Type,
    parse_macro_input, spanned::Spanned,
};

/// Path to the gdnhl crate in generated code
fn crate_path() -> TokenStream2 {
    quote! { ::gdnhl }
}

// =============================================================================
// Attribute parsing
// =============================================================================

/// Arguments of `#[methods(...)]`
#[derive(Default)]
struct MethodsConfig {
    /// Extra registration hook, called before the methods are registered
    register_with: Option<Expr>,
}

impl MethodsConfig {
    fn parse(attr: TokenStream2) -> Result<Self, syn::Error> {
        let mut config = Self::default();
        if attr.is_empty() {
            return Ok(config);
        }
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("register_with") {
                config.register_with = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported #[methods] argument, expected `register_with = path`"))
            }
        });
        syn::parse::Parser::parse2(parser, attr)?;
        Ok(config)
    }
}

/// Arguments of `#[method(...)]` on a single method
#[derive(Default)]
struct MethodAttr {
    rename: Option<String>,
    rpc: Option<Ident>,
    skip: bool,
}

/// Map an RPC mode name to its `RpcMode` variant.
fn rpc_variant(name: &str) -> Option<&'static str> {
    Some(match name {
        "disabled" => "Disabled",
        "remote" => "Remote",
        "master" => "Master",
        "puppet" => "Puppet",
        "remote_sync" => "RemoteSync",
        "master_sync" => "MasterSync",
        "puppet_sync" => "PuppetSync",
        _ => return None,
    })
}

fn parse_method_attr(attrs: &[Attribute]) -> Result<MethodAttr, syn::Error> {
    let mut parsed = MethodAttr::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("method")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                parsed.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let name: LitStr = meta.value()?.parse()?;
                parsed.rename = Some(name.value());
                Ok(())
            } else if meta.path.is_ident("rpc") {
                let mode: LitStr = meta.value()?.parse()?;
                let variant = rpc_variant(&mode.value()).ok_or_else(|| {
                    syn::Error::new(mode.span(), format!("unknown rpc mode '{}'", mode.value()))
                })?;
                parsed.rpc = Some(Ident::new(variant, mode.span()));
                Ok(())
            } else {
                Err(meta.error("unsupported method attribute, expected `rename`, `rpc` or `skip`"))
            }
        })?;
    }
    Ok(parsed)
}

// =============================================================================
// Validation
// =============================================================================

/// Check a parameter type can be produced from a variant argument.
fn check_argument_type(ty: &Type) -> Result<(), String> {
    match ty {
        Type::Reference(type_ref) => {
            let mutability = if type_ref.mutability.is_some() {
                "&mut "
            } else {
                "&"
            };
            Err(format!(
                "{}T parameters cannot borrow from a variant argument. Take an owned type instead",
                mutability
            ))
        }
        Type::Ptr(_) => Err("raw pointer parameters cannot be read from a variant".into()),
        Type::ImplTrait(_) => Err("impl Trait parameters are not supported".into()),
        Type::TraitObject(_) => Err("trait object parameters are not supported".into()),
        Type::Slice(_) => Err("slice parameters are not supported. Use Vec<T> instead".into()),
        _ => Ok(()),
    }
}

/// Whether the method is exported at all: it needs a receiver.
fn has_receiver(method: &ImplItemFn) -> bool {
    method
        .sig
        .inputs
        .iter()
        .any(|arg| matches!(arg, FnArg::Receiver(_)))
}

fn validate_method(method: &ImplItemFn) -> Result<(), syn::Error> {
    let method_name = &method.sig.ident;
    let span = method_name.span();

    if method.sig.asyncness.is_some() {
        return Err(syn::Error::new(
            span,
            format!("method '{}': async methods cannot be exported", method_name),
        ));
    }

    if !method.sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            span,
            format!("method '{}': generic methods cannot be exported", method_name),
        ));
    }

    for arg in &method.sig.inputs {
        match arg {
            FnArg::Receiver(receiver) if receiver.reference.is_none() => {
                return Err(syn::Error::new(
                    receiver.self_token.span(),
                    format!(
                        "method '{}': self by value is not supported. Use &self or &mut self instead",
                        method_name
                    ),
                ));
            }
            FnArg::Receiver(_) => {}
            FnArg::Typed(pat_type) => {
                if !matches!(pat_type.pat.as_ref(), Pat::Ident(_)) {
                    return Err(syn::Error::new(
                        pat_type.pat.span(),
                        format!(
                            "method '{}': parameters must be plain identifiers",
                            method_name
                        ),
                    ));
                }
                if let Err(msg) = check_argument_type(&pat_type.ty) {
                    return Err(syn::Error::new(
                        pat_type.ty.span(),
                        format!("method '{}': {}", method_name, msg),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn validate_impl(input: &ItemImpl) -> Result<(), syn::Error> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[methods] must be applied to an inherent impl block",
        ));
    }

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "generic classes cannot be registered",
        ));
    }

    Ok(())
}

/// Whether `ty` names the `Owner` handle.
fn is_owner_type(ty: &Type) -> bool {
    matches!(ty, Type::Path(type_path)
        if type_path.path.segments.last().is_some_and(|s| s.ident == "Owner"))
}

// =============================================================================
// Code generation
// =============================================================================

struct ExportedMethod {
    name: Ident,
    exported_name: String,
    rpc: Ident,
    is_mut: bool,
    takes_owner: bool,
    arg_types: Vec<Type>,
}

impl ExportedMethod {
    fn from_method(method: &ImplItemFn, attr: MethodAttr) -> Self {
        let name = method.sig.ident.clone();
        let is_mut = method
            .sig
            .inputs
            .first()
            .is_some_and(|arg| matches!(arg, FnArg::Receiver(r) if r.mutability.is_some()));

        let typed: Vec<Type> = method
            .sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                FnArg::Typed(pat_type) => Some(pat_type.ty.as_ref().clone()),
                FnArg::Receiver(_) => None,
            })
            .collect();
        let takes_owner = typed.first().is_some_and(is_owner_type);
        let arg_types = typed.into_iter().skip(usize::from(takes_owner)).collect();

        Self {
            exported_name: attr.rename.unwrap_or_else(|| name.to_string()),
            rpc: attr.rpc.unwrap_or_else(|| format_ident!("Disabled")),
            name,
            is_mut,
            takes_owner,
            arg_types,
        }
    }

    fn wrapper_name(&self, class_name: &Ident) -> Ident {
        format_ident!("__{}__{}", class_name, self.name)
    }

    fn trampoline(&self, class_name: &Ident, self_ty: &Type) -> TokenStream2 {
        let krate = crate_path();
        let wrapper = self.wrapper_name(class_name);
        let method = &self.name;
        let exported_name = &self.exported_name;
        let arity = self.arg_types.len();

        let instance = if self.is_mut {
            quote! { #krate::nativescript::instance_mut::<#self_ty>(user_data) }
        } else {
            quote! { #krate::nativescript::instance_ref::<#self_ty>(user_data) }
        };

        let owner_arg = self
            .takes_owner
            .then(|| quote! { #krate::nativescript::Owner::from_sys(owner), });
        let args = self.arg_types.iter().enumerate().map(|(i, ty)| {
            quote! { args.get::<#ty>(#i) }
        });

        quote! {
            #[allow(non_snake_case, unused_variables, unused_comparisons)]
            unsafe extern "C" fn #wrapper(
                owner: *mut #krate::sys::GodotObject,
                method_data: *mut ::std::ffi::c_void,
                user_data: *mut ::std::ffi::c_void,
                num_args: ::std::ffi::c_int,
                args: *mut *mut #krate::sys::GodotVariant,
            ) -> #krate::sys::GodotVariant {
                let core = #krate::core();
                // SAFETY: the host passes `num_args` live argument pointers
                let args = unsafe { #krate::Args::from_sys(core, num_args, args) };
                if args.len() < #arity {
                    #krate::log::print_error(
                        core,
                        ::std::format_args!("Error: expected at least {} arguments", #arity),
                        #krate::location!(),
                    );
                    return #krate::Variant::nil(core).into_sys();
                }
                // SAFETY: userdata was created by this class's create trampoline
                let Some(this) = (unsafe { #instance }) else {
                    #krate::log::print_error(
                        core,
                        ::std::format_args!("{}: called without an instance", #exported_name),
                        #krate::location!(),
                    );
                    return #krate::Variant::nil(core).into_sys();
                };
                let ret = this.#method(#owner_arg #(#args),*);
                #krate::ToVariant::to_variant(&ret, core).into_sys()
            }
        }
    }
}

fn methods_impl(config: MethodsConfig, mut input: ItemImpl) -> Result<TokenStream2, syn::Error> {
    validate_impl(&input)?;

    let krate = crate_path();
    let self_ty = input.self_ty.as_ref().clone();
    let class_name = match &self_ty {
        Type::Path(type_path) => match type_path.path.segments.last() {
            Some(segment) => segment.ident.clone(),
            None => return Err(syn::Error::new(self_ty.span(), "Expected a type path")),
        },
        _ => return Err(syn::Error::new(self_ty.span(), "Expected a type path")),
    };

    let mut exported = Vec::new();
    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let attr = parse_method_attr(&method.attrs)?;
        // Helper attributes are ours; the compiler doesn't know them
        method.attrs.retain(|a| !a.path().is_ident("method"));

        if attr.skip || !has_receiver(method) {
            continue;
        }
        validate_method(method)?;
        exported.push(ExportedMethod::from_method(method, attr));
    }

    let trampolines = exported.iter().map(|m| m.trampoline(&class_name, &self_ty));
    let registrations = exported.iter().map(|m| {
        let wrapper = m.wrapper_name(&class_name);
        let name = &m.exported_name;
        let rpc = &m.rpc;
        quote! {
            builder.add_method_with_rpc(#name, #wrapper, #krate::sys::RpcMode::#rpc)?;
        }
    });
    let hook = config
        .register_with
        .as_ref()
        .map(|hook| quote! { (#hook)(builder)?; });

    Ok(quote! {
        #input

        #(#trampolines)*

        impl #krate::nativescript::NativeClassMethods for #self_ty {
            fn register_methods(
                builder: &#krate::nativescript::ClassBuilder<'_, Self>,
            ) -> #krate::Result<()> {
                #hook
                #(#registrations)*
                Ok(())
            }
        }
    })
}

/// Export the methods of an impl block to the engine.
///
/// The type must implement `NativeClass`. Methods without a receiver are
/// left alone.
///
/// # Example
/// ```ignore
/// #[methods]
/// impl Counter {
///     fn increment(&mut self, by: i64) -> i64 {
///         self.count += by;
///         self.count
///     }
///
///     #[method(rename = "get_count")]
///     fn count(&self) -> i64 { self.count }
///
///     #[method(skip)]
///     fn reset(&mut self) { self.count = 0 }
/// }
/// ```
///
/// `#[methods(register_with = Self::register)]` additionally calls
/// `fn register(builder: &ClassBuilder<Self>) -> gdnhl::Result<()>` to add
/// properties and signals.
#[proc_macro_attribute]
pub fn methods(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = match MethodsConfig::parse(attr.into()) {
        Ok(config) => config,
        Err(err) => return err.to_compile_error().into(),
    };
    let input = parse_macro_input!(item as ItemImpl);
    match methods_impl(config, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
