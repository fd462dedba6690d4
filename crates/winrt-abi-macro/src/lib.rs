//! Procedural macros for winrt-abi
//!
//! Provides:
//! - `#[winrt_interface("guid")]` - declare a statically known runtime interface
//!
//! The generated vtable embeds `IInspectableVTable` (slots 0-5) and appends
//! the trait's methods in declaration order, so the `k`-th method lands in
//! slot `6 + k`. Function pointers use `extern "system"`.
//!
//! Parameterized interfaces are not declared here: their identifiers are
//! derived at run time from the type catalog.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use proc_macro2::Span;
use syn::{
    FnArg, Ident, ItemTrait, LitStr, Pat, ReturnType, Token, TraitItem, TraitItemFn, Type,
    parse_macro_input, spanned::Spanned,
};

/// Returns the path to the winrt-abi crate.
///
/// When `internal` is true (used inside winrt-abi itself), this returns `crate`.
fn crate_path(internal: bool) -> TokenStream2 {
    if internal {
        quote! { crate }
    } else {
        quote! { ::winrt_abi }
    }
}

// =============================================================================
// Attribute arguments
// =============================================================================

struct InterfaceArgs {
    guid: LitStr,
    internal: bool,
}

impl Parse for InterfaceArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let guid: LitStr = input.parse()?;
        let mut internal = false;
        while input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let flag: Ident = input.parse()?;
            match flag.to_string().as_str() {
                "internal" => internal = true,
                other => {
                    return Err(syn::Error::new(
                        flag.span(),
                        format!("unknown option '{}': expected 'internal'", other),
                    ));
                }
            }
        }
        Ok(Self { guid, internal })
    }
}

// =============================================================================
// Signature checks
// =============================================================================

/// Managed Rust types that have no runtime ABI shape, with what to pass instead.
const MANAGED_TYPES: &[(&str, &str)] = &[
    ("String", "an HStringHandle"),
    ("str", "an HStringHandle"),
    ("HSTRING", "an HStringHandle"),
    ("Vec", "a u32 count followed by *const T"),
    ("Box", "*mut T"),
    ("Rc", "a raw object pointer"),
    ("Arc", "a raw object pointer"),
    ("ComObject", "a raw object pointer"),
    ("Option", "a nullable raw pointer"),
    ("Result", "an HRESULT return and an out-parameter"),
    ("bool", "u8 (runtime Booleans are one byte)"),
];

/// Reason `ty` cannot cross the runtime ABI, if any.
fn abi_shape_error(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => {
            let last = path.path.segments.last()?;
            MANAGED_TYPES
                .iter()
                .find(|(name, _)| last.ident == name)
                .map(|(name, instead)| format!("`{name}` has no ABI shape, pass {instead}"))
        }
        Type::Reference(_) => Some(
            "references cannot cross the ABI, use *const T or *mut T".to_string(),
        ),
        Type::Slice(_) | Type::Array(_) => {
            Some("arrays cross the ABI as a u32 count followed by a pointer".to_string())
        }
        Type::TraitObject(_) | Type::ImplTrait(_) => {
            Some("trait types cannot cross the ABI, declare another interface".to_string())
        }
        Type::Tuple(tuple) if !tuple.elems.is_empty() => {
            Some("tuples cannot cross the ABI, use a #[repr(C)] struct".to_string())
        }
        Type::Paren(inner) => abi_shape_error(&inner.elem),
        _ => None,
    }
}

fn returns_hresult(output: &ReturnType) -> bool {
    let ReturnType::Type(_, ty) = output else {
        return false;
    };
    matches!(ty.as_ref(), Type::Path(path)
        if path.path.segments.last().is_some_and(|s| s.ident == "HRESULT"))
}

fn check_method(method: &TraitItemFn) -> syn::Result<()> {
    let sig = &method.sig;
    let fail = |span: Span, what: &str| {
        Err(syn::Error::new(span, format!("`{}`: {what}", sig.ident)))
    };

    if let Some(token) = &sig.asyncness {
        return fail(token.span(), "vtable methods cannot be async");
    }
    if !sig.generics.params.is_empty() {
        return fail(sig.generics.span(), "vtable methods cannot be generic");
    }
    if method.default.is_some() {
        return fail(sig.ident.span(), "the native object supplies the body, remove it");
    }
    let takes_ref_self = matches!(sig.inputs.first(),
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none());
    if !takes_ref_self {
        return fail(sig.ident.span(), "the first parameter must be `&self`");
    }

    for input in sig.inputs.iter().skip(1) {
        let FnArg::Typed(param) = input else {
            return fail(input.span(), "only the first parameter may be a receiver");
        };
        if !matches!(param.pat.as_ref(), Pat::Ident(_)) {
            return fail(param.pat.span(), "parameters must be plain names");
        }
        if let Some(reason) = abi_shape_error(&param.ty) {
            return fail(param.ty.span(), &reason);
        }
    }

    if !returns_hresult(&sig.output) {
        return fail(
            sig.output.span(),
            "must return HRESULT, results go through out-parameters",
        );
    }
    Ok(())
}

fn check_interface(input: &ItemTrait) -> syn::Result<()> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "parameterized interfaces derive their identifiers at run time; \
             describe them in the type catalog instead",
        ));
    }
    if !input.supertraits.is_empty() {
        return Err(syn::Error::new(
            input.supertraits.span(),
            "every interface extends IInspectable, supertraits are not accepted",
        ));
    }
    input.items.iter().try_for_each(|item| match item {
        TraitItem::Fn(method) => check_method(method),
        other => Err(syn::Error::new(
            other.span(),
            "a runtime interface declares methods only",
        )),
    })
}

// =============================================================================
// Interface id
// =============================================================================

/// `(data1, data2, data3, data4)` of an interface id literal, braced or not.
fn interface_id(literal: &str) -> Result<(u32, u16, u16, [u8; 8]), String> {
    let text = literal.trim();
    let text = match text.strip_prefix('{') {
        Some(inner) => inner
            .strip_suffix('}')
            .ok_or_else(|| format!("`{literal}` opens a brace it never closes"))?,
        None => text,
    };

    let groups: Vec<&str> = text.split('-').collect();
    let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    if lengths != [8, 4, 4, 4, 12] {
        return Err(format!(
            "`{literal}` is not an interface id: expected 8-4-4-4-12 hex digit groups"
        ));
    }
    let hex: String = groups.concat();
    let value = u128::from_str_radix(&hex, 16)
        .map_err(|_| format!("`{literal}` contains a non-hex digit"))?;

    let bytes = value.to_be_bytes();
    let mut data4 = [0u8; 8];
    data4.copy_from_slice(&bytes[8..]);
    Ok((
        (value >> 96) as u32,
        (value >> 80) as u16,
        (value >> 64) as u16,
        data4,
    ))
}

// =============================================================================
// Code generation
// =============================================================================

struct MethodInfo {
    name: Ident,
    attrs: Vec<syn::Attribute>,
    param_names: Vec<Ident>,
    param_types: Vec<Type>,
    output: syn::ReturnType,
}

fn collect_methods(input: &ItemTrait) -> Vec<MethodInfo> {
    input
        .items
        .iter()
        .filter_map(|item| match item {
            TraitItem::Fn(method) => Some(method),
            _ => None,
        })
        .map(|method| {
            let params: Vec<(Ident, Type)> = method
                .sig
                .inputs
                .iter()
                .filter_map(|arg| {
                    if let FnArg::Typed(pat_type) = arg
                        && let Pat::Ident(pat_ident) = pat_type.pat.as_ref()
                    {
                        return Some((pat_ident.ident.clone(), pat_type.ty.as_ref().clone()));
                    }
                    None
                })
                .collect();
            MethodInfo {
                name: method.sig.ident.clone(),
                attrs: method
                    .attrs
                    .iter()
                    .filter(|attr| attr.path().is_ident("doc"))
                    .cloned()
                    .collect(),
                param_names: params.iter().map(|(n, _)| n.clone()).collect(),
                param_types: params.into_iter().map(|(_, t)| t).collect(),
                output: method.sig.output.clone(),
            }
        })
        .collect()
}

fn winrt_interface_internal(args: InterfaceArgs, input: ItemTrait) -> Result<TokenStream2, syn::Error> {
    check_interface(&input)?;

    let (data1, data2, data3, data4) =
        interface_id(&args.guid.value()).map_err(|e| syn::Error::new(args.guid.span(), e))?;

    let krate = crate_path(args.internal);
    let trait_name = &input.ident;
    let vtable_name = format_ident!("{}VTable", trait_name);
    let iid_name = format_ident!("IID_{}", trait_name.to_string().to_uppercase());
    let vis = &input.vis;
    let docs: Vec<_> = input
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .collect();

    let methods = collect_methods(&input);
    let method_count = methods.len();

    let mut vtable_fields = Vec::with_capacity(method_count);
    let mut wrapper_methods = Vec::with_capacity(method_count);
    let mut slot_consts = Vec::with_capacity(method_count);

    for (index, method) in methods.iter().enumerate() {
        let MethodInfo {
            name,
            attrs,
            param_names,
            param_types,
            output,
        } = method;

        vtable_fields.push(quote! {
            pub #name: unsafe extern "system" fn(
                this: *mut ::std::ffi::c_void
                #(, #param_names: #param_types)*
            ) #output
        });

        wrapper_methods.push(quote! {
            #(#attrs)*
            ///
            /// # Safety
            /// The object must be alive and every pointer argument valid for the call.
            #[inline]
            pub unsafe fn #name(&self #(, #param_names: #param_types)*) #output {
                unsafe { ((*self.vtable).#name)(self.as_raw() #(, #param_names)*) }
            }
        });

        let slot_name = format_ident!("{}_SLOT", name.to_string().to_uppercase());
        slot_consts.push(quote! {
            pub const #slot_name: usize = #krate::vtable::FIRST_METHOD_SLOT + #index;
        });
    }

    let guid_doc = format!("Interface id `{}`.", args.guid.value().trim());

    Ok(quote! {
        #[doc = #guid_doc]
        #vis const #iid_name: #krate::GUID =
            #krate::make_guid(#data1, #data2, #data3, [#(#data4),*]);

        #[repr(C)]
        #vis struct #vtable_name {
            pub base: #krate::IInspectableVTable,
            #(#vtable_fields,)*
        }

        #(#docs)*
        #[repr(C)]
        #vis struct #trait_name {
            pub vtable: *const #vtable_name,
        }

        impl #trait_name {
            #(#slot_consts)*

            /// # Safety
            /// `ptr` must be a live object pointer implementing this interface.
            #[inline]
            pub unsafe fn from_raw<'a>(ptr: *mut ::std::ffi::c_void) -> &'a Self {
                unsafe { &*(ptr as *const Self) }
            }

            #[inline]
            pub fn as_raw(&self) -> *mut ::std::ffi::c_void {
                self as *const Self as *mut ::std::ffi::c_void
            }

            #[inline]
            pub const fn iid() -> &'static #krate::GUID {
                &#iid_name
            }

            /// View the object through its IInspectable prefix.
            #[inline]
            pub fn as_inspectable(&self) -> &#krate::IInspectable {
                unsafe { &*(self as *const Self as *const #krate::IInspectable) }
            }

            #(#wrapper_methods)*
        }

        impl #krate::VTableLayout for #trait_name {
            type VTable = #vtable_name;
            const SLOT_COUNT: usize =
                <#krate::IInspectable as #krate::VTableLayout>::SLOT_COUNT + #method_count;
        }

        impl #krate::ComInterface for #trait_name {
            const IID: #krate::GUID = #iid_name;
        }
    })
}

/// Declare a statically known runtime interface.
///
/// This generates:
/// - `IID_{NAME}` parsed from the GUID string
/// - `{Name}VTable`: `IInspectableVTable` followed by the methods in order
/// - `{Name}`: a `#[repr(C)]` wrapper with one `unsafe fn` per method and a
///   `{METHOD}_SLOT` constant per method
/// - `VTableLayout` and `ComInterface` impls
///
/// Every method takes `&self` and returns `HRESULT`.
///
/// # Example
/// ```ignore
/// #[winrt_interface("96369f54-8eb6-48f0-abce-c1b211e627c3")]
/// pub trait IStringable {
///     fn to_string(&self, value: *mut HStringHandle) -> HRESULT;
/// }
/// ```
#[proc_macro_attribute]
pub fn winrt_interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as InterfaceArgs);
    let input = parse_macro_input!(item as ItemTrait);
    match winrt_interface_internal(args, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
