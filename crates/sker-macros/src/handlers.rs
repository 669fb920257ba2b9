use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{
    Expr, ExprLit, ImplItem, ItemImpl, Lit, MetaNameValue, Token, parse_macro_input,
    punctuated::Punctuated,
};

/// A marker attribute (`#[tool]`, `#[resource]`, `#[prompt]`) applied
/// outside an `impl` block carrying `#[handlers]`. Nothing to collect, so
/// the item passes through unchanged.
pub fn passthrough(_attr: TokenStream, item: TokenStream) -> TokenStream {
    item
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Tool,
    Resource,
    Prompt,
}

impl Kind {
    fn attr_name(self) -> &'static str {
        match self {
            Kind::Tool => "tool",
            Kind::Resource => "resource",
            Kind::Prompt => "prompt",
        }
    }

    fn request_kind_tokens(self) -> proc_macro2::TokenStream {
        match self {
            Kind::Tool => quote! { ::sker_core::RequestKind::Tool },
            Kind::Resource => quote! { ::sker_core::RequestKind::Resource },
            Kind::Prompt => quote! { ::sker_core::RequestKind::Prompt },
        }
    }
}

/// One `key = "value"` pair parsed out of `#[tool(...)]`'s arguments.
struct MarkerArgs {
    name: Option<String>,
    description: Option<String>,
    input_schema: Option<String>,
}

fn parse_marker_args(attr: &syn::Attribute) -> syn::Result<MarkerArgs> {
    let mut args = MarkerArgs {
        name: None,
        description: None,
        input_schema: None,
    };
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(args);
    }
    let pairs: Punctuated<MetaNameValue, Token![,]> =
        attr.parse_args_with(Punctuated::parse_terminated)?;
    for pair in pairs {
        let key = pair
            .path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default();
        let Expr::Lit(ExprLit {
            lit: Lit::Str(value),
            ..
        }) = &pair.value
        else {
            return Err(syn::Error::new_spanned(&pair.value, "expected a string literal"));
        };
        match key.as_str() {
            "name" => args.name = Some(value.value()),
            "description" => args.description = Some(value.value()),
            "input_schema" => args.input_schema = Some(value.value()),
            other => {
                return Err(syn::Error::new_spanned(
                    &pair.path,
                    format!("unknown argument `{other}`; expected name, description, or input_schema"),
                ));
            }
        }
    }
    Ok(args)
}

struct CollectedHandler {
    kind: Kind,
    method_ident: syn::Ident,
    name: String,
    description: Option<String>,
    input_schema: String,
}

pub fn expand(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as ItemImpl);
    let self_ty = input.self_ty.clone();

    let mut collected = Vec::new();
    let mut parse_error = None;

    for impl_item in &mut input.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let marker_idx = method.attrs.iter().position(|attr| {
            [Kind::Tool, Kind::Resource, Kind::Prompt]
                .iter()
                .any(|k| attr.path().is_ident(k.attr_name()))
        });
        let Some(idx) = marker_idx else {
            continue;
        };
        let attr = method.attrs.remove(idx);
        let kind = if attr.path().is_ident("tool") {
            Kind::Tool
        } else if attr.path().is_ident("resource") {
            Kind::Resource
        } else {
            Kind::Prompt
        };
        let args = match parse_marker_args(&attr) {
            Ok(args) => args,
            Err(err) => {
                parse_error = Some(err);
                break;
            }
        };
        collected.push(CollectedHandler {
            kind,
            method_ident: method.sig.ident.clone(),
            name: args.name.unwrap_or_else(|| method.sig.ident.to_string()),
            description: args.description,
            input_schema: args.input_schema.unwrap_or_else(|| "{}".to_string()),
        });
    }

    if let Some(err) = parse_error {
        return err.to_compile_error().into();
    }

    let entries = collected.iter().map(|h| {
        let method_ident = &h.method_ident;
        let name = &h.name;
        let request_kind = h.kind.request_kind_tokens();
        let description = match &h.description {
            Some(d) => quote! { ::std::option::Option::Some(#d.to_string()) },
            None => quote! { ::std::option::Option::None },
        };
        let input_schema = &h.input_schema;
        quote! {
            {
                let __this = ::std::sync::Arc::clone(self);
                ::sker_framework::HandlerDescriptor::new(
                    #request_kind,
                    #name,
                    #description,
                    ::serde_json::from_str(#input_schema)
                        .expect("handler input_schema must be valid JSON"),
                    ::std::env!("CARGO_PKG_NAME"),
                    ::tower::util::BoxCloneSyncService::new(::tower::service_fn(
                        move |ctx: ::std::sync::Arc<::sker_core::RequestContext>| {
                            let __this = ::std::sync::Arc::clone(&__this);
                            async move { __this.#method_ident(ctx).await }
                        },
                    )),
                )
            }
        }
    });

    let descriptors_fn_ident = syn::Ident::new("descriptors", Span::call_site());

    let expanded = quote! {
        #input

        impl #self_ty {
            /// Builds every `#[tool]`/`#[resource]`/`#[prompt]`-marked
            /// method on this type into a `HandlerDescriptor`, closing each
            /// one over `self`.
            pub fn #descriptors_fn_ident(
                self: &::std::sync::Arc<Self>,
            ) -> ::std::vec::Vec<::sker_framework::HandlerDescriptor> {
                ::std::vec![ #( #entries ),* ]
            }
        }
    };
    expanded.into()
}
