//! `plugin_definition!` — emits the `#[no_mangle]` static a plugin
//! `cdylib` exports across the `dlopen` boundary (see
//! `sker_framework::plugin::descriptor`).
//!
//! ```rust,ignore
//! use sker_macros::plugin_definition;
//!
//! struct EchoLifecycle;
//!
//! #[async_trait::async_trait]
//! impl sker_framework::plugin::PluginLifecycle for EchoLifecycle {
//!     async fn on_load(&self, container: &Arc<Container>) -> SkerResult<Vec<HandlerDescriptor>> {
//!         Ok(EchoService::new(container).descriptors())
//!     }
//!     async fn on_unload(&self) -> SkerResult<()> { Ok(()) }
//! }
//!
//! plugin_definition!(EchoLifecycle);
//! ```
//!
//! The argument is any expression implementing
//! `sker_framework::plugin::PluginLifecycle + Default`, or a call
//! expression producing one (e.g. `EchoLifecycle::new()`).

use proc_macro::TokenStream;
use syn::{Expr, parse_macro_input};

pub fn expand(item: TokenStream) -> TokenStream {
    let lifecycle_expr = parse_macro_input!(item as Expr);

    let expanded = quote::quote! {
        #[unsafe(no_mangle)]
        #[doc(hidden)]
        pub static SKER_PLUGIN_DESCRIPTOR: ::sker_framework::plugin::PluginDescriptor =
            ::sker_framework::plugin::PluginDescriptor {
                abi_version: ::sker_framework::plugin::SKER_PLUGIN_ABI_VERSION,
                create: || ::sker_framework::plugin::PluginFactoryOutput {
                    lifecycle: ::std::option::Option::Some(::std::sync::Arc::new(#lifecycle_expr)),
                },
            };
    };
    expanded.into()
}
