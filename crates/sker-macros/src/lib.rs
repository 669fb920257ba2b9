//! Proc-macros for declaring MCP tools, resources, and prompts (C3 — the
//! Handler Metadata Model).
//!
//! Rust has no runtime reflection over method attributes, so the
//! annotation-based registration surface is realized at compile time:
//!
//! - `#[tool]` / `#[resource]` / `#[prompt]` mark an async method on a
//!   plugin's service struct as a dispatchable handler.
//! - `#[handlers]` on that struct's `impl` block collects every marked
//!   method and emits a `descriptors(self: &Arc<Self>) ->
//!   Vec<HandlerDescriptor>` associated function, closing each method's
//!   `invoke` callable over the concrete `Arc<Self>` instance.
//!
//! ```rust,ignore
//! use sker_macros::{handlers, tool};
//! use std::sync::Arc;
//! use sker_core::{RequestContext, SkerResult};
//!
//! struct MathTools;
//!
//! #[handlers]
//! impl MathTools {
//!     #[tool(description = "Adds two numbers", input_schema = r#"{
//!         "type": "object",
//!         "properties": { "a": {"type": "number"}, "b": {"type": "number"} },
//!         "required": ["a", "b"]
//!     }"#)]
//!     async fn sum(&self, ctx: Arc<RequestContext>) -> SkerResult<serde_json::Value> {
//!         let a = ctx.arguments["a"].as_f64().unwrap_or_default();
//!         let b = ctx.arguments["b"].as_f64().unwrap_or_default();
//!         Ok(serde_json::json!(a + b))
//!     }
//! }
//! ```

mod handlers;
mod plugin;

use proc_macro::TokenStream;

/// Marks an async method as a registrable MCP tool.
///
/// Accepts `name = "..."` (defaults to the method name), `description =
/// "..."`, and `input_schema = "..."` (a JSON Schema literal; defaults to
/// `{}`, accepting any input). Only meaningful inside an `impl` block also
/// carrying `#[handlers]` — elsewhere it is a no-op passthrough.
#[proc_macro_attribute]
pub fn tool(attr: TokenStream, item: TokenStream) -> TokenStream {
    handlers::passthrough(attr, item)
}

/// Marks an async method as a registrable MCP resource. See [`tool`].
#[proc_macro_attribute]
pub fn resource(attr: TokenStream, item: TokenStream) -> TokenStream {
    handlers::passthrough(attr, item)
}

/// Marks an async method as a registrable MCP prompt. See [`tool`].
#[proc_macro_attribute]
pub fn prompt(attr: TokenStream, item: TokenStream) -> TokenStream {
    handlers::passthrough(attr, item)
}

/// Collects every `#[tool]`/`#[resource]`/`#[prompt]`-marked method in this
/// `impl` block into a `descriptors(self: &Arc<Self>) ->
/// Vec<sker_framework::HandlerDescriptor>` associated function.
#[proc_macro_attribute]
pub fn handlers(attr: TokenStream, item: TokenStream) -> TokenStream {
    handlers::expand(attr, item)
}

/// Exports a plugin's [`sker_framework::plugin::PluginLifecycle`] value
/// as the `SKER_PLUGIN_DESCRIPTOR` symbol its `cdylib` must carry for the
/// host's loader to `dlopen` it.
///
/// ```rust,ignore
/// plugin_definition!(EchoLifecycle);
/// ```
#[proc_macro]
pub fn plugin_definition(item: TokenStream) -> TokenStream {
    plugin::expand(item)
}
