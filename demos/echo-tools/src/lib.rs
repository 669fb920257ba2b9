//! Demo plugin exposing two trivial tools: `echo` and `shout`. Exercises
//! the loader's discovery/dlopen/ABI-check path end to end with an
//! `IsolationLevel::Service` plugin that asks for nothing beyond
//! `parent_services`.

use std::sync::Arc;

use async_trait::async_trait;
use sker_core::{RequestContext, SkerResult};
use sker_framework::plugin::PluginLifecycle;
use sker_framework::{Container, HandlerDescriptor};
use sker_macros::{handlers, plugin_definition, tool};
use serde_json::Value;

struct EchoTools;

#[handlers]
impl EchoTools {
    #[tool(
        description = "Returns its input text unchanged",
        input_schema = r#"{
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }"#
    )]
    async fn echo(&self, ctx: Arc<RequestContext>) -> SkerResult<Value> {
        let text = ctx.arguments["text"].as_str().unwrap_or_default();
        Ok(Value::String(text.to_string()))
    }

    #[tool(
        description = "Returns its input text upper-cased",
        input_schema = r#"{
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }"#
    )]
    async fn shout(&self, ctx: Arc<RequestContext>) -> SkerResult<Value> {
        let text = ctx.arguments["text"].as_str().unwrap_or_default();
        Ok(Value::String(text.to_uppercase()))
    }
}

struct EchoLifecycle;

#[async_trait]
impl PluginLifecycle for EchoLifecycle {
    async fn on_load(&self, _container: &Arc<Container>) -> SkerResult<Vec<HandlerDescriptor>> {
        Ok(Arc::new(EchoTools).descriptors())
    }

    async fn on_unload(&self) -> SkerResult<()> {
        Ok(())
    }
}

plugin_definition!(EchoLifecycle);
