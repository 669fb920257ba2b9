//! The plugin data model: manifest, ABI descriptor, and the live handle a
//! loaded plugin becomes.

pub mod core;
pub mod descriptor;
pub mod manifest;

pub use core::{Plugin, PluginLifecycle, PluginMetadata, PluginState};
pub use descriptor::{DESCRIPTOR_SYMBOL, PluginDescriptor, PluginFactoryOutput, SKER_PLUGIN_ABI_VERSION};
pub use manifest::{McpManifest, PluginManifest};
