//! The ABI boundary a plugin's `cdylib` exports, located via `libloading`
//! once its manifest has been discovered on disk.
//!
//! This keeps the teacher's static, `Copy`, `#[repr(C)]` descriptor shape
//! and its major/minor compatibility rule, but repurposes it: instead of
//! being linked into the host binary at compile time, it is read out of a
//! `dlopen`ed shared object through one exported symbol,
//! `SKER_PLUGIN_DESCRIPTOR`.

use crate::plugin::core::PluginLifecycle;
use std::sync::Arc;

/// Current sker plugin ABI version (1.0). The major part must match
/// exactly between host and plugin; the plugin's minor part must be ≤ the
/// host's.
pub const SKER_PLUGIN_ABI_VERSION: u32 = 0x0001_0000;

/// The symbol name every plugin `cdylib` must export, as a
/// `#[no_mangle] pub static SKER_PLUGIN_DESCRIPTOR: PluginDescriptor`.
pub const DESCRIPTOR_SYMBOL: &[u8] = b"SKER_PLUGIN_DESCRIPTOR";

/// A static, `Copy` descriptor identifying and instantiating a plugin's
/// service layer.
///
/// # Memory layout
///
/// `PluginDescriptor` is `#[repr(C)]`. Fields must not be reordered: this
/// struct is read across the `dlopen` boundary by pointer, not by value.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// ABI version this descriptor was compiled against.
    pub abi_version: u32,
    /// Factory function producing the plugin's lifecycle hook and static
    /// provider list. Boxed behind a raw function pointer so the struct
    /// stays `Copy` and `#[repr(C)]`-safe across the dlopen boundary.
    pub create: fn() -> PluginFactoryOutput,
}

/// What a plugin's `create` factory hands back to the loader: its
/// lifecycle hook plus the handler-builder it registers through
/// [`crate::handler::HandlerDescriptor`] construction. Kept as a
/// heap-allocated, non-`#[repr(C)]` payload since only the descriptor
/// itself needs to cross the ABI boundary as plain data.
pub struct PluginFactoryOutput {
    pub lifecycle: Option<Arc<dyn PluginLifecycle>>,
}

impl PluginDescriptor {
    /// `true` if this descriptor's ABI version is compatible with the
    /// running host.
    pub fn is_compatible(&self) -> bool {
        let host_major = SKER_PLUGIN_ABI_VERSION >> 16;
        let desc_major = self.abi_version >> 16;
        let desc_minor = self.abi_version & 0xFFFF;
        let host_minor = SKER_PLUGIN_ABI_VERSION & 0xFFFF;
        desc_major == host_major && desc_minor <= host_minor
    }

    /// Invokes the descriptor's factory function.
    pub fn instantiate(&self) -> PluginFactoryOutput {
        (self.create)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PluginFactoryOutput {
        PluginFactoryOutput { lifecycle: None }
    }

    #[test]
    fn matching_major_and_lower_minor_is_compatible() {
        let descriptor = PluginDescriptor {
            abi_version: 0x0001_0000,
            create: sample,
        };
        assert!(descriptor.is_compatible());
    }

    #[test]
    fn higher_minor_than_host_is_incompatible() {
        let descriptor = PluginDescriptor {
            abi_version: 0x0001_0001,
            create: sample,
        };
        assert!(!descriptor.is_compatible());
    }

    #[test]
    fn mismatched_major_is_incompatible() {
        let descriptor = PluginDescriptor {
            abi_version: 0x0002_0000,
            create: sample,
        };
        assert!(!descriptor.is_compatible());
    }
}
