//! `plugin.toml` schema, parsed by the loader before a plugin's `cdylib`
//! is ever `dlopen`ed.

use serde::Deserialize;

use crate::isolation::{IsolationLevel, Permissions, TrustLevel};

/// Top-level manifest for a discoverable plugin directory.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    /// Shared library file name, relative to the manifest's directory.
    /// Defaults to `lib<name>.<platform-extension>` when omitted.
    #[serde(default)]
    pub main: Option<String>,
    pub mcp: McpManifest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpManifest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub trust_level: TrustLevel,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub isolation_level: IsolationLevel,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub compatibility: Compatibility,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Compatibility {
    #[serde(default)]
    pub platform: Vec<String>,
    #[serde(default)]
    pub mcp_version: Option<String>,
}

impl PluginManifest {
    /// Parses a manifest from its TOML source text.
    pub fn parse(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Resolves the shared-library file name for the current platform.
    pub fn library_file_name(&self) -> String {
        if let Some(main) = &self.main {
            return main.clone();
        }
        let stem = self.name.replace('-', "_");
        #[cfg(target_os = "linux")]
        return format!("lib{stem}.so");
        #[cfg(target_os = "macos")]
        return format!("lib{stem}.dylib");
        #[cfg(target_os = "windows")]
        return format!("{stem}.dll");
    }

    /// The permissions this plugin actually gets: its declared
    /// `[mcp.permissions]` clamped to its `trust_level`'s ceiling, so a
    /// manifest can narrow but never broaden what its trust level allows.
    pub fn effective_permissions(&self) -> Permissions {
        self.mcp.permissions.clamp_to(self.mcp.trust_level)
    }

    /// `true` if this manifest declares compatibility with the current
    /// platform (an empty list means "any platform").
    pub fn compatible_with_current_platform(&self) -> bool {
        let platforms = &self.mcp.compatibility.platform;
        if platforms.is_empty() {
            return true;
        }
        let current = std::env::consts::OS;
        platforms.iter().any(|p| p == current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let manifest = PluginManifest::parse(
            r#"
            name = "sum-tools"
            version = "1.0.0"

            [mcp]
            type = "tool"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.name, "sum-tools");
        assert_eq!(manifest.mcp.isolation_level, IsolationLevel::Service);
    }

    #[test]
    fn defaults_library_file_name_from_plugin_name() {
        let manifest = PluginManifest::parse(
            r#"
            name = "sum-tools"
            version = "1.0.0"
            [mcp]
            "#,
        )
        .unwrap();
        let file_name = manifest.library_file_name();
        assert!(file_name.contains("sum_tools"));
    }
}
