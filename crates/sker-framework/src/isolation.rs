//! Plugin isolation: what a plugin's container is allowed to see on the
//! parent (application) container, gated by its manifest permissions.

use std::any::TypeId;
use std::sync::Arc;

use sker_core::{SkerError, SkerResult};
use serde::{Deserialize, Serialize};

use crate::container::Container;

/// How much of the parent container a plugin's child container can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Child container shares the parent as an unconditional fallback;
    /// no permission check per lookup.
    None,
    /// Child container; parent access only for tokens the plugin's
    /// permission set allows.
    #[default]
    Service,
    /// Child container with no parent fallback at all — the bridge
    /// denies every lookup except one explicitly allow-listed through
    /// [`Bridge::allow`].
    Full,
}

/// Declared permissions from a plugin's manifest `[mcp.permissions]`
/// table, derived from a `trust_level` (untrusted|trusted|system):
/// untrusted=all false, trusted=`parent_services` only, system=all true.
/// A manifest may request narrower permissions than its trust level
/// implies but never broader — enforced by [`Permissions::clamp_to`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub parent_services: bool,
    #[serde(default)]
    pub global_registration: bool,
    #[serde(default)]
    pub cross_plugin_access: bool,
    #[serde(default)]
    pub core_system_access: bool,
}

/// A plugin's declared trust level, the ceiling its manifest
/// `[mcp.permissions]` table may narrow but never exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    #[default]
    Untrusted,
    Trusted,
    System,
}

impl TrustLevel {
    /// The permission ceiling this trust level implies.
    pub fn ceiling(&self) -> Permissions {
        match self {
            Self::Untrusted => Permissions::default(),
            Self::Trusted => Permissions {
                parent_services: true,
                ..Permissions::default()
            },
            Self::System => Permissions {
                parent_services: true,
                global_registration: true,
                cross_plugin_access: true,
                core_system_access: true,
            },
        }
    }
}

impl Permissions {
    /// Clamps each flag to the trust level's ceiling: a manifest can
    /// request narrower permissions than its trust level implies, never
    /// broader.
    pub fn clamp_to(self, trust_level: TrustLevel) -> Self {
        let ceiling = trust_level.ceiling();
        Self {
            parent_services: self.parent_services && ceiling.parent_services,
            global_registration: self.global_registration && ceiling.global_registration,
            cross_plugin_access: self.cross_plugin_access && ceiling.cross_plugin_access,
            core_system_access: self.core_system_access && ceiling.core_system_access,
        }
    }
}

/// The bridge a plugin's container uses to reach the parent container,
/// enforcing [`IsolationLevel`] and [`Permissions`] on every lookup.
pub struct Bridge {
    parent: Arc<Container>,
    level: IsolationLevel,
    permissions: Permissions,
    /// Type names explicitly allow-listed for this plugin regardless of
    /// level, set by the plugin's own `depends_on` declarations.
    allowed: Vec<TypeId>,
    /// Tokens designated "core" (configured allow-list); resolving one of
    /// these additionally requires `core_system_access`.
    core_tokens: Vec<TypeId>,
}

impl Bridge {
    pub fn new(parent: Arc<Container>, level: IsolationLevel, permissions: Permissions) -> Self {
        Self {
            parent,
            level,
            permissions,
            allowed: Vec::new(),
            core_tokens: Vec::new(),
        }
    }

    /// Allow-lists a specific service type, independent of the isolation
    /// level — used for declared `depends_on` edges that must resolve even
    /// under `IsolationLevel::Full`.
    pub fn allow<T: 'static>(&mut self) {
        self.allowed.push(TypeId::of::<T>());
    }

    /// Marks a service type as a "core token": reachable only when the
    /// plugin additionally declares `core_system_access`.
    pub fn mark_core<T: 'static>(&mut self) {
        self.core_tokens.push(TypeId::of::<T>());
    }

    /// Attempts to resolve `T` through the bridge, honoring isolation
    /// level and permissions before delegating to the parent container.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> SkerResult<Arc<T>> {
        let type_id = TypeId::of::<T>();
        let permitted = match self.level {
            IsolationLevel::None => true,
            IsolationLevel::Service => {
                self.permissions.parent_services || self.allowed.contains(&type_id)
            }
            IsolationLevel::Full => self.allowed.contains(&type_id),
        };
        let core_ok = !self.core_tokens.contains(&type_id) || self.permissions.core_system_access;
        if !permitted || !core_ok {
            return Err(SkerError::Permission(format!(
                "plugin isolation level {:?} forbids resolving {}",
                self.level,
                std::any::type_name::<T>()
            )));
        }
        self.parent.resolve::<T>()
    }

    /// Wraps this bridge in a gated child [`Container`] a plugin's
    /// lifecycle hooks resolve services through.
    pub fn into_container(self) -> Arc<Container> {
        Container::gated_child(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_level_passes_through_unconditionally() {
        let parent = Container::root();
        parent.register("x", 42i32);
        let bridge = Bridge::new(parent, IsolationLevel::None, Permissions::default());
        assert_eq!(*bridge.resolve::<i32>().unwrap(), 42);
    }

    #[test]
    fn full_level_denies_every_lookup_regardless_of_permissions() {
        let parent = Container::root();
        parent.register("x", 42i32);
        let bridge = Bridge::new(
            parent,
            IsolationLevel::Full,
            Permissions {
                parent_services: true,
                global_registration: true,
                cross_plugin_access: true,
                core_system_access: true,
            },
        );
        assert!(matches!(
            bridge.resolve::<i32>(),
            Err(SkerError::Permission(_))
        ));
    }

    #[test]
    fn full_level_allows_explicitly_listed_services() {
        let parent = Container::root();
        parent.register("x", 42i32);
        let mut bridge = Bridge::new(parent, IsolationLevel::Full, Permissions::default());
        bridge.allow::<i32>();
        assert_eq!(*bridge.resolve::<i32>().unwrap(), 42);
    }

    #[test]
    fn service_level_requires_permission_flag() {
        let parent = Container::root();
        parent.register("x", 42i32);
        let bridge = Bridge::new(parent.clone(), IsolationLevel::Service, Permissions::default());
        assert!(bridge.resolve::<i32>().is_err());

        let bridge = Bridge::new(
            parent,
            IsolationLevel::Service,
            Permissions {
                parent_services: true,
                ..Default::default()
            },
        );
        assert_eq!(*bridge.resolve::<i32>().unwrap(), 42);
    }

    #[test]
    fn core_token_requires_core_system_access_even_with_parent_services() {
        let parent = Container::root();
        parent.register("x", 42i32);
        let mut bridge = Bridge::new(
            parent,
            IsolationLevel::Service,
            Permissions {
                parent_services: true,
                ..Default::default()
            },
        );
        bridge.mark_core::<i32>();
        assert!(matches!(
            bridge.resolve::<i32>(),
            Err(SkerError::Permission(_))
        ));
    }
}
