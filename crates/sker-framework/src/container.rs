//! Dependency-injection container with a parent chain.
//!
//! Each plugin gets its own child [`Container`] whose lookups fall through
//! to the parent (application-level) container unless the plugin's
//! [`crate::isolation::IsolationLevel`] forbids it. Services are
//! type-erased and stored behind `Arc<dyn Any>`, mirroring how the
//! teacher's plugin manager keyed its service map by string id, but typed
//! here so callers don't need to downcast at every call site beyond the
//! one `resolve::<T>()`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use sker_core::{SkerError, SkerResult};

use crate::isolation::Bridge;

type AnyService = Arc<dyn Any + Send + Sync>;

/// How a container falls through to its parent on a local miss.
enum ParentLink {
    /// `IsolationLevel::None` — unrestricted fallthrough, no permission
    /// check per lookup.
    Full(Arc<Container>),
    /// `IsolationLevel::Service`/`Full` — every fallthrough lookup is
    /// gated by the plugin's [`Bridge`].
    Gated(Bridge),
}

/// A node in the container parent chain.
///
/// `Container::root()` creates the application-level container. A plugin
/// container is built with `Container::child_of(&parent)` under
/// `IsolationLevel::None`, or `Container::gated_child(bridge)` under
/// `Service`/`Full`, where every fallthrough lookup is checked against the
/// plugin's declared permissions first.
pub struct Container {
    services: DashMap<TypeId, AnyService>,
    names: DashMap<TypeId, &'static str>,
    parent: Option<ParentLink>,
}

impl Container {
    /// Creates the root (application-level) container.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            services: DashMap::new(),
            names: DashMap::new(),
            parent: None,
        })
    }

    /// Creates a child container that falls through to `parent`
    /// unconditionally on miss (`IsolationLevel::None`).
    pub fn child_of(parent: &Arc<Container>) -> Arc<Self> {
        Arc::new(Self {
            services: DashMap::new(),
            names: DashMap::new(),
            parent: Some(ParentLink::Full(Arc::clone(parent))),
        })
    }

    /// Creates a child container whose fallthrough lookups are gated by
    /// `bridge` (`IsolationLevel::Service`/`Full`).
    pub fn gated_child(bridge: Bridge) -> Arc<Self> {
        Arc::new(Self {
            services: DashMap::new(),
            names: DashMap::new(),
            parent: Some(ParentLink::Gated(bridge)),
        })
    }

    /// Registers a singleton service instance under its concrete type.
    pub fn register<T: Send + Sync + 'static>(&self, name: &'static str, value: T) {
        let type_id = TypeId::of::<T>();
        self.services.insert(type_id, Arc::new(value));
        self.names.insert(type_id, name);
    }

    /// Resolves a service, walking up the parent chain on miss.
    ///
    /// Returns [`SkerError::NotFound`] if no ancestor container has the
    /// service registered.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> SkerResult<Arc<T>> {
        let type_id = TypeId::of::<T>();
        if let Some(entry) = self.services.get(&type_id) {
            return entry
                .clone()
                .downcast::<T>()
                .map_err(|_| SkerError::Internal("service downcast mismatch".into()));
        }
        match &self.parent {
            Some(ParentLink::Full(parent)) => parent.resolve::<T>(),
            Some(ParentLink::Gated(bridge)) => bridge.resolve::<T>(),
            None => Err(SkerError::NotFound {
                kind: "service",
                name: std::any::type_name::<T>().to_string(),
            }),
        }
    }

    /// Resolves a service only from this container, never the parent
    /// chain. Used by the isolation bridge to decide what a plugin is
    /// *allowed* to see before falling through.
    pub fn resolve_local<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// `true` if this container (not an ancestor) holds a service of type
    /// `T`.
    pub fn has_local<T: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Names of services registered directly on this container, for
    /// diagnostics and cycle detection.
    pub fn local_service_names(&self) -> Vec<&'static str> {
        self.names.iter().map(|entry| *entry.value()).collect()
    }
}

/// Detects a dependency cycle across a set of plugin names and their
/// declared `depends_on` edges using Kahn's algorithm — the same
/// technique [`crate::manager`] uses to compute load order, reused here
/// to reject construction before any container is even built.
pub fn has_cycle(edges: &HashMap<String, Vec<String>>) -> bool {
    let mut indegree: HashMap<&str, usize> = edges.keys().map(|k| (k.as_str(), 0)).collect();
    for deps in edges.values() {
        for dep in deps {
            if let Some(count) = indegree.get_mut(dep.as_str()) {
                *count += 1;
            }
        }
    }
    let mut queue: Vec<&str> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0usize;
    while let Some(name) = queue.pop() {
        visited += 1;
        if let Some(deps) = edges.get(name) {
            for dep in deps {
                if let Some(count) = indegree.get_mut(dep.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push(dep.as_str());
                    }
                }
            }
        }
    }
    visited != edges.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_from_parent_when_child_misses() {
        let parent = Container::root();
        parent.register("greeting", "hello".to_string());
        let child = Container::child_of(&parent);
        let resolved = child.resolve::<String>().unwrap();
        assert_eq!(*resolved, "hello");
    }

    #[test]
    fn child_registration_shadows_parent() {
        let parent = Container::root();
        parent.register("greeting", "hello".to_string());
        let child = Container::child_of(&parent);
        child.register("greeting", "overridden".to_string());
        assert_eq!(*child.resolve::<String>().unwrap(), "overridden");
        assert_eq!(*parent.resolve::<String>().unwrap(), "hello");
    }

    #[test]
    fn detects_circular_dependency() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec!["b".to_string()]);
        edges.insert("b".to_string(), vec!["a".to_string()]);
        assert!(has_cycle(&edges));
    }

    #[test]
    fn accepts_acyclic_graph() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec!["b".to_string()]);
        edges.insert("b".to_string(), vec![]);
        assert!(!has_cycle(&edges));
    }
}
