//! Registration-time conflict detection: name collisions, shared service
//! libraries, circular dependencies, identical name/version tuples, and
//! incompatible version ranges between plugins.

use std::collections::HashMap;
use std::path::PathBuf;

use sker_core::{RequestKind, SkerError, SkerResult};

use crate::container::has_cycle;
use crate::isolation::IsolationLevel;

/// The kind of resource a [`Conflict`] collides over (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    ToolName,
    ResourceUri,
    PromptName,
    ServiceClass,
    PluginNameVersion,
    /// Declared `mcp_version` falls outside the host's supported range.
    Compat,
    /// Produced by a project-registered [`ConflictRule`], not a built-in.
    Configuration,
}

impl ConflictType {
    /// The built-in name-collision type matching a handler's kind.
    fn for_handler_kind(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Tool => Self::ToolName,
            RequestKind::Resource => Self::ResourceUri,
            RequestKind::Prompt => Self::PromptName,
        }
    }
}

/// How serious a [`Conflict`] is (§3 — info/warning/error/critical, ascending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A strategy the loader may apply to resolve a [`Conflict`] (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionStrategy {
    /// The plugin that already holds the name keeps it; the newcomer's
    /// colliding registrations are dropped.
    #[default]
    FirstWins,
    /// The newcomer's registrations replace the incumbent's.
    LastWins,
    /// Resolved by a configured plugin-priority ordering.
    Priority,
    /// Never resolved automatically: both sides are marked failing and
    /// surfaced to the operator.
    Manual,
}

/// The `{kind, identifier}` resource a [`Conflict`] is about.
#[derive(Debug, Clone)]
pub struct ConflictResource {
    pub kind: String,
    pub identifier: String,
}

/// A single detected collision between plugin registrations (§3).
#[derive(Debug, Clone)]
pub struct Conflict {
    pub id: String,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub plugins: Vec<String>,
    pub resource: ConflictResource,
    pub recommended_strategy: ResolutionStrategy,
    pub description: String,
}

impl Conflict {
    /// Maps this conflict onto the error the load path aborts with, for
    /// rules whose conflicts are never auto-resolved (circular
    /// dependency, version incompatibility, identical name/version).
    pub fn to_sker_error(&self) -> SkerError {
        SkerError::Conflict(self.description.clone())
    }
}

/// The `{success, action, affectedPlugins[]}` record a resolution attempt
/// produces (§4.7), once a strategy has been checked against
/// [`allowed_strategies`].
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub success: bool,
    pub action: ResolutionStrategy,
    pub affected_plugins: Vec<String>,
}

/// Which [`ResolutionStrategy`] values are legal for a given
/// [`ConflictType`] — e.g. a critical circular-dependency conflict has no
/// automatic resolution, only `Manual`.
pub fn allowed_strategies(conflict_type: ConflictType) -> &'static [ResolutionStrategy] {
    use ResolutionStrategy::*;
    match conflict_type {
        ConflictType::ToolName | ConflictType::ResourceUri | ConflictType::PromptName => {
            &[FirstWins, LastWins, Priority, Manual]
        }
        ConflictType::ServiceClass => &[Manual],
        ConflictType::PluginNameVersion => &[Manual],
        ConflictType::Compat => &[Manual],
        ConflictType::Configuration => &[Manual],
    }
}

/// Checks that `strategy` is legal for `conflict`'s type and, if so,
/// produces the `{success, action, affectedPlugins[]}` record the loader
/// uses to decide rollback vs partial acceptance. Does not itself touch
/// the registry — applying the outcome is [`crate::manager::PluginManager`]'s job.
pub fn apply_resolution(conflict: &Conflict, strategy: ResolutionStrategy) -> SkerResult<ResolutionOutcome> {
    if !allowed_strategies(conflict.conflict_type).contains(&strategy) {
        return Err(SkerError::Conflict(format!(
            "resolution strategy {strategy:?} is not allowed for a {:?} conflict",
            conflict.conflict_type
        )));
    }
    Ok(ResolutionOutcome {
        success: true,
        action: strategy,
        affected_plugins: conflict.plugins.clone(),
    })
}

/// A single rule checked against the set of plugins being loaded.
///
/// Built-in rules cover name collisions, shared service libraries,
/// circular `depends_on` graphs, identical name/version tuples, and
/// `mcp_version` compatibility; custom rules can be registered for
/// project-specific policy (e.g. forbidding two plugins in the same
/// `category`).
pub trait ConflictRule: Send + Sync {
    fn name(&self) -> &'static str;
    /// Every conflict `candidate` introduces against `existing`. Returns
    /// an empty vec when there is nothing to report.
    fn detect(&self, candidate: &PluginSummary, existing: &[PluginSummary]) -> Vec<Conflict>;
}

/// The subset of a plugin's identity a conflict rule needs to see.
#[derive(Debug, Clone)]
pub struct PluginSummary {
    pub name: String,
    pub version: String,
    pub depends_on: Vec<String>,
    pub handlers: Vec<(RequestKind, String)>,
    pub mcp_version_req: Option<String>,
    pub isolation_level: IsolationLevel,
    /// The resolved path of the `cdylib` this plugin was `dlopen`ed from —
    /// the closest analogue a dynamically loaded plugin has to the
    /// source's "service class symbol" (§4.7 `serviceClass`): two plugin
    /// directories pointing at the literal same compiled library are the
    /// same service class loaded twice.
    pub library_path: Option<PathBuf>,
}

struct DuplicateNameRule;

impl ConflictRule for DuplicateNameRule {
    fn name(&self) -> &'static str {
        "duplicate_handler_name"
    }

    fn detect(&self, candidate: &PluginSummary, existing: &[PluginSummary]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for other in existing {
            for (kind, name) in &candidate.handlers {
                if other.handlers.contains(&(*kind, name.clone())) {
                    conflicts.push(Conflict {
                        id: format!("{}:{}:{}:{}", kind.label(), name, candidate.name, other.name),
                        conflict_type: ConflictType::for_handler_kind(*kind),
                        severity: ConflictSeverity::Error,
                        plugins: vec![candidate.name.clone(), other.name.clone()],
                        resource: ConflictResource {
                            kind: kind.label().to_string(),
                            identifier: name.clone(),
                        },
                        recommended_strategy: ResolutionStrategy::FirstWins,
                        description: format!(
                            "{} '{}' is already registered by plugin '{}'",
                            kind.label(),
                            name,
                            other.name
                        ),
                    });
                }
            }
        }
        conflicts
    }
}

struct ServiceClassRule;

impl ConflictRule for ServiceClassRule {
    fn name(&self) -> &'static str {
        "service_class"
    }

    fn detect(&self, candidate: &PluginSummary, existing: &[PluginSummary]) -> Vec<Conflict> {
        let Some(candidate_path) = &candidate.library_path else {
            return Vec::new();
        };
        let mut conflicts = Vec::new();
        for other in existing {
            if other.library_path.as_ref() != Some(candidate_path) {
                continue;
            }
            // Informational by default; a shared service class is only
            // actionable once one of the two plugins shares the parent
            // container unrestricted (`IsolationLevel::None`), where the
            // same class loaded twice can clobber shared singleton state.
            let severity = if candidate.isolation_level == IsolationLevel::None
                || other.isolation_level == IsolationLevel::None
            {
                ConflictSeverity::Warning
            } else {
                ConflictSeverity::Info
            };
            conflicts.push(Conflict {
                id: format!("service_class:{}:{}", candidate.name, other.name),
                conflict_type: ConflictType::ServiceClass,
                severity,
                plugins: vec![candidate.name.clone(), other.name.clone()],
                resource: ConflictResource {
                    kind: "service_class".to_string(),
                    identifier: candidate_path.display().to_string(),
                },
                recommended_strategy: ResolutionStrategy::Manual,
                description: format!(
                    "plugins '{}' and '{}' load the same service library {}",
                    candidate.name,
                    other.name,
                    candidate_path.display()
                ),
            });
        }
        conflicts
    }
}

struct PluginNameVersionRule;

impl ConflictRule for PluginNameVersionRule {
    fn name(&self) -> &'static str {
        "plugin_name_version"
    }

    fn detect(&self, candidate: &PluginSummary, existing: &[PluginSummary]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for other in existing {
            if other.name == candidate.name && other.version == candidate.version {
                conflicts.push(Conflict {
                    id: format!("plugin_name_version:{}@{}", candidate.name, candidate.version),
                    conflict_type: ConflictType::PluginNameVersion,
                    severity: ConflictSeverity::Error,
                    plugins: vec![candidate.name.clone(), other.name.clone()],
                    resource: ConflictResource {
                        kind: "plugin".to_string(),
                        identifier: format!("{}@{}", candidate.name, candidate.version),
                    },
                    recommended_strategy: ResolutionStrategy::Manual,
                    description: format!(
                        "two plugins declare the identical name/version tuple '{}@{}'",
                        candidate.name, candidate.version
                    ),
                });
            }
        }
        conflicts
    }
}

struct CircularDependencyRule;

impl ConflictRule for CircularDependencyRule {
    fn name(&self) -> &'static str {
        "circular_dependency"
    }

    fn detect(&self, candidate: &PluginSummary, existing: &[PluginSummary]) -> Vec<Conflict> {
        let mut edges: HashMap<String, Vec<String>> = existing
            .iter()
            .map(|p| (p.name.clone(), p.depends_on.clone()))
            .collect();
        edges.insert(candidate.name.clone(), candidate.depends_on.clone());
        if has_cycle(&edges) {
            return vec![Conflict {
                id: format!("circular_dependency:{}", candidate.name),
                conflict_type: ConflictType::Configuration,
                severity: ConflictSeverity::Critical,
                plugins: vec![candidate.name.clone()],
                resource: ConflictResource {
                    kind: "depends_on".to_string(),
                    identifier: candidate.name.clone(),
                },
                recommended_strategy: ResolutionStrategy::Manual,
                description: format!(
                    "loading '{}' would introduce a circular plugin dependency",
                    candidate.name
                ),
            }];
        }
        Vec::new()
    }
}

struct VersionCompatibilityRule;

impl ConflictRule for VersionCompatibilityRule {
    fn name(&self) -> &'static str {
        "incompatible_version"
    }

    fn detect(&self, candidate: &PluginSummary, _existing: &[PluginSummary]) -> Vec<Conflict> {
        let Some(req) = &candidate.mcp_version_req else {
            return Vec::new();
        };
        let Ok(req) = semver::VersionReq::parse(req) else {
            return vec![Conflict {
                id: format!("incompatible_version:{}", candidate.name),
                conflict_type: ConflictType::Compat,
                severity: ConflictSeverity::Warning,
                plugins: vec![candidate.name.clone()],
                resource: ConflictResource {
                    kind: "mcp_version".to_string(),
                    identifier: req.clone(),
                },
                recommended_strategy: ResolutionStrategy::Manual,
                description: format!("plugin '{}' declares an invalid mcp_version requirement '{req}'", candidate.name),
            }];
        };
        // The host's own MCP protocol version; kept in one place so a
        // bump to the supported protocol surface only changes this line.
        let host_version = semver::Version::parse(crate::HOST_MCP_VERSION).expect("valid semver");
        if !req.matches(&host_version) {
            return vec![Conflict {
                id: format!("incompatible_version:{}", candidate.name),
                conflict_type: ConflictType::Compat,
                severity: ConflictSeverity::Warning,
                plugins: vec![candidate.name.clone()],
                resource: ConflictResource {
                    kind: "mcp_version".to_string(),
                    identifier: req.to_string(),
                },
                recommended_strategy: ResolutionStrategy::Manual,
                description: format!(
                    "plugin '{}' requires mcp_version {}, host is {}",
                    candidate.name, req, host_version
                ),
            }];
        }
        Vec::new()
    }
}

/// Every `(kind, name, existing_owner)` collision between `candidate` and
/// `existing`, without erroring.
///
/// [`crate::manager::PluginManager`] uses this instead of going through
/// [`ConflictDetector::detect`] when a resolution strategy other than
/// `manual` is configured: the duplicate-name rule alone is resolvable
/// per-descriptor (drop the losing side, keep the rest of the plugin),
/// whereas circular dependencies and version mismatches are not.
pub fn duplicate_handlers(
    candidate: &PluginSummary,
    existing: &[PluginSummary],
) -> Vec<(RequestKind, String, String)> {
    DuplicateNameRule
        .detect(candidate, existing)
        .into_iter()
        .map(|c| {
            let kind = match c.conflict_type {
                ConflictType::ToolName => RequestKind::Tool,
                ConflictType::ResourceUri => RequestKind::Resource,
                _ => RequestKind::Prompt,
            };
            let owner = c.plugins[1].clone();
            (kind, c.resource.identifier, owner)
        })
        .collect()
}

/// Runs only the [`CircularDependencyRule`], independent of name
/// collisions — a plugin load that plans to resolve duplicate names still
/// has to fail outright on a dependency cycle.
pub fn check_circular(candidate: &PluginSummary, existing: &[PluginSummary]) -> Option<Conflict> {
    CircularDependencyRule.detect(candidate, existing).into_iter().next()
}

/// Runs only the [`VersionCompatibilityRule`].
pub fn check_version(candidate: &PluginSummary) -> Option<Conflict> {
    VersionCompatibilityRule.detect(candidate, &[]).into_iter().next()
}

/// Runs only the [`ServiceClassRule`] — every conflict is informational
/// (or a warning under `IsolationLevel::None`), never blocks a load.
pub fn check_service_class(candidate: &PluginSummary, existing: &[PluginSummary]) -> Vec<Conflict> {
    ServiceClassRule.detect(candidate, existing)
}

/// Runs every registered [`ConflictRule`] against a candidate plugin
/// before it is allowed to load.
pub struct ConflictDetector {
    rules: Vec<Box<dyn ConflictRule>>,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(DuplicateNameRule),
                Box::new(ServiceClassRule),
                Box::new(PluginNameVersionRule),
                Box::new(CircularDependencyRule),
                Box::new(VersionCompatibilityRule),
            ],
        }
    }
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an additional, project-specific rule.
    pub fn add_rule(&mut self, rule: Box<dyn ConflictRule>) {
        self.rules.push(rule);
    }

    /// Runs every rule and collects every conflict `candidate` introduces
    /// against `existing` — unlike the individual `check_*`/`duplicate_handlers`
    /// helpers, this never stops at the first hit.
    pub fn detect(&self, candidate: &PluginSummary, existing: &[PluginSummary]) -> Vec<Conflict> {
        self.rules
            .iter()
            .flat_map(|rule| rule.detect(candidate, existing))
            .collect()
    }

    /// Runs [`Self::detect`] incrementally over a whole discovery batch,
    /// so two candidates that collide with each other are caught before
    /// either is loaded, not just against the already-active set.
    pub fn detect_batch(&self, candidates: &[PluginSummary]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (i, candidate) in candidates.iter().enumerate() {
            conflicts.extend(self.detect(candidate, &candidates[..i]));
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, depends_on: &[&str], handlers: &[(RequestKind, &str)]) -> PluginSummary {
        PluginSummary {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            handlers: handlers.iter().map(|(k, n)| (*k, n.to_string())).collect(),
            mcp_version_req: None,
            isolation_level: IsolationLevel::Service,
            library_path: None,
        }
    }

    #[test]
    fn rejects_duplicate_tool_name() {
        let detector = ConflictDetector::new();
        let existing = vec![summary("a", &[], &[(RequestKind::Tool, "sum")])];
        let candidate = summary("b", &[], &[(RequestKind::Tool, "sum")]);
        let conflicts = detector.detect(&candidate, &existing);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::ToolName);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Error);
        assert_eq!(conflicts[0].recommended_strategy, ResolutionStrategy::FirstWins);
    }

    #[test]
    fn allows_same_name_across_kinds() {
        let detector = ConflictDetector::new();
        let existing = vec![summary("a", &[], &[(RequestKind::Tool, "sum")])];
        let candidate = summary("b", &[], &[(RequestKind::Resource, "sum")]);
        assert!(detector.detect(&candidate, &existing).is_empty());
    }

    #[test]
    fn rejects_circular_dependency() {
        let detector = ConflictDetector::new();
        let existing = vec![summary("a", &["b"], &[])];
        let candidate = summary("b", &["a"], &[]);
        let conflicts = detector.detect(&candidate, &existing);
        assert!(conflicts.iter().any(|c| c.conflict_type == ConflictType::Configuration
            && c.severity == ConflictSeverity::Critical));
    }

    #[test]
    fn flags_identical_name_and_version_as_error() {
        let detector = ConflictDetector::new();
        let existing = vec![summary("a", &[], &[])];
        let candidate = summary("a", &[], &[]);
        let conflicts = detector.detect(&candidate, &existing);
        assert!(conflicts
            .iter()
            .any(|c| c.conflict_type == ConflictType::PluginNameVersion && c.severity == ConflictSeverity::Error));
    }

    #[test]
    fn flags_shared_service_library_as_informational_by_default() {
        let detector = ConflictDetector::new();
        let shared = PathBuf::from("/plugins/shared/libshared.so");
        let mut a = summary("a", &[], &[]);
        a.library_path = Some(shared.clone());
        let mut b = summary("b", &[], &[]);
        b.library_path = Some(shared);
        let conflicts = detector.detect(&b, &[a]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::ServiceClass);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Info);
    }

    #[test]
    fn shared_service_library_escalates_to_warning_under_isolation_none() {
        let detector = ConflictDetector::new();
        let shared = PathBuf::from("/plugins/shared/libshared.so");
        let mut a = summary("a", &[], &[]);
        a.library_path = Some(shared.clone());
        a.isolation_level = IsolationLevel::None;
        let mut b = summary("b", &[], &[]);
        b.library_path = Some(shared);
        let conflicts = detector.detect(&b, &[a]);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Warning);
    }

    #[test]
    fn only_manual_resolution_is_allowed_for_a_circular_dependency_conflict() {
        let conflict = Conflict {
            id: "x".into(),
            conflict_type: ConflictType::Configuration,
            severity: ConflictSeverity::Critical,
            plugins: vec!["a".into()],
            resource: ConflictResource {
                kind: "depends_on".into(),
                identifier: "a".into(),
            },
            recommended_strategy: ResolutionStrategy::Manual,
            description: "cycle".into(),
        };
        assert!(apply_resolution(&conflict, ResolutionStrategy::FirstWins).is_err());
        let outcome = apply_resolution(&conflict, ResolutionStrategy::Manual).unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn first_wins_is_an_allowed_resolution_for_a_duplicate_tool_name() {
        let detector = ConflictDetector::new();
        let existing = vec![summary("a", &[], &[(RequestKind::Tool, "sum")])];
        let candidate = summary("b", &[], &[(RequestKind::Tool, "sum")]);
        let conflict = &detector.detect(&candidate, &existing)[0];
        let outcome = apply_resolution(conflict, ResolutionStrategy::FirstWins).unwrap();
        assert_eq!(outcome.affected_plugins, vec!["b".to_string(), "a".to_string()]);
    }
}
