//! Service descriptors and best-effort resolution.
//!
//! Commands address their destination by an implicit [`ServiceDescriptor`]
//! (an action string). Before binding, the manager asks the configured
//! [`IntentResolver`] which installed components answer that action and pins
//! the descriptor to the component when there is exactly one. Zero or several
//! matches leave the descriptor as it was; the bind then proceeds with the
//! implicit descriptor and succeeds or fails downstream.

use std::collections::HashMap;
use std::fmt;

/// A concrete service component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentName {
    /// Package the component lives in.
    pub package: String,
    /// Class (or entry point) of the component.
    pub class: String,
}

impl ComponentName {
    /// Create a new component name.
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

/// Intent-like description of the service to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Implicit action the service answers to.
    pub action: String,
    /// Explicit component, once resolved.
    pub component: Option<ComponentName>,
}

impl ServiceDescriptor {
    /// Create an implicit descriptor for `action`.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            component: None,
        }
    }

    /// Whether the descriptor names a concrete component.
    pub fn is_explicit(&self) -> bool {
        self.component.is_some()
    }
}

/// Lookup of installed services, as provided by the platform.
pub trait IntentResolver: Send + Sync + 'static {
    /// All components that can serve `descriptor`.
    fn query_services(&self, descriptor: &ServiceDescriptor) -> Vec<ComponentName>;
}

/// Pin `descriptor` to a component if exactly one matches.
///
/// Returns `true` if the descriptor was made explicit.
pub fn upgrade_descriptor(resolver: &dyn IntentResolver, descriptor: &mut ServiceDescriptor) -> bool {
    let mut matches = resolver.query_services(descriptor);
    if matches.len() != 1 {
        tracing::debug!(
            "{} services match {}, leaving descriptor implicit",
            matches.len(),
            descriptor.action
        );
        return false;
    }
    descriptor.component = matches.pop();
    true
}

/// Resolver backed by a fixed action table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    services: HashMap<String, Vec<ComponentName>>,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `component` answers `action`.
    pub fn install(mut self, action: &str, component: ComponentName) -> Self {
        self.services
            .entry(action.to_string())
            .or_default()
            .push(component);
        self
    }
}

impl IntentResolver for StaticResolver {
    fn query_services(&self, descriptor: &ServiceDescriptor) -> Vec<ComponentName> {
        self.services
            .get(&descriptor.action)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_match_is_pinned() {
        let resolver =
            StaticResolver::new().install("pmp", ComponentName::new("de.pmp", "PMPService"));
        let mut descriptor = ServiceDescriptor::new("pmp");

        assert!(upgrade_descriptor(&resolver, &mut descriptor));
        assert!(descriptor.is_explicit());
        assert_eq!(
            descriptor.component.unwrap().to_string(),
            "de.pmp/PMPService"
        );
    }

    #[test]
    fn test_no_match_leaves_descriptor() {
        let resolver = StaticResolver::new();
        let mut descriptor = ServiceDescriptor::new("pmp");

        assert!(!upgrade_descriptor(&resolver, &mut descriptor));
        assert_eq!(descriptor, ServiceDescriptor::new("pmp"));
    }

    #[test]
    fn test_ambiguous_match_leaves_descriptor() {
        let resolver = StaticResolver::new()
            .install("pmp", ComponentName::new("a", "One"))
            .install("pmp", ComponentName::new("b", "Two"));
        let mut descriptor = ServiceDescriptor::new("pmp");

        assert!(!upgrade_descriptor(&resolver, &mut descriptor));
        assert!(!descriptor.is_explicit());
    }
}
