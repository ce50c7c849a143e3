//! Name-keyed plugin registry.
//!
//! Plugins register themselves during [`load`](super::loader::load) in
//! priority order (load order), so the registry also tracks which
//! registration became the default.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use super::abi::{NetworkMonitorOps, PluginOps};

/// A plugin's ops records, kept alive for the process lifetime.
///
/// `Rc` rather than `Arc`: the daemon is single-threaded cooperative (see
/// the facade's event loop), so atomic refcounting buys nothing here.
pub struct LoadedPlugin {
    pub name: String,
    pub ops: PluginOps,
    pub nm_ops: Option<NetworkMonitorOps>,
}

/// Name→ops mapping plus the resolved default.
///
/// Append-only for a process lifetime: entries are never removed except by
/// [`PluginRegistry::clear`] during daemon shutdown.
#[derive(Default)]
pub struct PluginRegistry {
    by_name: HashMap<String, Rc<LoadedPlugin>>,
    order: Vec<String>,
    default_name: Option<String>,
    configured_default: Option<String>,
}

impl PluginRegistry {
    /// Create an empty registry that will prefer `configured_default` as
    /// the default plugin once it registers.
    pub fn new(configured_default: Option<String>) -> Self {
        Self {
            configured_default,
            ..Default::default()
        }
    }

    /// Register a plugin. Rejects an empty name; warns but accepts an ops
    /// record with every hook unset.
    ///
    /// `default_ops` is assigned when `name` matches the configured
    /// default, or — failing any configured match — on the very first
    /// registration.
    pub fn register(&mut self, name: String, ops: PluginOps, nm_ops: Option<NetworkMonitorOps>) {
        if name.is_empty() {
            warn!("rejecting plugin registration with empty name");
            return;
        }
        if self.by_name.contains_key(&name) {
            warn!(plugin = %name, "duplicate plugin registration ignored");
            return;
        }
        if ops.is_empty() {
            warn!(plugin = %name, "plugin registered with no event hooks set");
        }

        let is_configured_default = self.configured_default.as_deref() == Some(name.as_str());
        let is_first_registration = self.order.is_empty();

        self.order.push(name.clone());
        self.by_name.insert(
            name.clone(),
            Rc::new(LoadedPlugin {
                name: name.clone(),
                ops,
                nm_ops,
            }),
        );

        if self.default_name.is_none() && (is_configured_default || is_first_registration) {
            self.default_name = Some(name);
        }
    }

    /// Look up a plugin by name.
    pub fn get(&self, name: &str) -> Option<Rc<LoadedPlugin>> {
        self.by_name.get(name).cloned()
    }

    /// The plugin chosen as default, if any has registered.
    pub fn default_plugin(&self) -> Option<Rc<LoadedPlugin>> {
        self.default_name.as_deref().and_then(|n| self.get(n))
    }

    /// All plugins in registration (load-priority) order, for
    /// network-monitor fan-out.
    pub fn in_registration_order(&self) -> impl Iterator<Item = &Rc<LoadedPlugin>> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True when no plugin has registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Drop every registration and the resolved default.
    pub fn clear(&mut self) {
        self.by_name.clear();
        self.order.clear();
        self.default_name = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_becomes_default_without_configured_name() {
        let mut registry = PluginRegistry::new(None);
        registry.register("rr".into(), PluginOps::default(), None);
        registry.register("bw".into(), PluginOps::default(), None);

        assert_eq!(registry.default_plugin().unwrap().name, "rr");
    }

    #[test]
    fn configured_default_wins_even_if_registered_second() {
        let mut registry = PluginRegistry::new(Some("bw".into()));
        registry.register("rr".into(), PluginOps::default(), None);
        registry.register("bw".into(), PluginOps::default(), None);

        assert_eq!(registry.default_plugin().unwrap().name, "bw");
    }

    #[test]
    fn default_is_non_null_iff_registry_non_empty() {
        let mut registry = PluginRegistry::new(None);
        assert!(registry.default_plugin().is_none());
        assert!(registry.is_empty());

        registry.register("rr".into(), PluginOps::default(), None);
        assert!(registry.default_plugin().is_some());
        assert!(!registry.is_empty());
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut registry = PluginRegistry::new(None);
        registry.register("rr".into(), PluginOps::default(), None);
        registry.register("bw".into(), PluginOps::default(), None);

        let names: Vec<_> = registry
            .in_registration_order()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["rr", "bw"]);
    }

    #[test]
    fn clear_resets_default_and_entries() {
        let mut registry = PluginRegistry::new(None);
        registry.register("rr".into(), PluginOps::default(), None);
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.default_plugin().is_none());
    }

    #[test]
    fn duplicate_name_is_ignored() {
        let mut registry = PluginRegistry::new(None);
        registry.register("rr".into(), PluginOps::default(), None);
        registry.register("rr".into(), PluginOps::default(), None);

        assert_eq!(registry.len(), 1);
    }
}
