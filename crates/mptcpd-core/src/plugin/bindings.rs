//! Per-connection token→plugin binding.

use std::collections::HashMap;
use std::rc::Rc;

use super::registry::LoadedPlugin;

/// Maps live MPTCP connection tokens to the plugin that owns them.
///
/// An entry is created on `CREATED` and retired on `CLOSED`; looking up a
/// token for any other event resolves strictly by this map, never by
/// falling back to the default plugin.
#[derive(Default)]
pub struct TokenBinding {
    bound: HashMap<u32, Rc<LoadedPlugin>>,
}

impl TokenBinding {
    /// Bind `token` to `plugin`, overwriting any stale entry for the same
    /// token (the kernel guarantees token uniqueness while a connection
    /// lives, so this only happens if a `CLOSED` was missed).
    pub fn bind(&mut self, token: u32, plugin: Rc<LoadedPlugin>) {
        self.bound.insert(token, plugin);
    }

    /// Resolve the plugin bound to `token`.
    pub fn resolve(&self, token: u32) -> Option<Rc<LoadedPlugin>> {
        self.bound.get(&token).cloned()
    }

    /// Retire a token's binding, returning it if one existed.
    pub fn retire(&mut self, token: u32) -> Option<Rc<LoadedPlugin>> {
        self.bound.remove(&token)
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    /// True when no connection is currently bound.
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Drop every binding.
    pub fn clear(&mut self) {
        self.bound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::abi::PluginOps;

    fn plugin(name: &str) -> Rc<LoadedPlugin> {
        Rc::new(LoadedPlugin {
            name: name.to_string(),
            ops: PluginOps::default(),
            nm_ops: None,
        })
    }

    #[test]
    fn bind_then_resolve() {
        let mut bindings = TokenBinding::default();
        let rr = plugin("rr");
        bindings.bind(0xA1B2C3D4, rr.clone());

        assert_eq!(bindings.resolve(0xA1B2C3D4).unwrap().name, "rr");
    }

    #[test]
    fn unknown_token_resolves_to_none() {
        let bindings = TokenBinding::default();
        assert!(bindings.resolve(0xDEAD).is_none());
    }

    #[test]
    fn retire_removes_binding() {
        let mut bindings = TokenBinding::default();
        bindings.bind(1, plugin("rr"));
        assert!(bindings.retire(1).is_some());
        assert!(bindings.resolve(1).is_none());
    }
}
