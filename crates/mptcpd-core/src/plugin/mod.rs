//! Plugin loading, registration, and event dispatch.

pub mod abi;
pub mod bindings;
pub mod dispatcher;
pub mod loader;
pub mod registry;

use std::path::Path;

use libloading::Library;
use tracing::warn;

use self::dispatcher::Dispatcher;
use self::registry::PluginRegistry;
use crate::error::{Error, Result};

/// Owns the loaded plugin shared objects, the registry, and the
/// token→plugin bindings.
///
/// The registry and bindings are process-global by design (the plugin ABI
/// carries no context pointer), so this type is meant to be created once
/// and live for the process lifetime.
pub struct PluginHost {
    dispatcher: Dispatcher,
    libraries: Vec<Library>,
    loaded: bool,
}

impl Default for PluginHost {
    fn default() -> Self {
        Self {
            dispatcher: Dispatcher::new(PluginRegistry::default()),
            libraries: Vec::new(),
            loaded: false,
        }
    }
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load plugins from `dir`. A second call with the plugin set already
    /// loaded is a no-op, since the plugin ABI's global state would be
    /// corrupted by double-loading.
    pub fn load(&mut self, dir: &Path, default_name: Option<String>) -> Result<()> {
        if self.loaded {
            warn!(dir = %dir.display(), "plugins already loaded, ignoring reload request");
            return Ok(());
        }

        loader::validate_dir(dir)?;

        let mut registry = PluginRegistry::new(default_name);
        let libraries = loader::scan_and_register(dir, &mut registry)?;

        if registry.is_empty() {
            return Err(Error::Configuration(format!(
                "no plugins registered from {}",
                dir.display()
            )));
        }

        self.dispatcher = Dispatcher::new(registry);
        self.libraries = libraries;
        self.loaded = true;

        Ok(())
    }

    /// Tear down both plugin mappings and close every shared object.
    ///
    /// Idempotent: calling this on an already-unloaded host is a no-op.
    pub fn unload(&mut self) {
        self.dispatcher.clear();
        self.libraries.clear();
        self.loaded = false;
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unload_before_load_is_a_no_op() {
        let mut host = PluginHost::new();
        host.unload();
        assert!(!host.is_loaded());
    }

    #[test]
    fn load_rejects_missing_directory() {
        let mut host = PluginHost::new();
        let err = host
            .load(Path::new("/nonexistent/mptcpd-plugins"), None)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
