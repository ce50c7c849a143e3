//! Core plugin-dispatch and path-manager facade for the MPTCP
//! path-management daemon.
//!
//! This crate owns everything above the netlink wire format: the
//! configuration layer, the plugin ABI and loader, token-to-plugin
//! binding, and the [`path_manager::PathManager`] facade that ties a
//! live [`nlink`] connection to the plugin dispatcher.

pub mod config;
pub mod error;
pub mod network_monitor;
pub mod path_manager;
pub mod plugin;

pub use config::PmConfig;
pub use error::{Error, Result};
pub use network_monitor::NetworkMonitor;
pub use path_manager::PathManager;
pub use plugin::PluginHost;
