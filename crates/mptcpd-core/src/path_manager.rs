//! The long-lived path-manager facade.
//!
//! Composes plugin loading, the MPTCP generic-netlink connection, and an
//! external network-monitor handle into the single object plugins talk to
//! through their command hooks.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use nlink::netlink::genl::mptcp::MptcpEvent;
use nlink::{Connection, Mptcp};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::network_monitor::{NetworkMonitor, NullNetworkMonitor};
use crate::plugin::PluginHost;

/// Composes the netlink connection, plugin dispatch, and network-monitor
/// handle the daemon needs for its whole lifetime.
pub struct PathManager {
    plugins: PluginHost,
    conn: Option<Connection<Mptcp>>,
    network_monitor: Box<dyn NetworkMonitor>,
}

impl PathManager {
    /// Construct a facade: load plugins, then attempt to resolve the
    /// MPTCP family.
    ///
    /// Plugin load failure aborts construction outright (it's a
    /// [`Error::Configuration`] failure, fatal at startup per the error
    /// taxonomy). Family resolution failure is *not* fatal — the kernel
    /// may load the module later — so construction still succeeds with
    /// `ready() == false`; callers watch for the family using
    /// [`PathManager::try_establish`].
    pub async fn new(plugin_dir: &Path, default_plugin: Option<String>) -> Result<Self> {
        let mut plugins = PluginHost::new();
        plugins.load(plugin_dir, default_plugin)?;

        let conn = match Connection::<Mptcp>::new_async().await {
            Ok(conn) => Some(conn),
            Err(nlink::Error::FamilyNotFound { name }) => {
                warn!(family = %name, "MPTCP family not present at startup, will retry");
                None
            }
            Err(e) => {
                // Symmetric teardown: undo the plugin load before
                // propagating a hard transport failure.
                plugins.unload();
                return Err(Error::Transport(e));
            }
        };

        Ok(Self {
            plugins,
            conn,
            network_monitor: Box::new(NullNetworkMonitor),
        })
    }

    /// Replace the default no-op network monitor with a real
    /// implementation.
    pub fn with_network_monitor(mut self, monitor: Box<dyn NetworkMonitor>) -> Self {
        self.network_monitor = monitor;
        self
    }

    /// True only when the MPTCP family is currently resolved.
    pub fn ready(&self) -> bool {
        self.conn.is_some()
    }

    /// Retry family resolution after a prior failure or a family-vanish.
    ///
    /// A no-op that returns `Ok(())` if already resolved.
    pub async fn try_establish(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        match Connection::<Mptcp>::new_async().await {
            Ok(conn) => {
                info!("MPTCP family resolved");
                self.conn = Some(conn);
                Ok(())
            }
            Err(nlink::Error::FamilyNotFound { .. }) => Ok(()),
            Err(e) => Err(Error::Transport(e)),
        }
    }

    /// Mark the family as vanished, dropping the connection.
    ///
    /// Re-entrant: calling this when already vanished is a no-op.
    pub fn family_vanished(&mut self) {
        if self.conn.take().is_some() {
            warn!("MPTCP family vanished");
        }
    }

    /// Accessor for plugins that need to observe interface/address
    /// changes directly.
    pub fn network_monitor(&self) -> &dyn NetworkMonitor {
        self.network_monitor.as_ref()
    }

    /// Pull and dispatch the next lifecycle event.
    ///
    /// Returns `Ok(())` immediately if the family isn't currently
    /// resolved; callers should poll [`PathManager::try_establish`]
    /// between calls in that case rather than busy-loop here.
    pub async fn pump_event(&mut self) -> Result<()> {
        let Some(conn) = &self.conn else {
            return Ok(());
        };

        match conn.next_event().await {
            Ok(Some(event)) => {
                self.plugins.dispatcher_mut().dispatch(&event);
                self.fan_out_created_strategy(&event);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(Error::Transport(e)),
        }
    }

    fn fan_out_created_strategy(&self, _event: &MptcpEvent) {
        // Network-monitor notifications arrive on a separate channel (the
        // routing socket inside the external monitor), not on the MPTCP
        // multicast group, so there is nothing to forward here yet.
    }

    /// Announce a local address to the peer on an existing connection.
    pub async fn send_addr(&self, token: u32, address_id: u8, addr: IpAddr) -> Result<()> {
        let conn = self.require_ready()?;
        conn.send_addr(token, address_id, addr)
            .await
            .map_err(Error::from)
    }

    /// Withdraw a previously announced address.
    pub async fn remove_addr(&self, token: u32, address_id: u8) -> Result<()> {
        let conn = self.require_ready()?;
        conn.remove_addr(token, address_id).await.map_err(Error::from)
    }

    /// Create a new subflow between a local and remote address pair.
    pub async fn add_subflow(
        &self,
        token: u32,
        local_address_id: u8,
        remote_address_id: u8,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        backup: bool,
    ) -> Result<()> {
        let conn = self.require_ready()?;
        conn.add_subflow(
            token,
            local_address_id,
            remote_address_id,
            local_addr,
            remote_addr,
            backup,
        )
        .await
        .map_err(Error::from)
    }

    /// Change a subflow's backup-priority flag.
    pub async fn set_backup(
        &self,
        token: u32,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        backup: bool,
    ) -> Result<()> {
        let conn = self.require_ready()?;
        conn.set_backup(token, local_addr, remote_addr, backup)
            .await
            .map_err(Error::from)
    }

    /// Tear down an established subflow.
    pub async fn remove_subflow(
        &self,
        token: u32,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        let conn = self.require_ready()?;
        conn.remove_subflow(token, local_addr, remote_addr)
            .await
            .map_err(Error::from)
    }

    fn require_ready(&self) -> Result<&Connection<Mptcp>> {
        self.conn.as_ref().ok_or(Error::Unavailable)
    }

    /// Tear down the facade: drop the connection, then unload plugins.
    pub fn shutdown(&mut self) {
        self.conn = None;
        self.plugins.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_ready_fails_without_a_connection() {
        let pm = PathManager {
            plugins: PluginHost::new(),
            conn: None,
            network_monitor: Box::new(NullNetworkMonitor),
        };
        assert!(!pm.ready());
        assert!(matches!(pm.require_ready(), Err(Error::Unavailable)));
    }
}
