//! Fan-out of decoded events to bound plugins.

use std::rc::Rc;

use nlink::netlink::genl::mptcp::MptcpEvent;
use tracing::{error, warn};

use super::abi::RawAddr;
use super::bindings::TokenBinding;
use super::registry::{LoadedPlugin, PluginRegistry};

/// Drives one event through strategy resolution (on `CREATED`) or token
/// lookup (everything else), then invokes the matching hook.
pub struct Dispatcher {
    registry: PluginRegistry,
    bindings: TokenBinding,
}

impl Dispatcher {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            bindings: TokenBinding::default(),
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// Number of live connection bindings.
    pub fn bound_connections(&self) -> usize {
        self.bindings.len()
    }

    /// Dispatch a decoded event to the plugin bound to its token.
    pub fn dispatch(&mut self, event: &MptcpEvent) {
        match event {
            MptcpEvent::ConnectionCreated {
                token,
                local,
                remote,
                path_manager_name,
                backup,
            } => self.dispatch_created(*token, *local, *remote, *backup, path_manager_name.as_deref()),
            MptcpEvent::ConnectionEstablished {
                token,
                local,
                remote,
                backup,
            } => self.with_bound(*token, |plugin| {
                if let Some(hook) = plugin.ops.connection_established {
                    call_pair_backup(hook, *local, *remote, *token, *backup);
                }
            }),
            MptcpEvent::ConnectionClosed { token } => {
                if let Some(plugin) = self.bindings.retire(*token) {
                    if let Some(hook) = plugin.ops.connection_closed {
                        unsafe { hook(*token) };
                    }
                } else {
                    error!(token = format_args!("{:#x}", token), "unknown token on CLOSED event");
                }
            }
            MptcpEvent::AddressAnnounced {
                token,
                address_id,
                address,
                port,
            } => self.with_bound(*token, |plugin| {
                if let Some(hook) = plugin.ops.new_address {
                    let raw =
                        RawAddr::from_socket_addr(std::net::SocketAddr::new(*address, *port));
                    unsafe { hook(*token, *address_id, &raw) };
                }
            }),
            MptcpEvent::AddressRemoved { token, address_id } => self.with_bound(*token, |plugin| {
                if let Some(hook) = plugin.ops.address_removed {
                    unsafe { hook(*token, *address_id) };
                }
            }),
            MptcpEvent::SubflowEstablished {
                token,
                local_id,
                remote_id,
                local,
                remote,
                backup,
            } => self.with_bound(*token, |plugin| {
                if let Some(hook) = plugin.ops.new_subflow {
                    let local_raw = RawAddr::from_socket_addr(*local);
                    let remote_raw = RawAddr::from_socket_addr(*remote);
                    unsafe {
                        hook(
                            *token,
                            *local_id,
                            *remote_id,
                            &local_raw,
                            &remote_raw,
                            *backup,
                        )
                    };
                }
            }),
            MptcpEvent::SubflowClosed {
                token,
                local,
                remote,
            } => self.with_bound(*token, |plugin| {
                if let Some(hook) = plugin.ops.subflow_closed {
                    call_pair(hook, *local, *remote, *token);
                }
            }),
            MptcpEvent::SubflowPriorityChanged {
                token,
                local_id,
                remote_id,
                backup,
            } => self.with_bound(*token, |plugin| {
                if let Some(hook) = plugin.ops.subflow_priority {
                    unsafe { hook(*token, *local_id, *remote_id, *backup) };
                }
            }),
        }
    }

    fn dispatch_created(
        &mut self,
        token: u32,
        local: std::net::SocketAddr,
        remote: std::net::SocketAddr,
        backup: bool,
        strategy_name: Option<&str>,
    ) {
        let plugin = match strategy_name {
            Some(name) => self.registry.get(name).or_else(|| {
                error!(strategy = name, "strategy does not exist");
                self.registry.default_plugin()
            }),
            None => self.registry.default_plugin(),
        };

        let Some(plugin) = plugin else {
            error!("no plugin available to bind new connection");
            return;
        };

        self.bindings.bind(token, plugin.clone());

        if let Some(hook) = plugin.ops.new_connection {
            call_pair_backup(hook, local, remote, token, backup);
        }
    }

    fn with_bound(&self, token: u32, f: impl FnOnce(&Rc<LoadedPlugin>)) {
        match self.bindings.resolve(token) {
            Some(plugin) => f(&plugin),
            None => warn!(token = format_args!("{:#x}", token), "dropping event for unbound token"),
        }
    }

    /// Broadcast a network-monitor notification to every registered
    /// plugin, in registration order.
    pub fn dispatch_new_interface(&self, ifindex: u32) {
        for plugin in self.registry.in_registration_order() {
            if let Some(ops) = &plugin.nm_ops
                && let Some(hook) = ops.new_interface
            {
                unsafe { hook(ifindex) };
            }
        }
    }

    pub fn dispatch_update_interface(&self, ifindex: u32) {
        for plugin in self.registry.in_registration_order() {
            if let Some(ops) = &plugin.nm_ops
                && let Some(hook) = ops.update_interface
            {
                unsafe { hook(ifindex) };
            }
        }
    }

    pub fn dispatch_delete_interface(&self, ifindex: u32) {
        for plugin in self.registry.in_registration_order() {
            if let Some(ops) = &plugin.nm_ops
                && let Some(hook) = ops.delete_interface
            {
                unsafe { hook(ifindex) };
            }
        }
    }

    pub fn dispatch_new_address(&self, ifindex: u32, addr: std::net::IpAddr) {
        let raw = RawAddr::from_socket_addr(std::net::SocketAddr::new(addr, 0));
        for plugin in self.registry.in_registration_order() {
            if let Some(ops) = &plugin.nm_ops
                && let Some(hook) = ops.new_address
            {
                unsafe { hook(ifindex, &raw) };
            }
        }
    }

    pub fn dispatch_delete_address(&self, ifindex: u32, addr: std::net::IpAddr) {
        let raw = RawAddr::from_socket_addr(std::net::SocketAddr::new(addr, 0));
        for plugin in self.registry.in_registration_order() {
            if let Some(ops) = &plugin.nm_ops
                && let Some(hook) = ops.delete_address
            {
                unsafe { hook(ifindex, &raw) };
            }
        }
    }

    /// Tear down both mappings, as on daemon shutdown.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.bindings.clear();
    }
}

type PairHook =
    unsafe extern "C" fn(token: u32, local: *const RawAddr, remote: *const RawAddr);

type PairBackupHook = unsafe extern "C" fn(
    token: u32,
    local: *const RawAddr,
    remote: *const RawAddr,
    backup: bool,
);

fn call_pair(hook: PairHook, local: std::net::SocketAddr, remote: std::net::SocketAddr, token: u32) {
    let local_raw = RawAddr::from_socket_addr(local);
    let remote_raw = RawAddr::from_socket_addr(remote);
    unsafe { hook(token, &local_raw, &remote_raw) };
}

fn call_pair_backup(
    hook: PairBackupHook,
    local: std::net::SocketAddr,
    remote: std::net::SocketAddr,
    token: u32,
    backup: bool,
) {
    let local_raw = RawAddr::from_socket_addr(local);
    let remote_raw = RawAddr::from_socket_addr(remote);
    unsafe { hook(token, &local_raw, &remote_raw, backup) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::abi::PluginOps;
    use std::cell::Cell;
    use std::net::SocketAddr;

    thread_local! {
        static NEW_CONNECTION_CALLS: Cell<u32> = const { Cell::new(0) };
        static LAST_TOKEN: Cell<u32> = const { Cell::new(0) };
    }

    unsafe extern "C" fn record_new_connection(
        token: u32,
        _local: *const RawAddr,
        _remote: *const RawAddr,
        _backup: bool,
    ) {
        NEW_CONNECTION_CALLS.with(|c| c.set(c.get() + 1));
        LAST_TOKEN.with(|c| c.set(token));
    }

    fn sample_addrs() -> (SocketAddr, SocketAddr) {
        ("10.0.0.1:1234".parse().unwrap(), "10.0.0.2:80".parse().unwrap())
    }

    #[test]
    fn created_binds_and_invokes_default_plugin() {
        NEW_CONNECTION_CALLS.with(|c| c.set(0));
        let mut registry = PluginRegistry::new(None);
        registry.register(
            "rr".into(),
            PluginOps {
                new_connection: Some(record_new_connection),
                ..Default::default()
            },
            None,
        );
        let mut dispatcher = Dispatcher::new(registry);

        let (local, remote) = sample_addrs();
        dispatcher.dispatch(&MptcpEvent::ConnectionCreated {
            token: 0xA1B2C3D4,
            local,
            remote,
            path_manager_name: None,
            backup: false,
        });

        assert_eq!(NEW_CONNECTION_CALLS.with(|c| c.get()), 1);
        assert_eq!(LAST_TOKEN.with(|c| c.get()), 0xA1B2C3D4);
        assert_eq!(dispatcher.bound_connections(), 1);
    }

    #[test]
    fn unknown_strategy_falls_back_to_default() {
        NEW_CONNECTION_CALLS.with(|c| c.set(0));
        let mut registry = PluginRegistry::new(None);
        registry.register(
            "rr".into(),
            PluginOps {
                new_connection: Some(record_new_connection),
                ..Default::default()
            },
            None,
        );
        registry.register("bw".into(), PluginOps::default(), None);
        let mut dispatcher = Dispatcher::new(registry);

        let (local, remote) = sample_addrs();
        dispatcher.dispatch(&MptcpEvent::ConnectionCreated {
            token: 1,
            local,
            remote,
            path_manager_name: Some("zzz".into()),
            backup: false,
        });

        assert_eq!(NEW_CONNECTION_CALLS.with(|c| c.get()), 1);
    }

    #[test]
    fn closed_for_unknown_token_is_dropped() {
        let registry = PluginRegistry::new(None);
        let mut dispatcher = Dispatcher::new(registry);

        dispatcher.dispatch(&MptcpEvent::ConnectionClosed { token: 0xDEAD });

        assert_eq!(dispatcher.bound_connections(), 0);
    }
}
