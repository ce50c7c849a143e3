//! C-ABI types shared with plugin shared objects.
//!
//! Plugins are built against this module (or an equivalent header, for
//! plugins written in C) and are loaded with [`libloading`]. Every type
//! here is `repr(C)` and every hook takes only primitive/pointer
//! arguments so the layout is stable across the dlopen boundary.

use std::ffi::c_char;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Wire-compatible socket address: an address family tag, a 16-byte
/// address buffer (only the first 4 bytes are meaningful for IPv4), and a
/// port in host byte order. A port of `0` means unspecified.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawAddr {
    pub family: u8,
    pub port: u16,
    pub addr: [u8; 16],
}

const AF_INET: u8 = libc::AF_INET as u8;
const AF_INET6: u8 = libc::AF_INET6 as u8;

impl RawAddr {
    /// Build a [`RawAddr`] from a [`SocketAddr`].
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        let mut buf = [0u8; 16];
        let family = match addr.ip() {
            IpAddr::V4(v4) => {
                buf[..4].copy_from_slice(&v4.octets());
                AF_INET
            }
            IpAddr::V6(v6) => {
                buf.copy_from_slice(&v6.octets());
                AF_INET6
            }
        };
        Self {
            family,
            port: addr.port(),
            addr: buf,
        }
    }

    /// Recover a [`SocketAddr`] from a [`RawAddr`], if the family tag is
    /// recognized.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        let ip = match self.family {
            AF_INET => IpAddr::V4(Ipv4Addr::new(
                self.addr[0],
                self.addr[1],
                self.addr[2],
                self.addr[3],
            )),
            AF_INET6 => IpAddr::V6(Ipv6Addr::from(self.addr)),
            _ => return None,
        };
        Some(SocketAddr::new(ip, self.port))
    }
}

/// Capability record for MPTCP connection/subflow lifecycle hooks.
///
/// Every hook is independently optional. A plugin that registers an ops
/// record with every hook unset is warned about but not rejected, since a
/// policy may legitimately care about only network-monitor events.
#[repr(C)]
#[derive(Default)]
pub struct PluginOps {
    pub new_connection: Option<
        unsafe extern "C" fn(
            token: u32,
            local: *const RawAddr,
            remote: *const RawAddr,
            backup: bool,
        ),
    >,
    pub connection_established: Option<
        unsafe extern "C" fn(
            token: u32,
            local: *const RawAddr,
            remote: *const RawAddr,
            backup: bool,
        ),
    >,
    pub connection_closed: Option<unsafe extern "C" fn(token: u32)>,
    pub new_address:
        Option<unsafe extern "C" fn(token: u32, address_id: u8, addr: *const RawAddr)>,
    pub address_removed: Option<unsafe extern "C" fn(token: u32, address_id: u8)>,
    pub new_subflow: Option<
        unsafe extern "C" fn(
            token: u32,
            local_id: u8,
            remote_id: u8,
            local: *const RawAddr,
            remote: *const RawAddr,
            backup: bool,
        ),
    >,
    pub subflow_closed:
        Option<unsafe extern "C" fn(token: u32, local: *const RawAddr, remote: *const RawAddr)>,
    pub subflow_priority:
        Option<unsafe extern "C" fn(token: u32, local_id: u8, remote_id: u8, backup: bool)>,
}

impl PluginOps {
    /// True when every hook is unset.
    pub fn is_empty(&self) -> bool {
        self.new_connection.is_none()
            && self.connection_established.is_none()
            && self.connection_closed.is_none()
            && self.new_address.is_none()
            && self.address_removed.is_none()
            && self.new_subflow.is_none()
            && self.subflow_closed.is_none()
            && self.subflow_priority.is_none()
    }
}

/// Capability record for network-monitor notifications, broadcast to
/// every registered plugin regardless of connection token.
#[repr(C)]
#[derive(Default)]
pub struct NetworkMonitorOps {
    pub new_interface: Option<unsafe extern "C" fn(ifindex: u32)>,
    pub update_interface: Option<unsafe extern "C" fn(ifindex: u32)>,
    pub delete_interface: Option<unsafe extern "C" fn(ifindex: u32)>,
    pub new_address: Option<unsafe extern "C" fn(ifindex: u32, addr: *const RawAddr)>,
    pub delete_address: Option<unsafe extern "C" fn(ifindex: u32, addr: *const RawAddr)>,
}

/// What a plugin's self-registration hook hands back to the loader.
///
/// `name` must be a NUL-terminated string owned by the plugin for the
/// lifetime of the process (a `'static` string literal in practice).
/// `nm_ops` may be null when the plugin has no interest in network-monitor
/// events.
#[repr(C)]
pub struct PluginRegistration {
    pub name: *const c_char,
    pub ops: PluginOps,
    pub nm_ops: *const NetworkMonitorOps,
}

/// Symbol every plugin shared object must export.
///
/// Signature: `extern "C" fn() -> PluginRegistration`.
pub const PLUGIN_REGISTER_SYMBOL: &[u8] = b"mptcpd_plugin_register";

/// Type of the exported registration function.
pub type PluginRegisterFn = unsafe extern "C" fn() -> PluginRegistration;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_addr_roundtrips_v4() {
        let addr: SocketAddr = "192.0.2.5:443".parse().unwrap();
        let raw = RawAddr::from_socket_addr(addr);
        assert_eq!(raw.to_socket_addr(), Some(addr));
    }

    #[test]
    fn raw_addr_roundtrips_v6() {
        let addr: SocketAddr = "[2001:db8::1]:80".parse().unwrap();
        let raw = RawAddr::from_socket_addr(addr);
        assert_eq!(raw.to_socket_addr(), Some(addr));
    }

    #[test]
    fn empty_ops_detected() {
        assert!(PluginOps::default().is_empty());
    }
}
