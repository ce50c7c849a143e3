//! Network-monitor handle.
//!
//! The network monitor itself — watching local interfaces and addresses
//! over a routing socket — is an external collaborator this crate does
//! not implement. What the facade needs is an interface it can hand to
//! plugins and four notification points it can forward into the
//! dispatcher's network-monitor fan-out.

use std::net::IpAddr;

/// Four notifications a network monitor implementation delivers.
///
/// A real implementation owns a routing-socket subscription and calls
/// these from its own event-loop turn; this crate only defines the shape
/// so the facade can wire an implementation in without depending on one.
pub trait NetworkMonitor {
    /// A new interface appeared.
    fn new_interface(&self) -> Option<u32> {
        None
    }
    /// An interface's attributes changed.
    fn update_interface(&self) -> Option<u32> {
        None
    }
    /// An interface disappeared.
    fn delete_interface(&self) -> Option<u32> {
        None
    }
    /// A new local address appeared on an interface.
    fn new_address(&self) -> Option<(u32, IpAddr)> {
        None
    }
    /// A local address was removed from an interface.
    fn delete_address(&self) -> Option<(u32, IpAddr)> {
        None
    }
}

/// A network monitor that never observes anything.
///
/// Useful as the facade's default when no routing-socket backed monitor
/// has been wired in yet, and in tests that don't exercise NM fan-out.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNetworkMonitor;

impl NetworkMonitor for NullNetworkMonitor {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_monitor_reports_nothing() {
        let monitor = NullNetworkMonitor;
        assert!(monitor.new_interface().is_none());
        assert!(monitor.new_address().is_none());
    }
}
