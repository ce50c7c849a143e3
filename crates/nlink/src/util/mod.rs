//! Shared utilities for nlink.

pub mod device;
pub mod ifname;

pub use device::{get_ifindex, get_ifindex_opt, get_ifname, get_ifname_or_index};
