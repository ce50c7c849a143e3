//! Async generic-netlink client library for the Linux MPTCP path-management
//! family.
//!
//! This crate provides the transport, attribute codec, and typed command API
//! used to talk to the kernel's `mptcp_pm` (or the multipath-tcp.org `mptcp`)
//! generic-netlink family: resolving the family, subscribing to its
//! multicast events, and issuing endpoint/subflow commands.
//!
//! # Example
//!
//! ```ignore
//! use nlink::netlink::{Connection, Mptcp};
//!
//! #[tokio::main]
//! async fn main() -> nlink::netlink::Result<()> {
//!     let conn = Connection::<Mptcp>::new_async().await?;
//!
//!     let limits = conn.get_limits().await?;
//!     println!("subflow limit: {:?}", limits.subflows);
//!
//!     for ep in conn.get_endpoints().await? {
//!         println!("endpoint {}: {}", ep.id, ep.address);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Family Resolution
//!
//! Generic netlink families are resolved dynamically against the kernel's
//! control family rather than assigned a fixed protocol number:
//!
//! ```ignore
//! use nlink::netlink::genl::GenlConnection;
//!
//! let conn = GenlConnection::new()?;
//! let family = conn.get_family("mptcp_pm").await?;
//! println!("mptcp_pm family id: {}", family.id);
//! ```

pub mod netlink;
pub mod util;

pub use netlink::{Connection, Error, Protocol, Result};
pub use netlink::{Generic, Mptcp};
