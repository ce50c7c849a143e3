//! Async netlink protocol implementation for Linux, scoped to the
//! generic-netlink transport used by the MPTCP path-management family.
//!
//! # Strongly-Typed API
//!
//! Connections are parameterized by a [`protocol::ProtocolState`] type, which
//! determines the available operations at compile time:
//!
//! ```ignore
//! use nlink::netlink::{Connection, Mptcp};
//!
//! let conn = Connection::<Mptcp>::new_async().await?;
//! let endpoints = conn.get_endpoints().await?;
//! ```
//!
//! # Generic Netlink
//!
//! The [`genl`] module resolves dynamically-registered families against the
//! kernel's control family and provides the building blocks
//! [`genl::mptcp`] is built on.

pub mod attr;
mod builder;
pub mod connection;
mod error;
pub mod genl;
pub mod message;
mod protocol;
mod socket;
pub mod types;

pub use attr::{AttrIter, NlAttr};
pub use builder::{MessageBuilder, NestToken};
pub use connection::Connection;
pub use error::{Error, Result};
pub use genl::mptcp::{MptcpEndpoint, MptcpEndpointBuilder, MptcpFlags, MptcpLimits};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use protocol::{Generic, Mptcp, ProtocolState};
pub use socket::{NetlinkSocket, Protocol};
