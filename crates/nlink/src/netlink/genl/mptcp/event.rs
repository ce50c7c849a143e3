//! Decoding of MPTCP path-management multicast events.
//!
//! The kernel announces connection and subflow lifecycle transitions on the
//! family's multicast group using the same generic-netlink attribute
//! encoding as the request/response commands, but with a distinct command
//! and attribute ID space (see [`crate::netlink::types::mptcp::mptcp_event`]
//! and [`crate::netlink::types::mptcp::mptcp_event_attr`]).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::netlink::attr::AttrIter;
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::GENL_HDRLEN;
use crate::netlink::types::mptcp::{NAMSIZ, mptcp_event, mptcp_event_attr};

/// A connection or subflow lifecycle event read from the MPTCP multicast
/// group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MptcpEvent {
    /// A new MPTCP connection was created.
    ConnectionCreated {
        /// Connection token.
        token: u32,
        /// Local endpoint.
        local: SocketAddr,
        /// Remote endpoint.
        remote: SocketAddr,
        /// Path-manager strategy name, on kernels exposing that
        /// (client-oriented schema) attribute.
        path_manager_name: Option<String>,
        /// Whether the initial subflow is a backup path.
        backup: bool,
    },
    /// An MPTCP connection completed its handshake.
    ConnectionEstablished {
        /// Connection token.
        token: u32,
        /// Local endpoint.
        local: SocketAddr,
        /// Remote endpoint.
        remote: SocketAddr,
        /// Whether the initial subflow is a backup path.
        backup: bool,
    },
    /// An MPTCP connection was closed.
    ConnectionClosed {
        /// Connection token.
        token: u32,
    },
    /// The peer announced a new address.
    AddressAnnounced {
        /// Connection token.
        token: u32,
        /// Address ID assigned by the peer.
        address_id: u8,
        /// The announced address.
        address: IpAddr,
        /// Port the peer will accept subflows on.
        port: u16,
    },
    /// The peer withdrew a previously announced address.
    AddressRemoved {
        /// Connection token.
        token: u32,
        /// Address ID being withdrawn.
        address_id: u8,
    },
    /// A new subflow was established.
    SubflowEstablished {
        /// Connection token.
        token: u32,
        /// Local address ID.
        local_id: u8,
        /// Remote address ID.
        remote_id: u8,
        /// Local endpoint.
        local: SocketAddr,
        /// Remote endpoint.
        remote: SocketAddr,
        /// Whether the subflow is a backup path.
        backup: bool,
    },
    /// A subflow was closed.
    SubflowClosed {
        /// Connection token.
        token: u32,
        /// Local endpoint.
        local: SocketAddr,
        /// Remote endpoint.
        remote: SocketAddr,
    },
    /// A subflow's backup-priority flag changed.
    SubflowPriorityChanged {
        /// Connection token.
        token: u32,
        /// Local address ID.
        local_id: u8,
        /// Remote address ID.
        remote_id: u8,
        /// New backup flag.
        backup: bool,
    },
}

/// Decode a multicast event payload into an [`MptcpEvent`].
///
/// Returns `Ok(None)` for a command this decoder doesn't recognize rather
/// than an error, since future kernels may add event types that callers
/// should be able to skip instead of failing the whole stream.
pub fn decode_event(cmd: u8, payload: &[u8]) -> Result<Option<MptcpEvent>> {
    if payload.len() < GENL_HDRLEN {
        return Err(Error::InvalidMessage("GENL header too short".into()));
    }
    let attrs = EventAttrs::parse(&payload[GENL_HDRLEN..]);

    match cmd {
        mptcp_event::CREATED => Ok(Some(MptcpEvent::ConnectionCreated {
            token: attrs.require_token()?,
            local: attrs.require_local()?,
            remote: attrs.require_remote()?,
            path_manager_name: attrs.path_manager_name.clone(),
            backup: attrs.backup,
        })),
        mptcp_event::ESTABLISHED => Ok(Some(MptcpEvent::ConnectionEstablished {
            token: attrs.require_token()?,
            local: attrs.require_local()?,
            remote: attrs.require_remote()?,
            backup: attrs.backup,
        })),
        mptcp_event::CLOSED => Ok(Some(MptcpEvent::ConnectionClosed {
            token: attrs.require_token()?,
        })),
        mptcp_event::ANNOUNCED => Ok(Some(MptcpEvent::AddressAnnounced {
            token: attrs.require_token()?,
            address_id: attrs.require_rem_id()?,
            address: attrs.require_remote_addr()?,
            port: attrs.require_dport()?,
        })),
        mptcp_event::REMOVED => Ok(Some(MptcpEvent::AddressRemoved {
            token: attrs.require_token()?,
            address_id: attrs.require_rem_id()?,
        })),
        mptcp_event::SUB_ESTABLISHED => Ok(Some(MptcpEvent::SubflowEstablished {
            token: attrs.require_token()?,
            local_id: attrs.require_loc_id()?,
            remote_id: attrs.require_rem_id()?,
            local: attrs.require_local()?,
            remote: attrs.require_remote()?,
            backup: attrs.backup,
        })),
        mptcp_event::SUB_CLOSED => Ok(Some(MptcpEvent::SubflowClosed {
            token: attrs.require_token()?,
            local: attrs.require_local()?,
            remote: attrs.require_remote()?,
        })),
        mptcp_event::SUB_PRIORITY => Ok(Some(MptcpEvent::SubflowPriorityChanged {
            token: attrs.require_token()?,
            local_id: attrs.require_loc_id()?,
            remote_id: attrs.require_rem_id()?,
            backup: attrs.backup,
        })),
        _ => Ok(None),
    }
}

/// Log a length mismatch on a typed attribute. The attribute is dropped:
/// the decoded slot stays unset and decoding continues with the rest of
/// the message.
fn log_bad_length(attr: &str, expected: usize, actual: usize) {
    tracing::error!(attr, expected, actual, "attribute length");
}

/// Scratch accumulator for a single event's attributes, walked once up
/// front so each event variant can pull out only the fields it needs.
#[derive(Default)]
struct EventAttrs {
    token: Option<u32>,
    loc_id: Option<u8>,
    rem_id: Option<u8>,
    saddr: Option<IpAddr>,
    daddr: Option<IpAddr>,
    sport: Option<u16>,
    dport: Option<u16>,
    backup: bool,
    path_manager_name: Option<String>,
}

impl EventAttrs {
    fn parse(data: &[u8]) -> Self {
        let mut attrs = EventAttrs::default();

        for (attr_type, payload) in AttrIter::new(data) {
            match attr_type {
                t if t == mptcp_event_attr::TOKEN => {
                    if payload.len() == 4 {
                        attrs.token = Some(u32::from_ne_bytes(payload[..4].try_into().unwrap()));
                    } else {
                        log_bad_length("TOKEN", 4, payload.len());
                    }
                }
                t if t == mptcp_event_attr::LOC_ID => {
                    if payload.len() == 1 {
                        attrs.loc_id = Some(payload[0]);
                    } else {
                        log_bad_length("LOC_ID", 1, payload.len());
                    }
                }
                t if t == mptcp_event_attr::REM_ID => {
                    if payload.len() == 1 {
                        attrs.rem_id = Some(payload[0]);
                    } else {
                        log_bad_length("REM_ID", 1, payload.len());
                    }
                }
                t if t == mptcp_event_attr::SADDR4 => {
                    if payload.len() == 4 {
                        let octets: [u8; 4] = payload[..4].try_into().unwrap();
                        attrs.saddr = Some(IpAddr::V4(Ipv4Addr::from(octets)));
                    } else {
                        log_bad_length("SADDR4", 4, payload.len());
                    }
                }
                t if t == mptcp_event_attr::SADDR6 => {
                    if payload.len() == 16 {
                        let octets: [u8; 16] = payload[..16].try_into().unwrap();
                        attrs.saddr = Some(IpAddr::V6(Ipv6Addr::from(octets)));
                    } else {
                        log_bad_length("SADDR6", 16, payload.len());
                    }
                }
                t if t == mptcp_event_attr::DADDR4 => {
                    if payload.len() == 4 {
                        let octets: [u8; 4] = payload[..4].try_into().unwrap();
                        attrs.daddr = Some(IpAddr::V4(Ipv4Addr::from(octets)));
                    } else {
                        log_bad_length("DADDR4", 4, payload.len());
                    }
                }
                t if t == mptcp_event_attr::DADDR6 => {
                    if payload.len() == 16 {
                        let octets: [u8; 16] = payload[..16].try_into().unwrap();
                        attrs.daddr = Some(IpAddr::V6(Ipv6Addr::from(octets)));
                    } else {
                        log_bad_length("DADDR6", 16, payload.len());
                    }
                }
                t if t == mptcp_event_attr::SPORT => {
                    if payload.len() == 2 {
                        attrs.sport = Some(u16::from_be_bytes(payload[..2].try_into().unwrap()));
                    } else {
                        log_bad_length("SPORT", 2, payload.len());
                    }
                }
                t if t == mptcp_event_attr::DPORT => {
                    if payload.len() == 2 {
                        attrs.dport = Some(u16::from_be_bytes(payload[..2].try_into().unwrap()));
                    } else {
                        log_bad_length("DPORT", 2, payload.len());
                    }
                }
                t if t == mptcp_event_attr::BACKUP => {
                    if payload.is_empty() {
                        attrs.backup = true;
                    } else {
                        log_bad_length("BACKUP", 0, payload.len());
                    }
                }
                t if t == mptcp_event_attr::PATH_MANAGER => {
                    if payload.len() == NAMSIZ {
                        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                        if let Ok(name) = std::str::from_utf8(&payload[..end]) {
                            attrs.path_manager_name = Some(name.to_string());
                        }
                    } else {
                        log_bad_length("PATH_MANAGER", NAMSIZ, payload.len());
                    }
                }
                _ => {}
            }
        }

        attrs
    }

    fn require_token(&self) -> Result<u32> {
        required(self.token, "token")
    }

    fn require_loc_id(&self) -> Result<u8> {
        required(self.loc_id, "local address id")
    }

    fn require_rem_id(&self) -> Result<u8> {
        required(self.rem_id, "remote address id")
    }

    fn require_sport(&self) -> Result<u16> {
        required(self.sport, "local port")
    }

    fn require_dport(&self) -> Result<u16> {
        required(self.dport, "remote port")
    }

    fn require_local(&self) -> Result<SocketAddr> {
        let addr = required(self.saddr, "local address")?;
        Ok(SocketAddr::new(addr, self.require_sport()?))
    }

    fn require_remote(&self) -> Result<SocketAddr> {
        let addr = required(self.daddr, "remote address")?;
        Ok(SocketAddr::new(addr, self.require_dport()?))
    }

    fn require_remote_addr(&self) -> Result<IpAddr> {
        required(self.daddr, "announced address")
    }
}

/// Turn a missing optional field into the error and log a caller can key
/// monitoring off of. `field` names the attribute that was absent.
fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| {
        tracing::error!(field, "required attributes missing");
        Error::InvalidMessage(format!("event missing {field}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genl_header() -> Vec<u8> {
        vec![0u8; GENL_HDRLEN]
    }

    fn attr(ty: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let len = 4 + payload.len();
        buf.extend_from_slice(&(len as u16).to_ne_bytes());
        buf.extend_from_slice(&ty.to_ne_bytes());
        buf.extend_from_slice(payload);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
        buf
    }

    #[test]
    fn decodes_connection_closed() {
        let mut payload = genl_header();
        payload.extend(attr(mptcp_event_attr::TOKEN, &42u32.to_ne_bytes()));

        let event = decode_event(mptcp_event::CLOSED, &payload).unwrap().unwrap();
        assert_eq!(event, MptcpEvent::ConnectionClosed { token: 42 });
    }

    #[test]
    fn decodes_subflow_priority_changed() {
        let mut payload = genl_header();
        payload.extend(attr(mptcp_event_attr::TOKEN, &7u32.to_ne_bytes()));
        payload.extend(attr(mptcp_event_attr::LOC_ID, &[1]));
        payload.extend(attr(mptcp_event_attr::REM_ID, &[2]));
        payload.extend(attr(mptcp_event_attr::BACKUP, &[]));

        let event = decode_event(mptcp_event::SUB_PRIORITY, &payload)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            MptcpEvent::SubflowPriorityChanged {
                token: 7,
                local_id: 1,
                remote_id: 2,
                backup: true,
            }
        );
    }

    #[test]
    fn decodes_address_removed() {
        let mut payload = genl_header();
        payload.extend(attr(mptcp_event_attr::TOKEN, &9u32.to_ne_bytes()));
        payload.extend(attr(mptcp_event_attr::REM_ID, &[3]));

        let event = decode_event(mptcp_event::REMOVED, &payload).unwrap().unwrap();
        assert_eq!(
            event,
            MptcpEvent::AddressRemoved {
                token: 9,
                address_id: 3,
            }
        );
    }

    #[test]
    fn missing_token_is_an_error() {
        let payload = genl_header();
        let err = decode_event(mptcp_event::CLOSED, &payload).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[test]
    fn unknown_command_yields_none() {
        let payload = genl_header();
        assert!(decode_event(200, &payload).unwrap().is_none());
    }

    #[test]
    fn decodes_address_announced() {
        let mut payload = genl_header();
        payload.extend(attr(mptcp_event_attr::TOKEN, &9u32.to_ne_bytes()));
        payload.extend(attr(mptcp_event_attr::REM_ID, &[3]));
        payload.extend(attr(mptcp_event_attr::DADDR4, &[10, 0, 0, 5]));
        payload.extend(attr(mptcp_event_attr::DPORT, &4242u16.to_be_bytes()));

        let event = decode_event(mptcp_event::ANNOUNCED, &payload)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            MptcpEvent::AddressAnnounced {
                token: 9,
                address_id: 3,
                address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
                port: 4242,
            }
        );
    }

    #[test]
    fn oversized_rem_id_is_rejected_not_truncated() {
        // REM_ID is declared as a single byte; a kernel (or attacker)
        // sending a 2-byte payload must not have its first byte quietly
        // accepted as the address id.
        let mut payload = genl_header();
        payload.extend(attr(mptcp_event_attr::TOKEN, &9u32.to_ne_bytes()));
        payload.extend(attr(mptcp_event_attr::REM_ID, &[3, 0]));
        payload.extend(attr(mptcp_event_attr::DADDR4, &[10, 0, 0, 5]));
        payload.extend(attr(mptcp_event_attr::DPORT, &4242u16.to_be_bytes()));

        let err = decode_event(mptcp_event::ANNOUNCED, &payload).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[test]
    fn announced_without_port_is_rejected() {
        let mut payload = genl_header();
        payload.extend(attr(mptcp_event_attr::TOKEN, &9u32.to_ne_bytes()));
        payload.extend(attr(mptcp_event_attr::REM_ID, &[3]));
        payload.extend(attr(mptcp_event_attr::DADDR4, &[10, 0, 0, 5]));

        let err = decode_event(mptcp_event::ANNOUNCED, &payload).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[test]
    fn nonempty_backup_flag_is_rejected() {
        let mut payload = genl_header();
        payload.extend(attr(mptcp_event_attr::TOKEN, &7u32.to_ne_bytes()));
        payload.extend(attr(mptcp_event_attr::LOC_ID, &[1]));
        payload.extend(attr(mptcp_event_attr::REM_ID, &[2]));
        payload.extend(attr(mptcp_event_attr::BACKUP, &[1]));

        let event = decode_event(mptcp_event::SUB_PRIORITY, &payload)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            MptcpEvent::SubflowPriorityChanged {
                token: 7,
                local_id: 1,
                remote_id: 2,
                backup: false,
            }
        );
    }
}
