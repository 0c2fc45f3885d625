//! Protocol revisions and their behavioral differences.
//!
//! Everything that varies between Engine.IO revisions is expressed as data on
//! [`ProtocolVersion`], so the engine and the codecs run a single code path
//! and branch on these predicates instead of carrying one variant per
//! revision.

/// Engine.IO protocol revision, as negotiated by the `EIO` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V2,
    V3,
    V4,
}

impl ProtocolVersion {
    /// Value of the `EIO` query parameter.
    pub fn eio(self) -> u8 {
        match self {
            ProtocolVersion::V2 => 2,
            ProtocolVersion::V3 => 3,
            ProtocolVersion::V4 => 4,
        }
    }

    /// v2/v3 polling bodies frame every packet as `<chars>:<packet>`, where
    /// the length counts unicode scalar values. v4 joins packets with the
    /// `0x1e` record separator instead.
    pub fn length_prefixed_payload(self) -> bool {
        matches!(self, ProtocolVersion::V2 | ProtocolVersion::V3)
    }

    /// Who drives the heartbeat: up to v3 the client pings when the session
    /// has been quiet for a ping interval, from v4 the server pings and the
    /// client answers with a pong.
    pub fn client_initiates_ping(self) -> bool {
        matches!(self, ProtocolVersion::V2 | ProtocolVersion::V3)
    }

    /// v4 connects the application namespace over the polling endpoint
    /// before upgrading to websocket.
    pub fn connect_namespace_over_polling(self) -> bool {
        matches!(self, ProtocolVersion::V4)
    }

    /// v2 servers push a gratuitous connect message right after the upgrade
    /// packet, which the client must read and discard.
    pub fn drains_spurious_connect(self) -> bool {
        matches!(self, ProtocolVersion::V2)
    }

    /// v2/v3 prefix websocket binary frames with a raw `0x04` packet-type
    /// byte; v4 sends bare attachment bytes.
    pub fn binary_type_prefix(self) -> bool {
        matches!(self, ProtocolVersion::V2 | ProtocolVersion::V3)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.eio())
    }
}
