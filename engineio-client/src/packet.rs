use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// An Engine.IO packet, the unit of traffic on both transports.
///
/// Text packets are a single type digit followed by the payload; the probe
/// forms used around the upgrade carry the literal `probe` suffix. Binary
/// packets never go through the string codec: they are whole websocket
/// binary frames, with [`Packet::BinaryV3`] carrying the v2/v3 leading
/// `0x04` type byte stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Handshake acknowledgment with the session parameters.
    Open(OpenPacket),
    Close,
    Ping,
    Pong,
    /// `2probe`, sent around the transport upgrade.
    PingProbe,
    /// `3probe`, the answer to [`Packet::PingProbe`].
    PongProbe,
    /// Application data, one Socket.IO packet per message.
    Message(String),
    Upgrade,
    Noop,
    /// Raw binary frame (v4).
    Binary(Vec<u8>),
    /// Raw binary frame with the v2/v3 type prefix removed.
    BinaryV3(Vec<u8>),
}

impl TryFrom<Packet> for String {
    type Error = Error;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        let res = match packet {
            Packet::Open(open) => format!("0{}", serde_json::to_string(&open)?),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::PingProbe => "2probe".to_string(),
            Packet::PongProbe => "3probe".to_string(),
            Packet::Message(data) => format!("4{data}"),
            Packet::Upgrade => "5".to_string(),
            Packet::Noop => "6".to_string(),
            p @ (Packet::Binary(_) | Packet::BinaryV3(_)) => return Err(Error::BadPacket(p)),
        };
        Ok(res)
    }
}

impl TryFrom<&str> for Packet {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        let packet_type = chars.next().ok_or(Error::InvalidPacketLength)?;
        let rest = chars.as_str();
        let packet = match packet_type {
            '0' => Packet::Open(serde_json::from_str(rest)?),
            '1' => Packet::Close,
            '2' if rest == "probe" => Packet::PingProbe,
            '2' => Packet::Ping,
            '3' if rest == "probe" => Packet::PongProbe,
            '3' => Packet::Pong,
            '4' => Packet::Message(rest.to_string()),
            '5' => Packet::Upgrade,
            '6' => Packet::Noop,
            c => return Err(Error::InvalidPacketType(Some(c))),
        };
        Ok(packet)
    }
}

impl TryFrom<String> for Packet {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Packet::try_from(value.as_str())
    }
}

/// JSON object carried by the `OPEN` packet of the handshake.
///
/// Intervals are transmitted in milliseconds. `maxPayload` only exists from
/// protocol v4 on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: String,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_packet() -> OpenPacket {
        OpenPacket {
            sid: "lv_VI97HAXpY6yYWAAAC".to_string(),
            upgrades: vec!["websocket".to_string()],
            ping_interval: 25000,
            ping_timeout: 20000,
            max_payload: Some(1000000),
        }
    }

    #[test]
    fn open_decode() {
        let body = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        assert_eq!(Packet::try_from(body).unwrap(), Packet::Open(open_packet()));
    }

    #[test]
    fn open_decode_without_max_payload() {
        let body = r#"0{"sid":"x","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#;
        let packet = Packet::try_from(body).unwrap();
        match packet {
            Packet::Open(open) => assert_eq!(open.max_payload, None),
            p => panic!("expected open, got {p:?}"),
        }
    }

    #[test]
    fn control_round_trip() {
        for (packet, wire) in [
            (Packet::Close, "1"),
            (Packet::Ping, "2"),
            (Packet::Pong, "3"),
            (Packet::PingProbe, "2probe"),
            (Packet::PongProbe, "3probe"),
            (Packet::Upgrade, "5"),
            (Packet::Noop, "6"),
        ] {
            let encoded: String = packet.clone().try_into().unwrap();
            assert_eq!(encoded, wire);
            assert_eq!(Packet::try_from(wire).unwrap(), packet);
        }
    }

    #[test]
    fn message_round_trip() {
        let packet = Packet::Message("2[\"hello\",[\"world\"]]".to_string());
        let encoded: String = packet.clone().try_into().unwrap();
        assert_eq!(encoded, "42[\"hello\",[\"world\"]]");
        assert_eq!(Packet::try_from(encoded).unwrap(), packet);
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            Packet::try_from("7"),
            Err(Error::InvalidPacketType(Some('7')))
        ));
        assert!(matches!(
            Packet::try_from(""),
            Err(Error::InvalidPacketLength)
        ));
    }

    #[test]
    fn binary_never_encodes_as_text() {
        let res: Result<String, _> = Packet::Binary(vec![1, 2, 3]).try_into();
        assert!(matches!(res, Err(Error::BadPacket(_))));
    }
}
