//! Polling body codec for the two framing dialects.
//!
//! Up to protocol v3 every packet in a body is prefixed with its length in
//! unicode scalar values, `<len>:<packet>`. From v4 on, packets are joined
//! with the `0x1e` record separator; a body holding a single packet carries
//! no separator at all. v2/v3 servers answering a `b64=1` client encode
//! binary packets as `b4<base64>` text records.

use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use memchr::memchr;

use crate::errors::Error;
use crate::packet::Packet;
use crate::protocol::ProtocolVersion;

/// Record separator between packets in a v4 body.
const SEPARATOR: char = '\x1e';

/// Decode one polling body into its packets.
pub fn decode(body: &str, version: ProtocolVersion) -> Result<Vec<Packet>, Error> {
    if version.length_prefixed_payload() {
        decode_prefixed(body)
    } else {
        body.split(SEPARATOR)
            .filter(|record| !record.is_empty())
            .map(decode_record)
            .collect()
    }
}

/// Frame one packet for a POST body.
pub fn encode(packet: Packet, version: ProtocolVersion) -> Result<String, Error> {
    let data: String = packet.try_into()?;
    if version.length_prefixed_payload() {
        Ok(format!("{}:{}", data.chars().count(), data))
    } else {
        Ok(data)
    }
}

fn decode_prefixed(body: &str) -> Result<Vec<Packet>, Error> {
    let mut packets = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let colon = memchr(b':', rest.as_bytes()).ok_or(Error::InvalidPacketLength)?;
        let len: usize = rest[..colon]
            .parse()
            .map_err(|_| Error::InvalidPacketLength)?;
        let record = &rest[colon + 1..];

        // The length counts characters, not bytes.
        let byte_len = match record.char_indices().nth(len) {
            Some((at, _)) => at,
            None if record.chars().count() == len => record.len(),
            None => return Err(Error::InvalidPacketLength),
        };
        packets.push(decode_record(&record[..byte_len])?);
        rest = &record[byte_len..];
    }
    Ok(packets)
}

fn decode_record(record: &str) -> Result<Packet, Error> {
    if let Some(encoded) = record.strip_prefix('b') {
        // Base64 record: `b` + packet type + payload. Only MESSAGE packets
        // ever carry binary data.
        let mut chars = encoded.chars();
        match chars.next() {
            Some('4') => return Ok(Packet::Binary(b64.decode(chars.as_str())?)),
            c => return Err(Error::InvalidPacketType(c)),
        }
    }
    Packet::try_from(record)
}
