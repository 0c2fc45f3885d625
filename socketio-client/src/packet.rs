//! Socket.IO packet grammar.
//!
//! A packet is the payload of one Engine.IO MESSAGE:
//!
//! ```text
//! <type><attachments "-">?<namespace ",">?<ack id>?<json>
//! ```
//!
//! The namespace field is unconditional but the root `/` serializes to the
//! empty string, so it is only visible on the wire for custom namespaces.
//! CONNECT puts the optional auth object directly behind the type digit on
//! the root namespace (`0{auth}`) and after the `,` otherwise
//! (`0/admin,{auth}`); a literal `/,` is never produced. BINARY_EVENT and
//! BINARY_ACK announce their attachment count before the namespace and are
//! followed on the wire by that many raw binary frames.

use serde_json::Value;

use crate::errors::Error;
use crate::payload::{self, PayloadValue};

/// One application packet bound to a namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Namespace, `/` for the root.
    pub ns: String,
    pub inner: PacketData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    /// Namespace connect. Outgoing it carries the auth payload, incoming
    /// the server's `{"sid": ...}` acknowledgment.
    Connect(Option<Value>),
    Disconnect,
    /// `[event, args...]` array plus an optional ack id.
    Event(Value, Option<i64>),
    /// Acknowledgment body and the id it answers.
    Ack(Value, i64),
    /// Connection refusal, e.g. `{"message": "..."}`.
    ConnectError(Value),
    BinaryEvent(BinaryPacket, Option<i64>),
    BinaryAck(BinaryPacket, i64),
}

impl PacketData {
    fn index(&self) -> char {
        match self {
            PacketData::Connect(_) => '0',
            PacketData::Disconnect => '1',
            PacketData::Event(_, _) => '2',
            PacketData::Ack(_, _) => '3',
            PacketData::ConnectError(_) => '4',
            PacketData::BinaryEvent(_, _) => '5',
            PacketData::BinaryAck(_, _) => '6',
        }
    }
}

/// A binary packet mid-flight: the JSON tree with placeholder markers plus
/// the attachments, collected or pending.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPacket {
    /// Event array with `{"_placeholder":true,"num":i}` markers in place.
    pub data: Value,
    /// Attachments, in placeholder order.
    pub bin: Vec<Vec<u8>>,
    payload_count: usize,
}

impl BinaryPacket {
    /// Incoming: the header announced `payload_count` trailing frames.
    pub fn incoming(data: Value, payload_count: usize) -> Self {
        Self {
            data,
            bin: Vec::with_capacity(payload_count),
            payload_count,
        }
    }

    /// Outgoing: all attachments are known up front.
    pub fn outgoing(data: Value, bin: Vec<Vec<u8>>) -> Self {
        Self {
            data,
            payload_count: bin.len(),
            bin,
        }
    }

    pub fn payload_count(&self) -> usize {
        self.payload_count
    }

    /// Store the next attachment frame.
    pub fn add_payload(&mut self, payload: Vec<u8>) {
        self.bin.push(payload);
    }

    pub fn is_complete(&self) -> bool {
        self.bin.len() >= self.payload_count
    }

    /// Substitute the collected attachments into their placeholders,
    /// yielding the final event tree.
    pub fn into_data(self) -> PayloadValue {
        payload::substitute(self.data, &self.bin)
    }
}

/// An application event as delivered to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub ns: String,
    pub name: String,
    /// Arguments after the event name; binary arguments are
    /// [`PayloadValue::Bytes`] leaves.
    pub args: Vec<PayloadValue>,
    pub id: Option<i64>,
}

impl Event {
    /// First argument, the conventional event payload.
    pub fn data(&self) -> Option<&PayloadValue> {
        self.args.first()
    }
}

impl Packet {
    /// CONNECT for a namespace, with the auth payload when the dialect
    /// sends one.
    pub fn connect(ns: impl Into<String>, auth: Option<Value>) -> Self {
        Self {
            ns: ns.into(),
            inner: PacketData::Connect(auth),
        }
    }

    pub fn disconnect(ns: impl Into<String>) -> Self {
        Self {
            ns: ns.into(),
            inner: PacketData::Disconnect,
        }
    }

    /// Build an EVENT, or a BINARY_EVENT when the payload carries binary
    /// leaves. The wire array is `[event, data]`.
    pub fn event(
        ns: impl Into<String>,
        event: impl Into<String>,
        data: impl Into<PayloadValue>,
    ) -> Self {
        let tree = PayloadValue::Array(vec![
            PayloadValue::Json(Value::String(event.into())),
            data.into(),
        ]);
        let (data, bin) = payload::extract(tree);
        let inner = if bin.is_empty() {
            PacketData::Event(data, None)
        } else {
            PacketData::BinaryEvent(BinaryPacket::outgoing(data, bin), None)
        };
        Self {
            ns: ns.into(),
            inner,
        }
    }

    /// View an EVENT, or a completed BINARY_EVENT, as a delivered event.
    pub fn into_event(self) -> Option<Event> {
        let (tree, id) = match self.inner {
            PacketData::Event(data, id) => (payload::substitute(data, &[]), id),
            PacketData::BinaryEvent(bin, id) if bin.is_complete() => (bin.into_data(), id),
            _ => return None,
        };
        let items = match tree {
            PayloadValue::Array(items) => items,
            PayloadValue::Json(Value::Array(items)) => {
                items.into_iter().map(PayloadValue::Json).collect()
            }
            _ => return None,
        };
        let mut items = items.into_iter();
        let name = match items.next() {
            Some(PayloadValue::Json(Value::String(name))) => name,
            _ => return None,
        };
        Some(Event {
            ns: self.ns,
            name,
            args: items.collect(),
            id,
        })
    }
}

impl TryFrom<&Packet> for String {
    type Error = Error;

    fn try_from(packet: &Packet) -> Result<Self, Self::Error> {
        let mut out = String::new();
        out.push(packet.inner.index());

        if let PacketData::BinaryEvent(bin, _) | PacketData::BinaryAck(bin, _) = &packet.inner {
            out.push_str(&bin.payload_count().to_string());
            out.push('-');
        }

        if !packet.ns.is_empty() && packet.ns != "/" {
            out.push_str(&packet.ns);
            out.push(',');
        }

        match &packet.inner {
            PacketData::Connect(Some(auth)) => out.push_str(&serde_json::to_string(auth)?),
            PacketData::Connect(None) | PacketData::Disconnect => {}
            PacketData::Event(data, id) | PacketData::BinaryEvent(BinaryPacket { data, .. }, id) => {
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                out.push_str(&serde_json::to_string(data)?);
            }
            PacketData::Ack(data, id) | PacketData::BinaryAck(BinaryPacket { data, .. }, id) => {
                out.push_str(&id.to_string());
                out.push_str(&serde_json::to_string(data)?);
            }
            PacketData::ConnectError(data) => out.push_str(&serde_json::to_string(data)?),
        }
        Ok(out)
    }
}

impl TryFrom<Packet> for String {
    type Error = Error;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        String::try_from(&packet)
    }
}

impl TryFrom<&str> for Packet {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut cursor = value;

        let packet_type = take_char(&mut cursor).ok_or(Error::InvalidPacketLength)?;
        if !('0'..='6').contains(&packet_type) {
            return Err(Error::InvalidPacketType(Some(packet_type)));
        }

        let attachments = if packet_type == '5' || packet_type == '6' {
            let digits = take_while(&mut cursor, |c| c.is_ascii_digit());
            let count = digits
                .parse::<usize>()
                .map_err(|_| Error::InvalidPacketLength)?;
            if take_char(&mut cursor) != Some('-') {
                return Err(Error::InvalidPacketLength);
            }
            count
        } else {
            0
        };

        // The namespace runs to the `,` separating it from the data, and is
        // only present when it starts with `/`. A `[` or `{` means the data
        // starts immediately.
        let ns = if cursor.starts_with('/') {
            let run = take_while(&mut cursor, |c| c != ',' && c != '[' && c != '{');
            if cursor.starts_with(',') {
                take_char(&mut cursor);
            }
            run.to_string()
        } else {
            "/".to_string()
        };

        let id = {
            let digits = take_while(&mut cursor, |c| c.is_ascii_digit());
            digits.parse::<i64>().ok()
        };

        let data: Option<Value> = if cursor.is_empty() {
            None
        } else {
            Some(serde_json::from_str(cursor)?)
        };

        let inner = match packet_type {
            '0' => PacketData::Connect(data),
            '1' => PacketData::Disconnect,
            '2' => PacketData::Event(expect_event_array(data)?, id),
            '3' => PacketData::Ack(
                data.ok_or(Error::InvalidPacketLength)?,
                id.ok_or(Error::InvalidPacketLength)?,
            ),
            '4' => PacketData::ConnectError(data.ok_or(Error::InvalidPacketLength)?),
            '5' => PacketData::BinaryEvent(
                BinaryPacket::incoming(expect_event_array(data)?, attachments),
                id,
            ),
            '6' => PacketData::BinaryAck(
                BinaryPacket::incoming(data.ok_or(Error::InvalidPacketLength)?, attachments),
                id.ok_or(Error::InvalidPacketLength)?,
            ),
            _ => unreachable!("type digit range checked above"),
        };
        Ok(Packet { ns, inner })
    }
}

impl TryFrom<String> for Packet {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Packet::try_from(value.as_str())
    }
}

fn take_char(cursor: &mut &str) -> Option<char> {
    let mut chars = cursor.chars();
    let c = chars.next()?;
    *cursor = chars.as_str();
    Some(c)
}

fn take_while<'a>(cursor: &mut &'a str, pred: impl Fn(char) -> bool) -> &'a str {
    let end = cursor
        .char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(at, _)| at)
        .unwrap_or(cursor.len());
    let (run, rest) = cursor.split_at(end);
    *cursor = rest;
    run
}

fn expect_event_array(data: Option<Value>) -> Result<Value, Error> {
    match data {
        Some(Value::Array(items)) => {
            if items.first().and_then(Value::as_str).is_none() {
                return Err(Error::MissingEventName);
            }
            Ok(Value::Array(items))
        }
        _ => Err(Error::MissingEventName),
    }
}
