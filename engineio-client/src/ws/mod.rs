//! RFC 6455 client framing over any byte stream.
//!
//! Outgoing frames are always masked with a fresh key. Incoming bytes are
//! buffered and parsed incrementally, so a read timeout mid-frame leaves the
//! decoder in a resumable state: buffered bytes and a partially assembled
//! fragmented message survive until the next [`WsSocket::recv`] call.

mod frame;
mod mask;

pub use frame::OpCode;

use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::Error;

/// One complete message, after fragment reassembly.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<u16>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

/// Client end of a websocket connection, wrapping a stream that already
/// completed the 101 handshake.
pub struct WsSocket<S> {
    stream: S,
    buf: BytesMut,
    /// Fragmented message under assembly: initial opcode plus payload so far.
    partial: Option<(OpCode, Vec<u8>)>,
    max_payload: usize,
}

impl<S> WsSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `leftover` holds bytes that arrived glued to the upgrade response.
    pub fn new(stream: S, leftover: &[u8], max_payload: usize) -> Self {
        let mut buf = BytesMut::with_capacity(8192);
        buf.extend_from_slice(leftover);
        Self {
            stream,
            buf,
            partial: None,
            max_payload,
        }
    }

    /// Send one unfragmented message. Returns the bytes put on the wire
    /// (header included).
    pub async fn send(&mut self, opcode: OpCode, payload: &[u8]) -> Result<usize, Error> {
        if opcode.is_control() && payload.len() > 125 {
            return Err(Error::PayloadTooLarge(125));
        }
        if payload.len() > self.max_payload {
            return Err(Error::PayloadTooLarge(self.max_payload));
        }
        let written = self.write_frame(true, opcode, payload).await?;
        self.stream.flush().await?;
        Ok(written)
    }

    /// Send a payload split into frames of at most `fragment_size` bytes:
    /// the opcode on the first frame, CONTINUATION afterwards, FIN only on
    /// the last.
    pub async fn send_fragmented(
        &mut self,
        opcode: OpCode,
        payload: &[u8],
        fragment_size: usize,
    ) -> Result<usize, Error> {
        if opcode.is_control() {
            return Err(Error::InvalidArgument(
                "control frames cannot be fragmented".to_string(),
            ));
        }
        if fragment_size == 0 {
            return Err(Error::InvalidArgument("zero fragment size".to_string()));
        }
        if payload.len() > self.max_payload {
            return Err(Error::PayloadTooLarge(self.max_payload));
        }

        let mut written = 0;
        let mut chunks = payload.chunks(fragment_size).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let op = if first { opcode } else { OpCode::Continuation };
            written += self.write_frame(chunks.peek().is_none(), op, chunk).await?;
            first = false;
        }
        if written == 0 {
            // Empty payload still goes out as one empty final frame.
            written = self.write_frame(true, opcode, &[]).await?;
        }
        self.stream.flush().await?;
        Ok(written)
    }

    async fn write_frame(
        &mut self,
        fin: bool,
        opcode: OpCode,
        payload: &[u8],
    ) -> Result<usize, Error> {
        let key: [u8; 4] = rand::random();
        let (head, head_len) = frame::encode_header(fin, opcode, key, payload.len());
        self.stream.write_all(&head[..head_len]).await?;

        let mut masked = payload.to_vec();
        mask::apply(key, &mut masked);
        self.stream.write_all(&masked).await?;
        Ok(head_len + payload.len())
    }

    /// Read one complete message. A stream timeout surfaces as
    /// [`Error::Timeout`] with all buffered state preserved.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Message, Error> {
        loop {
            while let Some(header) = frame::parse_header(&self.buf)? {
                if header.masked {
                    return Err(Error::MaskedServerFrame);
                }
                if header.payload_len > self.max_payload {
                    return Err(Error::PayloadTooLarge(self.max_payload));
                }
                if self.buf.len() < header.header_len + header.payload_len {
                    break;
                }
                self.buf.advance(header.header_len);
                let payload = self.buf.split_to(header.payload_len).to_vec();

                if let Some(message) = self.accept_frame(header.fin, header.opcode, payload)? {
                    return Ok(message);
                }
            }

            let n = tokio::time::timeout(timeout, self.stream.read_buf(&mut self.buf))
                .await
                .map_err(|_| Error::Timeout)??;
            if n == 0 {
                return Err(Error::Closed);
            }
        }
    }

    fn accept_frame(
        &mut self,
        fin: bool,
        opcode: OpCode,
        payload: Vec<u8>,
    ) -> Result<Option<Message>, Error> {
        match opcode {
            // Control frames may interleave a fragmented message.
            OpCode::Close => {
                let code = match payload.len() {
                    0 | 1 => None,
                    _ => Some(u16::from_be_bytes([payload[0], payload[1]])),
                };
                Ok(Some(Message::Close(code)))
            }
            OpCode::Ping => Ok(Some(Message::Ping(payload))),
            OpCode::Pong => Ok(Some(Message::Pong(payload))),
            OpCode::Text | OpCode::Binary => {
                if self.partial.is_some() {
                    return Err(Error::UnexpectedFragment);
                }
                if fin {
                    return Ok(Some(Self::finish(opcode, payload)?));
                }
                self.partial = Some((opcode, payload));
                Ok(None)
            }
            OpCode::Continuation => {
                let (initial, mut assembled) =
                    self.partial.take().ok_or(Error::UnexpectedFragment)?;
                if assembled.len() + payload.len() > self.max_payload {
                    return Err(Error::PayloadTooLarge(self.max_payload));
                }
                assembled.extend_from_slice(&payload);
                if fin {
                    return Ok(Some(Self::finish(initial, assembled)?));
                }
                self.partial = Some((initial, assembled));
                Ok(None)
            }
        }
    }

    fn finish(opcode: OpCode, payload: Vec<u8>) -> Result<Message, Error> {
        match opcode {
            OpCode::Text => {
                let text = String::from_utf8(payload).map_err(|_| Error::InvalidUtf8)?;
                Ok(Message::Text(text))
            }
            _ => Ok(Message::Binary(payload)),
        }
    }

    /// Send a close frame with the normal-closure status.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.send(OpCode::Close, &1000u16.to_be_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn pair() -> (WsSocket<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(1 << 20);
        (WsSocket::new(client, &[], 1 << 20), server)
    }

    /// Parse one client frame from `data`, unmasking its payload. Returns
    /// `(fin, opcode bits, payload, consumed)`.
    fn read_client_frame(data: &[u8]) -> (bool, u8, Vec<u8>, usize) {
        let fin = data[0] & 0x80 != 0;
        let opcode = data[0] & 0x0F;
        assert_eq!(data[1] & 0x80, 0x80, "client frames must be masked");
        let short_len = (data[1] & 0x7F) as usize;
        let (len, mut at) = match short_len {
            126 => (u16::from_be_bytes([data[2], data[3]]) as usize, 4),
            127 => {
                let mut be = [0u8; 8];
                be.copy_from_slice(&data[2..10]);
                (u64::from_be_bytes(be) as usize, 10)
            }
            n => (n, 2),
        };
        let key = [data[at], data[at + 1], data[at + 2], data[at + 3]];
        at += 4;
        let mut payload = data[at..at + len].to_vec();
        mask::apply(key, &mut payload);
        (fin, opcode, payload, at + len)
    }

    fn server_frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![(u8::from(fin) << 7) | opcode];
        if payload.len() < 126 {
            out.push(payload.len() as u8);
        } else {
            out.push(126);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn sent_frames_are_masked_and_recoverable() {
        let (mut ws, mut server) = pair();
        let n = ws.send(OpCode::Text, b"hello").await.unwrap();
        assert_eq!(n, 2 + 4 + 5);

        let mut wire = vec![0u8; 64];
        let read = server.read(&mut wire).await.unwrap();
        let (fin, opcode, payload, consumed) = read_client_frame(&wire[..read]);
        assert!(fin);
        assert_eq!(opcode, 0x1);
        assert_eq!(payload, b"hello");
        assert_eq!(consumed, read);
    }

    #[tokio::test]
    async fn fragmented_send_shapes_frames() {
        let (mut ws, mut server) = pair();
        ws.send_fragmented(OpCode::Binary, b"abcdefgh", 3).await.unwrap();

        let mut wire = vec![0u8; 128];
        let read = server.read(&mut wire).await.unwrap();
        let mut rest = &wire[..read];

        let (fin, opcode, payload, consumed) = read_client_frame(rest);
        assert!(!fin);
        assert_eq!(opcode, 0x2);
        assert_eq!(payload, b"abc");
        rest = &rest[consumed..];

        let (fin, opcode, payload, consumed) = read_client_frame(rest);
        assert!(!fin);
        assert_eq!(opcode, 0x0);
        assert_eq!(payload, b"def");
        rest = &rest[consumed..];

        let (fin, opcode, payload, consumed) = read_client_frame(rest);
        assert!(fin);
        assert_eq!(opcode, 0x0);
        assert_eq!(payload, b"gh");
        assert_eq!(consumed, rest.len());
    }

    #[tokio::test]
    async fn recv_assembles_fragments() {
        let (mut ws, mut server) = pair();
        server
            .write_all(&server_frame(false, 0x1, b"hel"))
            .await
            .unwrap();
        server
            .write_all(&server_frame(true, 0x0, b"lo"))
            .await
            .unwrap();

        assert_eq!(
            ws.recv(TIMEOUT).await.unwrap(),
            Message::Text("hello".to_string())
        );
    }

    #[tokio::test]
    async fn control_frames_interleave_fragments() {
        let (mut ws, mut server) = pair();
        server
            .write_all(&server_frame(false, 0x2, b"par"))
            .await
            .unwrap();
        server
            .write_all(&server_frame(true, 0x9, b"beat"))
            .await
            .unwrap();
        server
            .write_all(&server_frame(true, 0x0, b"tial"))
            .await
            .unwrap();

        assert_eq!(ws.recv(TIMEOUT).await.unwrap(), Message::Ping(b"beat".to_vec()));
        assert_eq!(
            ws.recv(TIMEOUT).await.unwrap(),
            Message::Binary(b"partial".to_vec())
        );
    }

    #[tokio::test]
    async fn timeout_preserves_partial_state() {
        let (mut ws, mut server) = pair();
        server
            .write_all(&server_frame(false, 0x1, b"half"))
            .await
            .unwrap();

        let err = ws.recv(Duration::from_millis(30)).await.unwrap_err();
        assert!(err.is_timeout());

        server
            .write_all(&server_frame(true, 0x0, b" done"))
            .await
            .unwrap();
        assert_eq!(
            ws.recv(TIMEOUT).await.unwrap(),
            Message::Text("half done".to_string())
        );
    }

    #[tokio::test]
    async fn masked_server_frame_is_a_protocol_error() {
        let (mut ws, mut server) = pair();
        server.write_all(&[0x81, 0x81, 1, 2, 3, 4, b'x']).await.unwrap();
        assert!(matches!(
            ws.recv(TIMEOUT).await,
            Err(Error::MaskedServerFrame)
        ));
    }

    #[tokio::test]
    async fn oversized_send_is_refused_before_writing() {
        let (client, mut server) = duplex(1 << 16);
        let mut ws = WsSocket::new(client, &[], 8);
        assert!(matches!(
            ws.send(OpCode::Binary, b"123456789").await,
            Err(Error::PayloadTooLarge(8))
        ));
        drop(ws);

        // Nothing reached the wire.
        let mut wire = vec![0u8; 16];
        assert_eq!(server.read(&mut wire).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_frame_surfaces_its_code() {
        let (mut ws, mut server) = pair();
        server
            .write_all(&server_frame(true, 0x8, &1001u16.to_be_bytes()))
            .await
            .unwrap();
        assert_eq!(ws.recv(TIMEOUT).await.unwrap(), Message::Close(Some(1001)));
    }
}
