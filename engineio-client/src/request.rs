//! One-shot HTTP/1.1 exchanges over an already-connected byte stream.
//!
//! Just enough of the protocol for the polling endpoints and the websocket
//! upgrade: serialize one request, read one response. Whether the stream is
//! reused afterwards is the caller's business; this module never closes it.

use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use memchr::memmem;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::Error;

/// A request line plus headers and an optional body, written verbatim.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Path and query, e.g. `/socket.io/?EIO=4&transport=polling&t=...`.
    pub target: String,
    /// `Host` header value.
    pub host: String,
    /// Extra headers, rendered in order after the fixed ones.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Ask the server to keep the connection open for the next request.
    pub keep_alive: bool,
}

/// A parsed response. In `skip_body` mode, `body` holds whatever bytes
/// arrived glued to the header block (the first websocket frames, for a 101).
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Run one request/response round-trip on `stream`.
///
/// Every read is bounded by `timeout`; running out of time mid-response is
/// an [`Error::Timeout`].
pub async fn exchange<S>(
    stream: &mut S,
    req: &Request,
    skip_body: bool,
    timeout: Duration,
) -> Result<Response, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&render(req)).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(4096);
    let header_end = loop {
        if let Some(pos) = memmem::find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        fill(stream, &mut buf, timeout).await?;
    };

    let head = buf.split_to(header_end);
    let (status, headers) = parse_head(&head)?;

    if skip_body {
        return Ok(Response {
            status,
            headers,
            body: buf.freeze(),
        });
    }

    let body = if let Some(len) = content_length(&headers)? {
        while buf.len() < len {
            fill(stream, &mut buf, timeout).await?;
        }
        buf.split_to(len).freeze()
    } else if is_chunked(&headers) {
        read_chunked(stream, &mut buf, timeout).await?
    } else {
        // No framing: the body runs until the server closes the connection.
        loop {
            match tokio::time::timeout(timeout, stream.read_buf(&mut buf)).await {
                Ok(Ok(0)) => break buf.freeze(),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(Error::Timeout),
            }
        }
    };

    Ok(Response {
        status,
        headers,
        body,
    })
}

fn render(req: &Request) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(req.method.as_str().as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(req.target.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");
    push_header(&mut out, "Host", &req.host);
    // A caller-supplied Connection header (the upgrade) wins over the
    // keep-alive hint.
    let has_connection = req
        .headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("connection"));
    if !has_connection {
        push_header(
            &mut out,
            "Connection",
            if req.keep_alive { "keep-alive" } else { "close" },
        );
    }
    for (name, value) in &req.headers {
        push_header(&mut out, name, value);
    }
    if let Some(body) = &req.body {
        push_header(&mut out, "Content-Length", &body.len().to_string());
    }
    out.extend_from_slice(b"\r\n");
    if let Some(body) = &req.body {
        out.extend_from_slice(body);
    }
    out
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

async fn fill<S>(stream: &mut S, buf: &mut BytesMut, timeout: Duration) -> Result<(), Error>
where
    S: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, stream.read_buf(buf)).await {
        Ok(Ok(0)) => Err(Error::Closed),
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(Error::Timeout),
    }
}

fn parse_head(head: &[u8]) -> Result<(StatusCode, HeaderMap), Error> {
    let mut lines = head.split(|&b| b == b'\n').map(|l| {
        let mut l = l;
        if l.last() == Some(&b'\r') {
            l = &l[..l.len() - 1];
        }
        l
    });

    let status_line = lines.next().ok_or(Error::MalformedResponse("empty"))?;
    let mut parts = status_line.splitn(3, |&b| b == b' ');
    match parts.next() {
        Some(v) if v.starts_with(b"HTTP/1.") => {}
        _ => return Err(Error::MalformedResponse("not an http/1.x status line")),
    }
    let code = parts
        .next()
        .ok_or(Error::MalformedResponse("missing status code"))?;
    let status = StatusCode::from_bytes(code)
        .map_err(|_| Error::MalformedResponse("invalid status code"))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let colon = memchr::memchr(b':', line).ok_or(Error::MalformedResponse("header line"))?;
        let name = HeaderName::from_bytes(trim(&line[..colon]))
            .map_err(|_| Error::MalformedResponse("header name"))?;
        let value = HeaderValue::from_bytes(trim(&line[colon + 1..]))
            .map_err(|_| Error::MalformedResponse("header value"))?;
        headers.append(name, value);
    }
    Ok((status, headers))
}

fn trim(mut bytes: &[u8]) -> &[u8] {
    while bytes.first().map_or(false, u8::is_ascii_whitespace) {
        bytes = &bytes[1..];
    }
    while bytes.last().map_or(false, u8::is_ascii_whitespace) {
        bytes = &bytes[..bytes.len() - 1];
    }
    bytes
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, Error> {
    match headers.get(http::header::CONTENT_LENGTH) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or(Error::MalformedResponse("content-length")),
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

async fn read_chunked<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    timeout: Duration,
) -> Result<Bytes, Error>
where
    S: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        let line_end = loop {
            if let Some(pos) = memmem::find(buf, b"\r\n") {
                break pos;
            }
            fill(stream, buf, timeout).await?;
        };
        let size_line = buf.split_to(line_end + 2);
        let size_str = std::str::from_utf8(&size_line[..line_end])
            .map_err(|_| Error::MalformedResponse("chunk size"))?;
        // Chunk extensions after `;` are ignored.
        let size_str = size_str.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| Error::MalformedResponse("chunk size"))?;

        while buf.len() < size + 2 {
            fill(stream, buf, timeout).await?;
        }
        body.extend_from_slice(&buf[..size]);
        buf.advance(size + 2);

        if size == 0 {
            return Ok(body.freeze());
        }
    }
}
