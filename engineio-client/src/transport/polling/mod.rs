//! Client half of the HTTP long-polling transport.
//!
//! Polling serves the handshake and, for v4, the pre-upgrade namespace
//! connect. One stream is kept alive across requests when the configuration
//! allows; any request error discards it so the next operation starts from a
//! fresh connection.

pub(crate) mod payload;

use http::header::{CONNECTION, COOKIE, SET_COOKIE};
use http::{Method, StatusCode};

use crate::config::Config;
use crate::errors::Error;
use crate::packet::Packet;
use crate::request::{self, Request, Response};
use crate::stream::{ServerUrl, Stream};
use crate::yeast::yeast;

pub struct Polling {
    stream: Option<Stream>,
    cookies: Vec<String>,
    sid: Option<String>,
}

impl Polling {
    pub fn new() -> Self {
        Self {
            stream: None,
            cookies: Vec::new(),
            sid: None,
        }
    }

    /// Cookies captured from the handshake, for replay on later requests
    /// including the websocket upgrade.
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Record the session id; every subsequent request carries it.
    pub fn set_sid(&mut self, sid: String) {
        self.sid = Some(sid);
    }

    /// Handshake request: a GET without a session id. Captures cookies.
    pub async fn open(&mut self, url: &ServerUrl, config: &Config) -> Result<Vec<Packet>, Error> {
        let resp = self.request(url, config, Method::GET, None).await?;
        if resp.status != StatusCode::OK {
            return Err(Error::ServerConnectionFailure(format!(
                "handshake request returned {}",
                resp.status
            )));
        }
        for value in resp.headers.get_all(SET_COOKIE) {
            if let Ok(cookie) = value.to_str() {
                // Attributes after the first `;` are not replayed.
                let head = cookie.split(';').next().unwrap_or("").trim();
                if !head.is_empty() {
                    self.cookies.push(head.to_string());
                }
            }
        }
        self.decode_body(&resp, config)
    }

    /// One GET poll on the open session.
    pub async fn poll(&mut self, url: &ServerUrl, config: &Config) -> Result<Vec<Packet>, Error> {
        let resp = self.request(url, config, Method::GET, None).await?;
        if resp.status != StatusCode::OK {
            return Err(Error::ServerConnectionFailure(format!(
                "polling request returned {}",
                resp.status
            )));
        }
        self.decode_body(&resp, config)
    }

    /// POST one packet. The server acknowledges with a 200.
    pub async fn post(
        &mut self,
        url: &ServerUrl,
        config: &Config,
        packet: Packet,
    ) -> Result<(), Error> {
        let body = payload::encode(packet, config.version)?;
        let resp = self
            .request(url, config, Method::POST, Some(body.into_bytes()))
            .await?;
        if resp.status != StatusCode::OK {
            return Err(Error::ServerConnectionFailure(format!(
                "post request returned {}",
                resp.status
            )));
        }
        Ok(())
    }

    fn decode_body(&self, resp: &Response, config: &Config) -> Result<Vec<Packet>, Error> {
        let body = std::str::from_utf8(&resp.body).map_err(|_| Error::InvalidUtf8)?;
        payload::decode(body, config.version)
    }

    async fn request(
        &mut self,
        url: &ServerUrl,
        config: &Config,
        method: Method,
        body: Option<Vec<u8>>,
    ) -> Result<Response, Error> {
        let mut stream = match self.stream.take() {
            Some(stream) if config.persistent => stream,
            _ => Stream::connect(url, config).await?,
        };

        let mut headers = Vec::new();
        for (name, value) in &config.headers {
            if let Ok(value) = value.to_str() {
                headers.push((name.as_str().to_string(), value.to_string()));
            }
        }
        if !self.cookies.is_empty() {
            headers.push((COOKIE.as_str().to_string(), self.cookies.join("; ")));
        }

        let req = Request {
            method,
            target: format!("{}/?{}", url.path, self.query(config)),
            host: url.authority(),
            headers,
            body,
            keep_alive: config.persistent,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!("{} {}", req.method, req.target);

        // An error mid-exchange leaves `self.stream` empty, so the broken
        // connection is never reused.
        let resp = request::exchange(&mut stream, &req, false, config.timeout).await?;

        let server_closes = resp
            .headers
            .get(CONNECTION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);
        if config.persistent && !server_closes {
            self.stream = Some(stream);
        }
        Ok(resp)
    }

    fn query(&self, config: &Config) -> String {
        let mut query = format!(
            "EIO={}&transport=polling&t={}",
            config.version.eio(),
            yeast()
        );
        if config.use_b64 {
            query.push_str("&b64=1");
        }
        if let Some(sid) = &self.sid {
            query.push_str("&sid=");
            query.push_str(sid);
        }
        query
    }
}

impl Default for Polling {
    fn default() -> Self {
        Self::new()
    }
}
