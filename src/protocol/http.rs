//! HTTP Proxy Handler
//!
//! Reads a request head, classifies it as a CONNECT tunnel or a plain
//! forwarded request, and produces the bytes that must reach the target.

use anyhow::{anyhow, bail, Context};
use bytes::{Bytes, BytesMut};
use httparse::{Status, EMPTY_HEADER};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::{Host, Url};

use super::{Target, TargetAddr};
use crate::protocol::constants::*;
use crate::Result;

/// A parsed request head plus everything read from the client so far
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    /// Minor version: `HTTP/1.<version>`
    pub version: u8,
    pub host_header: Option<String>,
    head_len: usize,
    buffer: Bytes,
}

/// Where a request should go and what to send first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpRoute {
    /// CONNECT: reply 200 and tunnel
    Tunnel(Target),
    /// Plain request: rewrite the request line to `path` and forward
    Forward { target: Target, path: String },
    /// Relative request without a `Host` header
    MissingHost,
}

impl HttpRequest {
    /// Parse a complete request head out of `buffer`.
    /// The header table grows until every header fits.
    pub fn parse(buffer: Bytes) -> Result<Self> {
        let mut capacity = HTTP_INITIAL_HEADERS;
        loop {
            match Self::parse_with_capacity(&buffer, capacity) {
                Err(e) if is_too_many_headers(&e) && capacity < buffer.len() => capacity *= 2,
                result => return result,
            }
        }
    }

    fn parse_with_capacity(buffer: &Bytes, capacity: usize) -> Result<Self> {
        let mut headers = vec![EMPTY_HEADER; capacity];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(buffer).context("Malformed HTTP request")? {
            Status::Complete(len) => len,
            Status::Partial => bail!("Incomplete HTTP request head"),
        };

        let method = req.method.ok_or_else(|| anyhow!("Request line has no method"))?.to_string();
        let uri = req.path.ok_or_else(|| anyhow!("Request line has no target"))?.to_string();
        let version = req.version.ok_or_else(|| anyhow!("Request line has no version"))?;

        let host_header = req
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("host"))
            .map(|h| String::from_utf8_lossy(h.value).trim().to_string())
            .filter(|h| !h.is_empty());

        Ok(Self {
            method,
            uri,
            version,
            host_header,
            head_len,
            buffer: buffer.clone(),
        })
    }

    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    pub fn version_str(&self) -> &'static str {
        if self.version == 0 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        }
    }

    /// Bytes read past the head (start of a body, or early tunnel data)
    pub fn trailing(&self) -> Bytes {
        self.buffer.slice(self.head_len..)
    }

    /// Decide where the request goes
    pub fn route(&self) -> Result<HttpRoute> {
        if self.is_connect() {
            let target = Target::parse(&self.uri, None)
                .with_context(|| format!("Invalid CONNECT target '{}'", self.uri))?;
            return Ok(HttpRoute::Tunnel(target));
        }

        if self
            .uri
            .get(..HTTP_SCHEME_PREFIX.len())
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case(HTTP_SCHEME_PREFIX))
        {
            return Self::route_absolute(&self.uri);
        }

        match &self.host_header {
            Some(host) => {
                let target = Target::parse(host, Some(HTTP_DEFAULT_PORT))
                    .with_context(|| format!("Invalid Host header '{}'", host))?;
                Ok(HttpRoute::Forward {
                    target,
                    path: self.uri.clone(),
                })
            }
            None => Ok(HttpRoute::MissingHost),
        }
    }

    fn route_absolute(uri: &str) -> Result<HttpRoute> {
        let url = Url::parse(uri).with_context(|| format!("Invalid request URL '{}'", uri))?;

        let addr = match url.host() {
            Some(Host::Domain(domain)) => TargetAddr::Domain(domain.to_string()),
            Some(Host::Ipv4(ip)) => TargetAddr::Ipv4(ip),
            Some(Host::Ipv6(ip)) => TargetAddr::Ipv6(ip),
            None => bail!("Request URL has no host: {}", uri),
        };
        let port = url.port_or_known_default().unwrap_or(HTTP_DEFAULT_PORT);

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(HttpRoute::Forward {
            target: Target::new(addr, port),
            path,
        })
    }

    /// The buffered request with only the request-line target replaced.
    /// Header and body bytes, and the request line's own terminator, are
    /// forwarded untouched.
    pub fn rewrite(&self, path: &str) -> Bytes {
        let line_end = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(lf) if lf > 0 && self.buffer[lf - 1] == b'\r' => lf - 1,
            Some(lf) => lf,
            None => self.head_len,
        };

        let request_line = format!("{} {} {}", self.method, path, self.version_str());
        let mut out = BytesMut::with_capacity(request_line.len() + self.buffer.len() - line_end);
        out.extend_from_slice(request_line.as_bytes());
        out.extend_from_slice(&self.buffer[line_end..]);
        out.freeze()
    }
}

fn is_too_many_headers(err: &anyhow::Error) -> bool {
    err.downcast_ref::<httparse::Error>() == Some(&httparse::Error::TooManyHeaders)
}

/// HTTP protocol handler for client connections
pub struct HttpHandler<S> {
    stream: S,
    max_header_size: usize,
}

impl<S> HttpHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, max_header_size: usize) -> Self {
        Self {
            stream,
            max_header_size,
        }
    }

    /// Read until the end-of-headers marker and parse the head
    pub async fn read_request(&mut self) -> Result<HttpRequest> {
        let mut buf = BytesMut::with_capacity(4096);
        let mut scanned: usize = 0;

        loop {
            let from = scanned.saturating_sub(HTTP_HEAD_TERMINATOR.len() - 1);
            if buf[from..]
                .windows(HTTP_HEAD_TERMINATOR.len())
                .any(|w| w == HTTP_HEAD_TERMINATOR)
            {
                break;
            }
            scanned = buf.len();

            if buf.len() >= self.max_header_size {
                bail!("HTTP request head exceeds {} bytes", self.max_header_size);
            }

            let n = self.stream.read_buf(&mut buf).await
                .context("Failed to read HTTP request head")?;
            if n == 0 {
                bail!("Client closed before end of request headers");
            }
        }

        HttpRequest::parse(buf.freeze())
    }

    /// Write one of the fixed status replies
    pub async fn reply(&mut self, response: &[u8]) -> Result<()> {
        self.stream.write_all(response).await
            .context("Failed to send HTTP reply")?;
        Ok(())
    }

    pub fn into_stream(self) -> S {
        self.stream
    }
}
