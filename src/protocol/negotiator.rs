//! Protocol negotiation
//!
//! Turns a freshly accepted client stream into an established pair of
//! client and target streams, or decides the connection should be closed.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::http::{HttpHandler, HttpRoute};
use super::socks5::Socks5Handler;
use super::{Socks5Request, Target};
use crate::config::ProxyKind;
use crate::connection::ConnectionRecord;
use crate::protocol::constants::*;
use crate::relay::TargetConnector;
use crate::Result;

/// A client that finished its handshake and has a live target
#[derive(Debug)]
pub struct Negotiated<S> {
    pub client: S,
    pub target_stream: TcpStream,
    pub target: Target,
    /// Bytes that must reach the target before relaying starts
    pub pending: Bytes,
}

/// Result of a negotiation
#[derive(Debug)]
pub enum Negotiation<S> {
    Established(Negotiated<S>),
    /// The client got whatever reply it is owed; close without relaying
    Closed,
}

/// Runs the configured proxy handshake
#[derive(Debug, Clone)]
pub struct Negotiator {
    kind: ProxyKind,
    connector: TargetConnector,
    max_header_size: usize,
    socks_bind_port: u16,
}

impl Negotiator {
    pub fn new(
        kind: ProxyKind,
        connector: TargetConnector,
        max_header_size: usize,
        socks_bind_port: u16,
    ) -> Self {
        Self {
            kind,
            connector,
            max_header_size,
            socks_bind_port,
        }
    }

    /// Negotiate with the client. On success the record's target is set.
    pub async fn negotiate<S>(&self, stream: S, record: &ConnectionRecord) -> Result<Negotiation<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.kind {
            ProxyKind::Http => self.negotiate_http(stream, record).await,
            ProxyKind::Socks5 => self.negotiate_socks5(stream, record).await,
        }
    }

    async fn negotiate_http<S>(&self, stream: S, record: &ConnectionRecord) -> Result<Negotiation<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut handler = HttpHandler::new(stream, self.max_header_size);
        let request = handler.read_request().await?;

        debug!(method = %request.method, uri = %request.uri, "HTTP request head received");

        let route = match request.route() {
            Ok(route) => route,
            Err(e) => {
                warn!("Rejecting HTTP request: {:#}", e);
                handler.reply(HTTP_BAD_REQUEST).await?;
                return Ok(Negotiation::Closed);
            }
        };

        let (target, pending, tunnel) = match route {
            HttpRoute::Tunnel(target) => (target, request.trailing(), true),
            HttpRoute::Forward { target, path } => (target, request.rewrite(&path), false),
            HttpRoute::MissingHost => {
                warn!(uri = %request.uri, "Relative HTTP request without Host header");
                handler.reply(HTTP_BAD_REQUEST).await?;
                return Ok(Negotiation::Closed);
            }
        };

        let (target_stream, resolved) = match self.connector.connect(&target).await {
            Ok(connected) => connected,
            Err(e) => {
                // The client is told before the failure is reported upward.
                if let Err(reply_err) = handler.reply(HTTP_BAD_GATEWAY).await {
                    debug!(phase = "negotiation", "Could not deliver 502 reply: {:#}", reply_err);
                }
                return Err(e);
            }
        };

        if tunnel {
            handler.reply(HTTP_CONNECT_ESTABLISHED).await?;
        }

        record.set_target(target.to_string());
        info!(target_addr = %target, resolved = %resolved, tunnel, "HTTP connection established");

        Ok(Negotiation::Established(Negotiated {
            client: handler.into_stream(),
            target_stream,
            target,
            pending,
        }))
    }

    async fn negotiate_socks5<S>(&self, stream: S, record: &ConnectionRecord) -> Result<Negotiation<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut handler = Socks5Handler::new(stream);
        handler.handle_handshake().await?;

        let target = match handler.handle_request().await? {
            Socks5Request::Connect(target) => target,
            Socks5Request::UnsupportedCommand(cmd) => {
                warn!("Unsupported SOCKS5 command 0x{:02x}, closing", cmd);
                return Ok(Negotiation::Closed);
            }
            Socks5Request::UnsupportedAddressType(atyp) => {
                warn!("Unsupported SOCKS5 address type 0x{:02x}, closing", atyp);
                return Ok(Negotiation::Closed);
            }
        };

        // A failed dial closes the client without a failure reply.
        let (target_stream, resolved) = self.connector.connect(&target).await?;

        handler.send_success(self.socks_bind_port).await?;

        record.set_target(target.to_string());
        info!(target_addr = %target, resolved = %resolved, "SOCKS5 connection established");

        Ok(Negotiation::Established(Negotiated {
            client: handler.into_stream(),
            target_stream,
            target,
            pending: Bytes::new(),
        }))
    }
}
