//! Protocol Types

use anyhow::{anyhow, bail};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::protocol::constants::*;
use crate::Result;

/// Host part of a requested target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

impl TargetAddr {
    /// Classify a host string; IPv6 literals may carry brackets
    pub fn parse_host(host: &str) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            bail!("empty host");
        }

        let unbracketed = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        match unbracketed.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => Ok(TargetAddr::Ipv4(ip)),
            Ok(IpAddr::V6(ip)) => Ok(TargetAddr::Ipv6(ip)),
            Err(_) if unbracketed.len() != host.len() => Err(anyhow!("invalid IPv6 literal: {}", host)),
            Err(_) => Ok(TargetAddr::Domain(host.to_string())),
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(ip) => write!(f, "{}", ip),
            TargetAddr::Ipv6(ip) => write!(f, "[{}]", ip),
            TargetAddr::Domain(domain) => f.write_str(domain),
        }
    }
}

/// A dialable `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub addr: TargetAddr,
    pub port: u16,
}

impl Target {
    pub fn new(addr: TargetAddr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Parse `host:port`, falling back to `default_port` when no port is given
    pub fn parse(authority: &str, default_port: Option<u16>) -> Result<Self> {
        let authority = authority.trim();

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            // [v6]:port or [v6]
            let (v6, after) = rest
                .split_once(']')
                .ok_or_else(|| anyhow!("unterminated IPv6 literal: {}", authority))?;
            let port = match after.strip_prefix(':') {
                Some(p) => Some(p),
                None if after.is_empty() => None,
                None => bail!("unexpected characters after IPv6 literal: {}", authority),
            };
            (format!("[{}]", v6), port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host.to_string(), Some(port)),
                None => (authority.to_string(), None),
            }
        };

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| anyhow!("invalid port in '{}'", authority))?,
            None => default_port.ok_or_else(|| anyhow!("missing port in '{}'", authority))?,
        };

        Ok(Self::new(TargetAddr::parse_host(&host)?, port))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Outcome of reading a SOCKS5 request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Socks5Request {
    Connect(Target),
    UnsupportedCommand(u8),
    UnsupportedAddressType(u8),
}

/// Fixed IPv4-form success reply: `VER REP RSV ATYP 0.0.0.0 PORT`
pub fn socks5_success_reply(bind_port: u16) -> [u8; SOCKS5_SUCCESS_REPLY_LEN] {
    let port = bind_port.to_be_bytes();
    [
        SOCKS5_VERSION,
        SOCKS5_REPLY_SUCCESS,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_IPV4,
        0,
        0,
        0,
        0,
        port[0],
        port[1],
    ]
}
