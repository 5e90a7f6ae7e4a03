//! Outbound dialing

use anyhow::anyhow;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::protocol::{Target, TargetAddr};
use crate::Result;

/// Opens TCP connections to requested targets
#[derive(Debug, Clone)]
pub struct TargetConnector {
    connect_timeout: Duration,
}

impl TargetConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Resolve and connect, trying each resolved address in order.
    /// The whole dial is bounded by the connect timeout.
    pub async fn connect(&self, target: &Target) -> Result<(TcpStream, SocketAddr)> {
        match timeout(self.connect_timeout, self.connect_inner(target)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "Connection to {} timed out after {:?}",
                target,
                self.connect_timeout
            )),
        }
    }

    async fn connect_inner(&self, target: &Target) -> Result<(TcpStream, SocketAddr)> {
        let socket_addrs = Self::resolve(target).await?;

        let mut last_error = None;
        for addr in socket_addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    debug!(target_addr = %target, resolved = %addr, "Connected to target");
                    return Ok((stream, addr));
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(anyhow!("Failed to connect to target {}: {}", target, e)),
            None => Err(anyhow!("Failed to connect to target {}: no addresses resolved", target)),
        }
    }

    async fn resolve(target: &Target) -> Result<Vec<SocketAddr>> {
        match &target.addr {
            TargetAddr::Ipv4(ip) => Ok(vec![SocketAddr::new(IpAddr::V4(*ip), target.port)]),
            TargetAddr::Ipv6(ip) => Ok(vec![SocketAddr::new(IpAddr::V6(*ip), target.port)]),
            TargetAddr::Domain(domain) => {
                let addrs: Vec<SocketAddr> = lookup_host((domain.as_str(), target.port))
                    .await
                    .map_err(|e| anyhow!("DNS resolution failed for {}: {}", domain, e))?
                    .collect();
                if addrs.is_empty() {
                    return Err(anyhow!("DNS resolution returned no addresses for {}", domain));
                }
                debug!("Resolved {} to {} addresses", domain, addrs.len());
                Ok(addrs)
            }
        }
    }
}
