//! SOCKS5 Protocol Handler
//!
//! Server side of the RFC 1928 subset this proxy speaks: no authentication,
//! CONNECT only, IPv4 and domain-name targets only. Every frame is read with
//! `read_exact`, so a client that trickles a frame across several segments is
//! handled, and one that closes mid-frame is reported as a protocol error.

use anyhow::{anyhow, bail};
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{socks5_success_reply, Socks5Request, Target, TargetAddr};
use crate::protocol::constants::*;
use crate::Result;

/// SOCKS5 protocol handler for client connections
pub struct Socks5Handler<S> {
    stream: S,
}

impl<S> Socks5Handler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new SOCKS5 handler for the given stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read the greeting and always select "no authentication"
    pub async fn handle_handshake(&mut self) -> Result<()> {
        let mut header = [0u8; 2];
        self.stream.read_exact(&mut header).await
            .map_err(|e| anyhow!("Failed to read greeting header: {}", e))?;

        let version = header[0];
        let n_methods = header[1] as usize;

        if version != SOCKS5_VERSION {
            bail!("Unsupported SOCKS version: {}", version);
        }

        // The offered methods are read off the wire and ignored.
        let mut methods = vec![0u8; n_methods];
        self.stream.read_exact(&mut methods).await
            .map_err(|e| anyhow!("Failed to read auth methods: {}", e))?;

        self.stream.write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_NONE]).await
            .map_err(|e| anyhow!("Failed to send auth method response: {}", e))?;

        Ok(())
    }

    /// Read the request. Unsupported commands are reported before the address
    /// is read; unsupported address types before the port is read.
    pub async fn handle_request(&mut self) -> Result<Socks5Request> {
        // VER CMD RSV ATYP
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await
            .map_err(|e| anyhow!("Failed to read request header: {}", e))?;

        let version = header[0];
        let command = header[1];
        let address_type = header[3];

        if version != SOCKS5_VERSION {
            bail!("Invalid SOCKS version in request: {}", version);
        }

        if command != SOCKS5_CMD_CONNECT {
            return Ok(Socks5Request::UnsupportedCommand(command));
        }

        let addr = match address_type {
            SOCKS5_ADDR_IPV4 => {
                let mut addr_bytes = [0u8; 4];
                self.stream.read_exact(&mut addr_bytes).await
                    .map_err(|e| anyhow!("Failed to read IPv4 address: {}", e))?;
                TargetAddr::Ipv4(Ipv4Addr::from(addr_bytes))
            }
            SOCKS5_ADDR_DOMAIN => {
                let mut len_buf = [0u8; 1];
                self.stream.read_exact(&mut len_buf).await
                    .map_err(|e| anyhow!("Failed to read domain length: {}", e))?;
                let domain_len = len_buf[0] as usize;

                if domain_len == 0 {
                    bail!("Domain name length cannot be zero");
                }

                let mut domain_bytes = vec![0u8; domain_len];
                self.stream.read_exact(&mut domain_bytes).await
                    .map_err(|e| anyhow!("Failed to read domain name: {}", e))?;

                let domain = String::from_utf8(domain_bytes)
                    .map_err(|e| anyhow!("Invalid UTF-8 in domain name: {}", e))?;

                TargetAddr::Domain(domain)
            }
            other => return Ok(Socks5Request::UnsupportedAddressType(other)),
        };

        let mut port_bytes = [0u8; 2];
        self.stream.read_exact(&mut port_bytes).await
            .map_err(|e| anyhow!("Failed to read port: {}", e))?;
        let port = u16::from_be_bytes(port_bytes);

        Ok(Socks5Request::Connect(Target::new(addr, port)))
    }

    /// Send the 10-byte success reply
    pub async fn send_success(&mut self, bind_port: u16) -> Result<()> {
        self.stream.write_all(&socks5_success_reply(bind_port)).await
            .map_err(|e| anyhow!("Failed to send response: {}", e))?;
        Ok(())
    }

    /// Get the underlying stream back for relaying
    pub fn into_stream(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_handshake_selects_no_auth() {
        let mock = Builder::new()
            .read(&[0x05, 0x02, 0x00, 0x02])
            .write(&[0x05, 0x00])
            .build();

        let mut handler = Socks5Handler::new(mock);
        handler.handle_handshake().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejects_socks4() {
        let mock = Builder::new().read(&[0x04, 0x01]).build();
        let mut handler = Socks5Handler::new(mock);
        assert!(handler.handle_handshake().await.is_err());
    }

    #[tokio::test]
    async fn test_domain_connect_request() {
        let mut frame = vec![0x05, 0x01, 0x00, 0x03, 11];
        frame.extend_from_slice(b"example.com");
        frame.extend_from_slice(&443u16.to_be_bytes());

        let mock = Builder::new().read(&frame).build();
        let mut handler = Socks5Handler::new(mock);

        let request = handler.handle_request().await.unwrap();
        assert_eq!(
            request,
            Socks5Request::Connect(Target::new(TargetAddr::Domain("example.com".to_string()), 443))
        );
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let mock = Builder::new()
            .read(&[0x05, 0x01])
            .read(&[0x00, 0x01, 192, 168])
            .read(&[1, 20, 0x00])
            .read(&[0x50])
            .build();
        let mut handler = Socks5Handler::new(mock);

        let request = handler.handle_request().await.unwrap();
        assert_eq!(
            request,
            Socks5Request::Connect(Target::new(TargetAddr::Ipv4(Ipv4Addr::new(192, 168, 1, 20)), 80))
        );
    }

    #[tokio::test]
    async fn test_bind_command_is_unsupported() {
        // Nothing after the header is consumed.
        let mock = Builder::new().read(&[0x05, 0x02, 0x00, 0x01]).build();
        let mut handler = Socks5Handler::new(mock);

        let request = handler.handle_request().await.unwrap();
        assert_eq!(request, Socks5Request::UnsupportedCommand(0x02));
    }

    #[tokio::test]
    async fn test_ipv6_address_type_is_unsupported() {
        let mock = Builder::new().read(&[0x05, 0x01, 0x00, 0x04]).build();
        let mut handler = Socks5Handler::new(mock);

        let request = handler.handle_request().await.unwrap();
        assert_eq!(request, Socks5Request::UnsupportedAddressType(0x04));
    }

    #[tokio::test]
    async fn test_truncated_request_is_an_error() {
        let mock = Builder::new().read(&[0x05, 0x01, 0x00, 0x03, 20]).read(b"short").build();
        let mut handler = Socks5Handler::new(mock);
        assert!(handler.handle_request().await.is_err());
    }

    #[tokio::test]
    async fn test_success_reply_bytes() {
        let mock = Builder::new()
            .write(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0x22, 0xB8])
            .build();
        let mut handler = Socks5Handler::new(mock);
        handler.send_success(8888).await.unwrap();
    }
}
