//! Wire constants for both handshakes

// SOCKS5 Protocol Version
pub const SOCKS5_VERSION: u8 = 0x05;

// SOCKS5 Commands
pub const SOCKS5_CMD_CONNECT: u8 = 0x01;

// Address Types
pub const SOCKS5_ADDR_IPV4: u8 = 0x01;
pub const SOCKS5_ADDR_DOMAIN: u8 = 0x03;

// Authentication Methods
pub const SOCKS5_AUTH_NONE: u8 = 0x00;

// Response Codes
pub const SOCKS5_REPLY_SUCCESS: u8 = 0x00;

// Reserved field value
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Length of the IPv4-form success reply
pub const SOCKS5_SUCCESS_REPLY_LEN: usize = 10;

// HTTP proxy replies
pub const HTTP_CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";
pub const HTTP_BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";
pub const HTTP_BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";

/// End-of-headers marker
pub const HTTP_HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

pub const HTTP_DEFAULT_PORT: u16 = 80;
/// Starting size of the header table; it grows for larger heads
pub const HTTP_INITIAL_HEADERS: usize = 64;
pub const HTTP_SCHEME_PREFIX: &str = "http://";
