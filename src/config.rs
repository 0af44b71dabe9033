//! Client configuration.
//!
//! A [`ClientConfig`] names one HandlerSocket listener and the transport
//! settings used to reach it. HandlerSocket exposes separate read and write
//! listeners (ports 9998 and 9999 by default); a client talks to exactly one of
//! them, so code that both reads and writes holds two clients.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use handlersocket::ClientConfig;
//!
//! let config = ClientConfig::new("127.0.0.1", 9999)
//!     .timeout(Duration::from_secs(5))
//!     .nodelay(true);
//!
//! assert_eq!(config.address(), "127.0.0.1:9999");
//! ```
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_READ_PORT: u16 = 9998;
pub const DEFAULT_WRITE_PORT: u16 = 9999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Applies to establishing the TCP connection; `None` blocks.
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub nodelay: bool,
    /// Longest response line accepted before the connection is failed.
    pub max_line_length: usize,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets connect, read and write timeouts at once.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self.read_timeout = Some(timeout);
        self.write_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// `host:port`, with IPv6 literals in brackets.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_READ_PORT,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            nodelay: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}
