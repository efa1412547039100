//! Directory-protocol client seam.
//!
//! The authenticator only ever talks to a [`DirectoryConnector`] and the
//! [`DirectorySession`]s it opens. [`LdapConnector`] is the production
//! implementation on top of `ldap3`.

use crate::auth::AttributeSet;
use crate::error::BackendError;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub mod ldap;

pub use ldap::LdapConnector;

pub const LDAP_PORT: u16 = 389;
pub const LDAPS_PORT: u16 = 636;

/// Only protocol version negotiated with directory servers.
pub const PROTOCOL_VERSION: u8 = 3;

/// Opens sessions with directory servers.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Check that `host` accepts transport connections within `timeout`.
    async fn probe(&self, host: &HostAddress, timeout: Duration) -> Result<(), BackendError>;

    /// Open a protocol session with `host`.
    async fn connect(
        &self,
        host: &HostAddress,
        timeouts: &Timeouts,
    ) -> Result<Box<dyn DirectorySession>, BackendError>;
}

/// A live session with one directory server.
#[async_trait]
pub trait DirectorySession: Send {
    fn set_protocol_version(&mut self, version: u8) -> Result<(), BackendError>;

    /// Returns `Ok(false)` when the server rejects the credentials and
    /// `Err` when the session itself failed.
    async fn bind(&mut self, dn: &str, secret: &str) -> Result<bool, BackendError>;

    /// Subtree search under `base`. Passing `["*"]` as `attrs` requests
    /// every user attribute. A non-success result code yields no entries.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, BackendError>;

    async fn unbind(&mut self);
}

/// One entry returned by a search, reduced to its textual attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: AttributeSet,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: AttributeSet::new(),
        }
    }

    pub fn with_attr<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

/// Time limits applied while talking to a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on each reachability probe.
    pub probe: Duration,
    /// Bound on the protocol connect and on every bind and search.
    /// `None` leaves them to the transport defaults.
    pub operation: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(5),
            operation: Some(Duration::from_secs(30)),
        }
    }
}

/// Address of a directory server.
///
/// Accepts `host`, `host:port`, `ldap://host[:port]` and
/// `ldaps://host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    host: String,
    port: u16,
    secure: bool,
}

impl HostAddress {
    pub fn parse(address: &str) -> Result<Self, BackendError> {
        let invalid = |reason: &str| BackendError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty address"));
        }

        let url = if trimmed.contains("://") {
            Url::parse(trimmed)
        } else {
            Url::parse(&format!("ldap://{}", trimmed))
        }
        .map_err(|e| invalid(&e.to_string()))?;

        let secure = match url.scheme() {
            "ldap" => false,
            "ldaps" => true,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(invalid("missing host")),
        };

        if !matches!(url.path(), "" | "/") || url.query().is_some() {
            return Err(invalid("unexpected path or query"));
        }

        let port = url
            .port()
            .unwrap_or(if secure { LDAPS_PORT } else { LDAP_PORT });

        Ok(Self { host, port, secure })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// `host:port` form used for the transport probe.
    pub fn socket_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        let scheme = if self.secure { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl FromStr for HostAddress {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
