use super::{DirectoryConnector, DirectoryEntry, DirectorySession, HostAddress, Timeouts, PROTOCOL_VERSION};
use crate::error::BackendError;
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchResult};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Connects to LDAP servers through `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn probe(&self, host: &HostAddress, limit: Duration) -> Result<(), BackendError> {
        let target = host.socket_target();
        trace!("Probing {} (timeout {:?})", target, limit);

        match timeout(limit, TcpStream::connect(target.as_str())).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(BackendError::Unreachable {
                host: host.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BackendError::Unreachable {
                host: host.to_string(),
                reason: format!("no answer within {:?}", limit),
            }),
        }
    }

    async fn connect(
        &self,
        host: &HostAddress,
        timeouts: &Timeouts,
    ) -> Result<Box<dyn DirectorySession>, BackendError> {
        let mut settings = LdapConnSettings::new();
        if let Some(limit) = timeouts.operation {
            settings = settings.set_conn_timeout(limit);
        }

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &host.url())
            .await
            .map_err(|e| BackendError::Connect {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        ldap3::drive!(conn);
        debug!("Opened LDAP session with {}", host);

        Ok(Box::new(LdapSession {
            ldap,
            operation_timeout: timeouts.operation,
        }))
    }
}

struct LdapSession {
    ldap: Ldap,
    operation_timeout: Option<Duration>,
}

impl LdapSession {
    // ldap3 timeouts apply to the next operation only
    fn arm_timeout(&mut self) {
        if let Some(limit) = self.operation_timeout {
            self.ldap.with_timeout(limit);
        }
    }
}

fn session_error(operation: &'static str) -> impl FnOnce(ldap3::LdapError) -> BackendError {
    move |e| BackendError::Session {
        operation,
        reason: e.to_string(),
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    fn set_protocol_version(&mut self, version: u8) -> Result<(), BackendError> {
        // ldap3 only speaks LDAPv3
        if version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(BackendError::UnsupportedProtocolVersion(version))
        }
    }

    async fn bind(&mut self, dn: &str, secret: &str) -> Result<bool, BackendError> {
        self.arm_timeout();
        let res = self
            .ldap
            .simple_bind(dn, secret)
            .await
            .map_err(session_error("bind"))?;

        if res.rc != 0 {
            debug!("LDAP bind for {} returned rc={} ({})", dn, res.rc, res.text);
        }
        Ok(res.rc == 0)
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, BackendError> {
        self.arm_timeout();
        let SearchResult(rs, res) = self
            .ldap
            .search(base, Scope::Subtree, filter, attrs)
            .await
            .map_err(session_error("search"))?;

        if res.rc != 0 {
            debug!("LDAP search under {} returned rc={} ({})", base, res.rc, res.text);
            return Ok(Vec::new());
        }

        Ok(rs
            .into_iter()
            .map(|re| {
                let entry = SearchEntry::construct(re);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs.into_iter().collect(),
                }
            })
            .collect())
    }

    async fn unbind(&mut self) {
        let _ = self.ldap.unbind().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authenticator, DirectoryAuthenticator};
    use crate::error::AuthError;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Accepts connections and keeps them open without ever answering.
    async fn silent_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        port
    }

    fn timeouts(operation: u64) -> Timeouts {
        Timeouts {
            probe: Duration::from_secs(1),
            operation: Some(Duration::from_secs(operation)),
        }
    }

    #[tokio::test]
    async fn reachability_follows_listener_lifetime() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let host = HostAddress::parse(&format!("127.0.0.1:{}", port)).unwrap();

        assert!(LdapConnector.probe(&host, Duration::from_secs(1)).await.is_ok());

        drop(listener);
        let err = LdapConnector.probe(&host, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, BackendError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn reachability_uses_explicit_port_of_secure_address() {
        let port = silent_server().await;
        let host = HostAddress::parse(&format!("ldaps://127.0.0.1:{}", port)).unwrap();
        assert!(host.is_secure());
        assert_eq!(host.socket_target(), format!("127.0.0.1:{}", port));

        assert!(LdapConnector.probe(&host, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn session_rejects_other_protocol_versions() {
        let port = silent_server().await;
        let host = HostAddress::parse(&format!("127.0.0.1:{}", port)).unwrap();

        let mut session = LdapConnector.connect(&host, &timeouts(1)).await.unwrap();
        assert_eq!(session.set_protocol_version(PROTOCOL_VERSION), Ok(()));
        assert_eq!(
            session.set_protocol_version(2),
            Err(BackendError::UnsupportedProtocolVersion(2))
        );
    }

    #[tokio::test]
    async fn silent_server_times_out_as_backend_error() {
        let port = silent_server().await;
        let mut auth = DirectoryAuthenticator::bind_only(
            "alice",
            "wonderland",
            [format!("127.0.0.1:{}", port)],
            "ou=People,dc=example,dc=com",
            "uid=%u,ou=People,dc=example,dc=com",
        )
        .unwrap()
        .with_timeouts(timeouts(1))
        .with_connector(Arc::new(LdapConnector));

        let started = std::time::Instant::now();
        let err = auth.authenticate().await.unwrap_err();

        assert!(err.is_backend_error());
        assert!(matches!(
            err,
            AuthError::Backend(BackendError::Session { operation: "bind", .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn nothing_listening_is_no_reachable_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut auth = DirectoryAuthenticator::search_bind(
            "bob",
            "builder",
            [format!("127.0.0.1:{}", port)],
            "dc=example,dc=com",
            "(uid=%u)",
        )
        .unwrap()
        .with_timeouts(timeouts(1));

        let err = auth.authenticate().await.unwrap_err();
        assert!(matches!(err, AuthError::Backend(BackendError::NoReachableHost { .. })));
    }
}
