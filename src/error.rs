use thiserror::Error;

/// Outcome of a failed authentication attempt.
///
/// The two variants let callers tell an unusable directory (alert an
/// operator) apart from a rejected credential (reject the login).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Failed(#[from] AuthFailure),
}

impl AuthError {
    pub fn is_backend_error(&self) -> bool {
        matches!(self, AuthError::Backend(_))
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AuthError::Failed(_))
    }
}

/// The directory answered, but refused the identity or the secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("failed to bind")]
    BindRejected,
    /// The user search matched zero entries or more than one.
    #[error("failed to find user")]
    UserNotFound,
    #[error("found user, but failed to bind")]
    UserBindRejected,
}

/// The directory could not be used at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("failed to connect to backend (tried: {})", .hosts.join(", "))]
    NoReachableHost { hosts: Vec<String> },
    #[error("{host} is unreachable: {reason}")]
    Unreachable { host: String, reason: String },
    #[error("failed to open directory session with {host}: {reason}")]
    Connect { host: String, reason: String },
    #[error("directory {operation} failed: {reason}")]
    Session { operation: &'static str, reason: String },
    #[error("unsupported directory protocol version {0}")]
    UnsupportedProtocolVersion(u8),
    #[error("invalid directory address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages() {
        assert_eq!(AuthFailure::BindRejected.to_string(), "failed to bind");
        assert_eq!(AuthFailure::UserNotFound.to_string(), "failed to find user");
        assert_eq!(
            AuthError::from(AuthFailure::UserBindRejected).to_string(),
            "found user, but failed to bind"
        );
    }

    #[test]
    fn no_reachable_host_lists_tried_hosts() {
        let err = AuthError::from(BackendError::NoReachableHost {
            hosts: vec!["ldap://ldap1:389".to_string(), "ldap://ldap2:389".to_string()],
        });
        assert!(err.is_backend_error());
        assert!(!err.is_auth_failure());
        assert_eq!(
            err.to_string(),
            "failed to connect to backend (tried: ldap://ldap1:389, ldap://ldap2:389)"
        );
    }
}
