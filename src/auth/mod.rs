use crate::error::AuthError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

pub mod ldap;
pub mod utils;

pub use ldap::{BindConfiguration, DirectoryAuthenticator};

/// Attribute name to its values, in the order the directory returned them.
pub type AttributeSet = BTreeMap<String, Vec<String>>;

/// Identity and secret presented for authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    identity: String,
    secret: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn set_identity(&mut self, identity: impl Into<String>) {
        self.identity = identity.into();
    }

    pub fn set_secret(&mut self, secret: impl Into<String>) {
        self.secret = secret.into();
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate the held credential.
    /// Returns Ok(()) on success; every failure, including a rejected
    /// credential, comes back as an `AuthError`.
    async fn authenticate(&mut self) -> Result<(), AuthError>;

    /// Attributes discovered by the last successful `authenticate`.
    /// Empty if none were requested or found.
    fn post_auth_attributes(&self) -> &AttributeSet;

    /// Authenticate, then run `on_success` with the authenticated instance.
    async fn authenticate_then<F, T>(&mut self, on_success: F) -> Result<T, AuthError>
    where
        Self: Sized,
        F: FnOnce(&Self) -> T + Send,
        T: Send,
    {
        self.authenticate().await?;
        Ok(on_success(&*self))
    }
}
