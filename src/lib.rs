pub mod auth;
pub mod backend;
pub mod config;
pub mod error;

pub use auth::{AttributeSet, Authenticator, BindConfiguration, Credential, DirectoryAuthenticator};
pub use backend::{DirectoryConnector, DirectoryEntry, DirectorySession, HostAddress, LdapConnector, Timeouts};
pub use config::Config;
pub use error::{AuthError, AuthFailure, BackendError};
