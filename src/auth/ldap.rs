use super::utils::substitute;
use super::{AttributeSet, Authenticator, Credential};
use crate::backend::{DirectoryConnector, DirectorySession, HostAddress, LdapConnector, Timeouts, PROTOCOL_VERSION};
use crate::error::{AuthError, AuthFailure, BackendError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How the DN used for the bind is obtained.
///
/// Templates may contain `%u`, replaced with the identity before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindConfiguration {
    /// The DN is the substituted `bind_template`, e.g. `uid=%u,ou=People,dc=example,dc=com`.
    /// Suitable when every user lives under the same, predictable DN.
    DirectBind {
        base_dn: String,
        bind_template: String,
        attrib_filter: String,
    },
    /// The DN is discovered by searching `base_dn` with the substituted
    /// `user_filter`, e.g. `(uid=%u)`. Exactly one entry must match.
    SearchBind {
        base_dn: String,
        user_filter: String,
        attrib_filter: String,
    },
}

impl BindConfiguration {
    pub fn base_dn(&self) -> &str {
        match self {
            BindConfiguration::DirectBind { base_dn, .. } => base_dn,
            BindConfiguration::SearchBind { base_dn, .. } => base_dn,
        }
    }

    /// Filter used to fetch post-auth attributes. Empty disables the lookup.
    pub fn attrib_filter(&self) -> &str {
        match self {
            BindConfiguration::DirectBind { attrib_filter, .. } => attrib_filter,
            BindConfiguration::SearchBind { attrib_filter, .. } => attrib_filter,
        }
    }

    fn base_dn_mut(&mut self) -> &mut String {
        match self {
            BindConfiguration::DirectBind { base_dn, .. } => base_dn,
            BindConfiguration::SearchBind { base_dn, .. } => base_dn,
        }
    }

    fn attrib_filter_mut(&mut self) -> &mut String {
        match self {
            BindConfiguration::DirectBind { attrib_filter, .. } => attrib_filter,
            BindConfiguration::SearchBind { attrib_filter, .. } => attrib_filter,
        }
    }
}

/// Authenticates a credential against an LDAP directory.
///
/// Hosts are probed in order and the first reachable one is used for the
/// whole call; a failure after that point never falls back to the next
/// host. One instance serves one authentication at a time.
pub struct DirectoryAuthenticator {
    credential: Credential,
    hosts: Vec<HostAddress>,
    bind: BindConfiguration,
    timeouts: Timeouts,
    connector: Arc<dyn DirectoryConnector>,
    resolved_dn: Option<String>,
    attributes: AttributeSet,
}

impl DirectoryAuthenticator {
    pub fn new<H, S>(
        identity: impl Into<String>,
        secret: impl Into<String>,
        hosts: H,
        bind: BindConfiguration,
    ) -> Result<Self, BackendError>
    where
        H: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| HostAddress::parse(h.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            credential: Credential::new(identity, secret),
            hosts,
            bind,
            timeouts: Timeouts::default(),
            connector: Arc::new(LdapConnector),
            resolved_dn: None,
            attributes: AttributeSet::new(),
        })
    }

    /// Bind directly to `bind_template` with `%u` replaced by the identity.
    ///
    /// No attributes are fetched unless a filter is added with
    /// [`with_attrib_filter`](Self::with_attrib_filter).
    pub fn bind_only<H, S>(
        identity: impl Into<String>,
        secret: impl Into<String>,
        hosts: H,
        base_dn: impl Into<String>,
        bind_template: impl Into<String>,
    ) -> Result<Self, BackendError>
    where
        H: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            identity,
            secret,
            hosts,
            BindConfiguration::DirectBind {
                base_dn: base_dn.into(),
                bind_template: bind_template.into(),
                attrib_filter: String::new(),
            },
        )
    }

    /// Search `base_dn` for the user with `user_filter`, then bind to the DN found.
    ///
    /// The attribute filter starts empty, as with [`bind_only`](Self::bind_only).
    pub fn search_bind<H, S>(
        identity: impl Into<String>,
        secret: impl Into<String>,
        hosts: H,
        base_dn: impl Into<String>,
        user_filter: impl Into<String>,
    ) -> Result<Self, BackendError>
    where
        H: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            identity,
            secret,
            hosts,
            BindConfiguration::SearchBind {
                base_dn: base_dn.into(),
                user_filter: user_filter.into(),
                attrib_filter: String::new(),
            },
        )
    }

    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        *self.bind.base_dn_mut() = base_dn.into();
        self
    }

    /// Switch to direct binding with `bind_template`.
    pub fn with_bind_template(mut self, bind_template: impl Into<String>) -> Self {
        self.bind = BindConfiguration::DirectBind {
            base_dn: self.bind.base_dn().to_string(),
            bind_template: bind_template.into(),
            attrib_filter: self.bind.attrib_filter().to_string(),
        };
        self
    }

    /// Switch to search-then-bind with `user_filter`.
    pub fn with_user_filter(mut self, user_filter: impl Into<String>) -> Self {
        self.bind = BindConfiguration::SearchBind {
            base_dn: self.bind.base_dn().to_string(),
            user_filter: user_filter.into(),
            attrib_filter: self.bind.attrib_filter().to_string(),
        };
        self
    }

    pub fn with_attrib_filter(mut self, attrib_filter: impl Into<String>) -> Self {
        *self.bind.attrib_filter_mut() = attrib_filter.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn DirectoryConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn credential_mut(&mut self) -> &mut Credential {
        &mut self.credential
    }

    pub fn bind_configuration(&self) -> &BindConfiguration {
        &self.bind
    }

    pub fn hosts(&self) -> &[HostAddress] {
        &self.hosts
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// DN bound by the last successful `authenticate`.
    pub fn resolved_dn(&self) -> Option<&str> {
        self.resolved_dn.as_deref()
    }

    async fn open_session(&self) -> Result<Box<dyn DirectorySession>, BackendError> {
        for host in &self.hosts {
            match self.connector.probe(host, self.timeouts.probe).await {
                Ok(()) => {
                    debug!("Directory server {} is reachable", host);
                    return self.connector.connect(host, &self.timeouts).await;
                }
                Err(e) => warn!("Skipping directory server: {}", e),
            }
        }

        error!("None of the {} configured directory servers is reachable", self.hosts.len());
        Err(BackendError::NoReachableHost {
            hosts: self.hosts.iter().map(ToString::to_string).collect(),
        })
    }

    async fn run(&self, session: &mut dyn DirectorySession) -> Result<(String, AttributeSet), AuthError> {
        session.set_protocol_version(PROTOCOL_VERSION)?;

        let dn = self.resolve_and_bind(session).await?;
        debug!("Bound to directory as {}", dn);

        let attributes = self.fetch_attributes(session, &dn).await;
        Ok((dn, attributes))
    }

    async fn resolve_and_bind(&self, session: &mut dyn DirectorySession) -> Result<String, AuthError> {
        let identity = self.credential.identity();

        match &self.bind {
            BindConfiguration::DirectBind { bind_template, .. } => {
                let dn = substitute(bind_template, identity);
                if !self.try_bind(session, &dn).await? {
                    return Err(AuthFailure::BindRejected.into());
                }
                Ok(dn)
            }
            BindConfiguration::SearchBind { base_dn, user_filter, .. } => {
                let filter = substitute(user_filter, identity);
                let mut entries = session.search(base_dn, &filter, &["dn"]).await?;

                if entries.len() != 1 {
                    debug!(
                        "User search {} under {} matched {} entries",
                        filter,
                        base_dn,
                        entries.len()
                    );
                    return Err(AuthFailure::UserNotFound.into());
                }
                let Some(entry) = entries.pop() else {
                    return Err(AuthFailure::UserNotFound.into());
                };

                debug!("Found user DN: {}", entry.dn);
                if !self.try_bind(session, &entry.dn).await? {
                    return Err(AuthFailure::UserBindRejected.into());
                }
                Ok(entry.dn)
            }
        }
    }

    async fn try_bind(&self, session: &mut dyn DirectorySession, dn: &str) -> Result<bool, BackendError> {
        // An empty password is an unauthenticated bind, which servers accept.
        if self.credential.secret().is_empty() {
            debug!("Refusing to bind {} with an empty password", dn);
            return Ok(false);
        }
        session.bind(dn, self.credential.secret()).await
    }

    async fn fetch_attributes(&self, session: &mut dyn DirectorySession, dn: &str) -> AttributeSet {
        let template = self.bind.attrib_filter();
        if template.is_empty() {
            return AttributeSet::new();
        }

        let filter = substitute(template, self.credential.identity());
        match session.search(dn, &filter, &["*"]).await {
            Ok(entries) => match entries.into_iter().next() {
                Some(entry) => {
                    debug!("Fetched {} attributes for {}", entry.attrs.len(), dn);
                    entry.attrs
                }
                None => {
                    debug!("Attribute search {} under {} returned nothing", filter, dn);
                    AttributeSet::new()
                }
            },
            Err(e) => {
                warn!("Attribute lookup for {} failed: {}", dn, e);
                AttributeSet::new()
            }
        }
    }
}

#[async_trait]
impl Authenticator for DirectoryAuthenticator {
    async fn authenticate(&mut self) -> Result<(), AuthError> {
        self.resolved_dn = None;
        self.attributes.clear();

        let mut session = self.open_session().await?;
        let outcome = self.run(session.as_mut()).await;
        session.unbind().await;

        match outcome {
            Ok((dn, attributes)) => {
                info!("Authenticated {}", self.credential.identity());
                self.resolved_dn = Some(dn);
                self.attributes = attributes;
                Ok(())
            }
            Err(e) => {
                debug!("Authentication of {} failed: {}", self.credential.identity(), e);
                Err(e)
            }
        }
    }

    fn post_auth_attributes(&self) -> &AttributeSet {
        &self.attributes
    }
}

impl fmt::Debug for DirectoryAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryAuthenticator")
            .field("credential", &self.credential)
            .field("hosts", &self.hosts)
            .field("bind", &self.bind)
            .field("timeouts", &self.timeouts)
            .field("resolved_dn", &self.resolved_dn)
            .finish()
    }
}
