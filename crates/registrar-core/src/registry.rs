//! Address-of-record bindings
//!
//! A [`Registry`] maps the logical URI of a user to the physical contact it
//! registered; a [`Locator`] answers where a user can currently be reached.
//! [`InMemoryRegistry`] serves both for a single domain. Bindings expire on
//! the tokio clock and are purged lazily, when they are next looked at.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sipwire_sip_core::Uri;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{RegistrarError, Result};

/// A binding as reported back to the client
#[derive(Debug, Clone)]
pub struct Registration {
    /// Seconds until the binding lapses; 0 for a removed binding
    pub seconds_to_expiry: u32,
    /// The bound contact
    pub contact: Uri,
}

/// Stores logical to physical URI bindings
#[async_trait]
pub trait Registry: Send + Sync {
    /// Binds `physical` to `logical` for `expires` seconds. `domain` is the
    /// Request-URI of the REGISTER.
    async fn register_address(
        &self,
        domain: &Uri,
        logical: &Uri,
        physical: Uri,
        expires: u32,
    ) -> Result<Registration>;

    /// Removes the binding of `logical`
    async fn unregister_address(&self, domain: &Uri, logical: &Uri) -> Result<Registration>;

    /// Current binding of `logical`
    async fn registration_info(&self, logical: &Uri) -> Result<Registration>;
}

/// Resolves a logical URI to where the user can be reached
#[async_trait]
pub trait Locator: Send + Sync {
    /// Physical URI bound to `logical`
    async fn address(&self, logical: &Uri) -> Result<Uri>;
}

#[derive(Debug, Clone)]
struct Binding {
    contact: Uri,
    expires_at: Instant,
}

impl Binding {
    fn seconds_left(&self, now: Instant) -> u32 {
        let left = self.expires_at.saturating_duration_since(now).as_secs();
        u32::try_from(left).unwrap_or(u32::MAX)
    }
}

/// Registry for one domain, held in memory
#[derive(Debug)]
pub struct InMemoryRegistry {
    domain: String,
    users: DashMap<String, Binding>,
}

impl InMemoryRegistry {
    /// Empty registry for `domain`
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            users: DashMap::new(),
        }
    }

    /// Domain served
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Number of bindings held, lapsed ones included until purged
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no bindings are held
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drops every lapsed binding and returns how many went
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.users.len();
        self.users.retain(|_, binding| binding.expires_at > now);
        before - self.users.len()
    }

    fn check_domain(&self, uri: &Uri) -> Result<()> {
        if uri.host.eq_ignore_ascii_case(&self.domain) {
            Ok(())
        } else {
            Err(RegistrarError::UnknownDomain(uri.host.clone()))
        }
    }

    fn live_binding(&self, logical: &Uri) -> Result<Binding> {
        self.check_domain(logical)?;
        let user = user_key(logical);
        let now = Instant::now();
        let binding = self
            .users
            .get(&user)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistrarError::NoSuchUser(logical.to_string()))?;
        if binding.expires_at <= now {
            self.users.remove_if(&user, |_, binding| binding.expires_at <= now);
            debug!(%user, "registration expired");
            return Err(RegistrarError::NoSuchUser(logical.to_string()));
        }
        Ok(binding)
    }
}

fn user_key(uri: &Uri) -> String {
    uri.user.clone().unwrap_or_default()
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register_address(
        &self,
        domain: &Uri,
        logical: &Uri,
        physical: Uri,
        expires: u32,
    ) -> Result<Registration> {
        self.check_domain(domain)?;
        self.check_domain(logical)?;
        let now = Instant::now();
        let binding = Binding {
            contact: physical,
            expires_at: now + Duration::from_secs(u64::from(expires)),
        };
        info!(user = %logical, contact = %binding.contact, expires, "registered");
        let registration = Registration {
            seconds_to_expiry: binding.seconds_left(now),
            contact: binding.contact.clone(),
        };
        self.users.insert(user_key(logical), binding);
        Ok(registration)
    }

    async fn unregister_address(&self, domain: &Uri, logical: &Uri) -> Result<Registration> {
        self.check_domain(domain)?;
        self.check_domain(logical)?;
        let (_, binding) = self
            .users
            .remove(&user_key(logical))
            .ok_or_else(|| RegistrarError::NoSuchUser(logical.to_string()))?;
        info!(user = %logical, contact = %binding.contact, "unregistered");
        Ok(Registration {
            seconds_to_expiry: 0,
            contact: binding.contact,
        })
    }

    async fn registration_info(&self, logical: &Uri) -> Result<Registration> {
        let binding = self.live_binding(logical)?;
        Ok(Registration {
            seconds_to_expiry: binding.seconds_left(Instant::now()),
            contact: binding.contact,
        })
    }
}

#[async_trait]
impl Locator for InMemoryRegistry {
    async fn address(&self, logical: &Uri) -> Result<Uri> {
        Ok(self.live_binding(logical)?.contact)
    }
}
