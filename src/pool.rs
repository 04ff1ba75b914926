//! Reuse of authenticated remote clients keyed by credential identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::error::RemoteError;
use crate::remote::{Connector, Credentials};

/// Default soft limit before expired entries are swept.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default client lifetime after last use (15 minutes).
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(900);

struct PooledConnection<T> {
    client: Arc<T>,
    expires_at: Instant,
}

/// Keyed pool of authenticated clients.
///
/// Capacity is a prune trigger, not a cap: once the table grows past
/// `max_size`, every expired entry is dropped, but live entries stay and the
/// table may remain above the limit until they expire.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    clients: DashMap<String, PooledConnection<C::Client>>,
    max_size: usize,
    timeout: Duration,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, max_size: usize, timeout: Duration) -> Self {
        Self {
            connector,
            clients: DashMap::new(),
            max_size,
            timeout,
        }
    }

    /// Return the live client for these credentials, opening one if needed.
    ///
    /// A hit pushes the entry's expiry to `now + timeout`.
    ///
    /// # Errors
    ///
    /// Returns the connector's error when a new client cannot be opened.
    pub fn connect(&self, credentials: &Credentials) -> Result<Arc<C::Client>, RemoteError> {
        let key = connection_key(credentials);
        let now = Instant::now();

        if let Some(mut entry) = self.clients.get_mut(&key) {
            if entry.expires_at > now {
                entry.expires_at = now + self.timeout;
                tracing::debug!(server = %credentials.server, "reusing pooled client");
                return Ok(Arc::clone(&entry.client));
            }
        }

        tracing::debug!(server = %credentials.server, user = credentials.user(), "opening client");
        let client = Arc::new(self.connector.connect(credentials)?);
        self.clients.insert(
            key,
            PooledConnection {
                client: Arc::clone(&client),
                expires_at: now + self.timeout,
            },
        );
        self.prune(now);
        Ok(client)
    }

    fn prune(&self, now: Instant) {
        if self.clients.len() <= self.max_size {
            return;
        }
        let before = self.clients.len();
        self.clients.retain(|_, entry| entry.expires_at > now);
        let remaining = self.clients.len();
        // Other threads may insert between the two reads.
        let removed = before.saturating_sub(remaining);
        tracing::debug!(removed, remaining, "pruned expired clients");
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, credentials: &Credentials) -> bool {
        self.clients.contains_key(&connection_key(credentials))
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

/// Deterministic identity of a credential set.
///
/// Components are hashed in fixed order (server, database, user, password);
/// empty or absent components are skipped.
pub fn connection_key(credentials: &Credentials) -> String {
    let components = [
        Some(credentials.server.as_str()),
        credentials.database.as_deref(),
        credentials.user.as_deref(),
        credentials.password.as_deref(),
    ];
    let mut hasher = Sha256::new();
    for part in components.into_iter().flatten().filter(|p| !p.is_empty()) {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
