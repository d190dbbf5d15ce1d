//! Routing directory: turns an alias or fingerprint into a reachable address.

use crate::config::{ConfigError, RouteConfig};
use crate::error::RoutingError;
use async_trait::async_trait;
use courier_types::{Address, PublicKeys};
use dashmap::DashMap;

/// What the caller intends to do with the looked-up address.
///
/// The node only resolves return addresses, which carry no preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum LookupType {
    /// No preference.
    #[default]
    Default,
}

/// Directory service consulted when a sender cannot be reached directly.
#[async_trait]
pub trait Router: Send + Sync {
    /// Look up an address by alias.
    async fn lookup_alias(&self, alias: &str, kind: LookupType) -> Result<Address, RoutingError>;

    /// Look up an address by fingerprint.
    async fn lookup(&self, fingerprint: &str, kind: LookupType) -> Result<Address, RoutingError>;
}

/// Fixed directory populated from configuration.
#[derive(Debug, Default)]
pub struct StaticRouter {
    by_fingerprint: DashMap<String, Address>,
    by_alias: DashMap<String, String>,
}

impl StaticRouter {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from `[[routing.routes]]` entries.
    pub fn from_routes(routes: &[RouteConfig]) -> Result<Self, ConfigError> {
        let router = Self::new();
        for route in routes {
            let keys = PublicKeys::from_hex(&route.signing_key, &route.encryption_key).map_err(
                |e| ConfigError::Invalid {
                    field: "routing.routes",
                    reason: e.to_string(),
                },
            )?;
            let mut address = Address::from_keys(keys).with_location(route.location.clone());
            if let Some(alias) = &route.alias {
                address = address.with_alias(alias.clone());
            }
            router.insert(address);
        }
        Ok(router)
    }

    /// Add or replace an address.
    pub fn insert(&self, address: Address) {
        if let Some(alias) = address.alias() {
            self.by_alias
                .insert(alias.to_string(), address.fingerprint().to_string());
        }
        self.by_fingerprint
            .insert(address.fingerprint().to_string(), address);
    }

    /// Number of known addresses.
    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}

#[async_trait]
impl Router for StaticRouter {
    async fn lookup_alias(&self, alias: &str, kind: LookupType) -> Result<Address, RoutingError> {
        let fingerprint = self
            .by_alias
            .get(alias)
            .map(|f| f.clone())
            .ok_or_else(|| RoutingError::NotFound(alias.to_string()))?;
        self.lookup(&fingerprint, kind).await
    }

    async fn lookup(&self, fingerprint: &str, _kind: LookupType) -> Result<Address, RoutingError> {
        self.by_fingerprint
            .get(fingerprint)
            .map(|a| a.clone())
            .ok_or_else(|| RoutingError::NotFound(fingerprint.to_string()))
    }
}
