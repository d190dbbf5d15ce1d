//! Main MailServer coordination.
//!
//! MailServer owns everything connections share: the node identity, the
//! delegate, the optional router, registered handlers, admission limits and
//! the shutdown signal.

use crate::config::{Config, ConfigError};
use crate::delegate::ServerDelegate;
use crate::dispatch::{Handler, HandlerRegistry};
use crate::error::ServerError;
use crate::limits::RateLimits;
use crate::routing::Router;
use courier_types::Identity;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

/// Operational metrics for monitoring node activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Connections admitted and handed to a task.
    pub connections_total: AtomicU64,
    /// Connections dropped at admission (rate or capacity).
    pub connections_rejected: AtomicU64,
    /// Envelopes read successfully.
    pub envelopes_received: AtomicU64,
    /// Envelopes passed to the delegate as descriptions.
    pub descriptions_saved: AtomicU64,
    /// Single-item transfers answered.
    pub transfers_served: AtomicU64,
    /// List transfers answered.
    pub lists_served: AtomicU64,
    /// Requests routed to a registered handler.
    pub handler_dispatches: AtomicU64,
    /// Raw bytes copied from delegate data streams.
    pub bytes_streamed: AtomicU64,
    /// Failures reported to the error sink.
    pub errors_total: AtomicU64,
    /// Wire errors delivered to peers.
    pub wire_errors_sent: AtomicU64,
}

/// A Courier mail node.
pub struct MailServer {
    config: Config,
    identity: Arc<Identity>,
    delegate: Arc<dyn ServerDelegate>,
    router: Option<Arc<dyn Router>>,
    handlers: HandlerRegistry,
    rate_limits: RateLimits,
    /// Caps connections served at the same time.
    admission: Arc<Semaphore>,
    metrics: ServerMetrics,
    shutdown: watch::Sender<bool>,
    /// Address the listener is bound to, once it is.
    bound: watch::Sender<Option<SocketAddr>>,
}

impl std::fmt::Debug for MailServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailServer")
            .field("address", self.identity.address())
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .field("has_router", &self.router.is_some())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl MailServer {
    /// Create a node with the given identity and delegate.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured limits are invalid.
    pub fn new(
        config: Config,
        identity: Identity,
        delegate: Arc<dyn ServerDelegate>,
    ) -> Result<Self, ConfigError> {
        let rate_limits = RateLimits::new(&config.limits)?;
        if config.limits.max_concurrent_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_concurrent_connections",
                reason: "must be greater than zero".into(),
            });
        }
        let admission = Arc::new(Semaphore::new(config.limits.max_concurrent_connections));
        let (shutdown, _) = watch::channel(false);
        let (bound, _) = watch::channel(None);

        Ok(Self {
            config,
            identity: Arc::new(identity),
            delegate,
            router: None,
            handlers: HandlerRegistry::new(),
            rate_limits,
            admission,
            metrics: ServerMetrics::default(),
            shutdown,
            bound,
        })
    }

    /// Attach a routing directory for resolving unreachable senders.
    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// Register a handler for application message types.
    ///
    /// Handlers are consulted in registration order.
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.register(handler);
        self
    }

    /// Get the node configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the node identity.
    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    /// Get the delegate.
    pub fn delegate(&self) -> &Arc<dyn ServerDelegate> {
        &self.delegate
    }

    /// Get the router, if one is attached.
    pub fn router(&self) -> Option<&dyn Router> {
        self.router.as_deref()
    }

    /// Get the handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    pub(crate) fn admission(&self) -> &Arc<Semaphore> {
        &self.admission
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Hand a failure to the delegate's error sink.
    pub fn report(
        &self,
        location: &'static str,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) {
        self.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        self.delegate.handle_error(&ServerError::new(location, cause));
    }

    /// Ask the accept loop to stop.
    ///
    /// Idempotent. Connections already being served run to completion.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!("Shutdown requested for {}", self.identity.address());
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Subscribe to the shutdown signal.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn set_bound(&self, addr: SocketAddr) {
        self.bound.send_replace(Some(addr));
    }

    /// Wait until the listener is bound and return its address.
    ///
    /// Returns `None` if shutdown is requested before the node binds.
    pub async fn ready(&self) -> Option<SocketAddr> {
        let mut bound = self.bound.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let addr = *bound.borrow_and_update();
            if addr.is_some() {
                return addr;
            }
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                return None;
            }
            tokio::select! {
                changed = bound.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::MemoryDelegate;
    use std::time::Duration;

    fn test_server() -> MailServer {
        MailServer::new(
            Config::default(),
            Identity::generate().unwrap(),
            Arc::new(MemoryDelegate::new()),
        )
        .unwrap()
    }

    #[test]
    fn shutdown_is_idempotent() {
        let server = test_server();
        assert!(!server.is_shutting_down());
        server.shutdown();
        server.shutdown();
        assert!(server.is_shutting_down());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = Config::default();
        config.limits.max_concurrent_connections = 0;
        let result = MailServer::new(
            config,
            Identity::generate().unwrap(),
            Arc::new(MemoryDelegate::new()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn ready_returns_none_after_shutdown() {
        let server = Arc::new(test_server());
        let waiter = tokio::spawn({
            let server = server.clone();
            async move { server.ready().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        server.shutdown();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn ready_returns_bound_address() {
        let server = test_server();
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        server.set_bound(addr);
        assert_eq!(server.ready().await, Some(addr));
    }

    #[test]
    fn report_counts_errors() {
        let server = test_server();
        server.report("Test", std::io::Error::other("boom"));
        assert_eq!(server.metrics().errors_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn debug_does_not_expose_secrets() {
        let server = test_server();
        let debug = format!("{server:?}");
        assert!(debug.contains("MailServer"));
        assert!(!debug.contains(&hex::encode(server.identity().secret_bytes().as_slice())));
    }
}
