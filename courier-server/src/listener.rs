//! TCP accept loop.
//!
//! Accepts connections until shutdown, applies admission limits, and hands
//! each admitted connection to its own task.

use crate::connection::Connection;
use crate::error::NodeError;
use crate::limits::spawn_shrink_task;
use crate::server::MailServer;
use courier_types::{ErrorCode, WireError};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::OwnedSemaphorePermit;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Error-sink location for accept failures.
const ACCEPT_LOCATION: &str = "Server Loop (Accepting New Client)";

/// Sent to peers turned away at admission.
const SERVER_BUSY: &str = "Server is busy. Try again later.";

impl MailServer {
    /// Bind `bind_address:port` and serve until shutdown.
    ///
    /// Port 0 binds an ephemeral port; use [`MailServer::ready`] to learn it.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bind`] if the listener cannot be acquired.
    pub async fn start(self: Arc<Self>, port: u16) -> Result<(), NodeError> {
        let address = format!("{}:{}", self.config().server.bind_address, port);
        let listener = TcpListener::bind(&address).await.map_err(|source| {
            tracing::error!("Failed to bind {}: {}", address, source);
            NodeError::Bind { address, source }
        })?;

        let maintenance = spawn_shrink_task(
            self.rate_limits().clone(),
            Duration::from_secs(self.config().limits.shrink_interval_secs.max(1)),
            self.shutdown_signal(),
        );

        self.serve(listener).await;
        maintenance.abort();
        Ok(())
    }

    /// Serve connections from an already-bound listener until shutdown.
    ///
    /// The listener is closed when this returns; connections already
    /// admitted keep running in their own tasks.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        match listener.local_addr() {
            Ok(local) => {
                tracing::info!("Courier node {} listening on {}", self.identity().address(), local);
                self.set_bound(local);
            }
            Err(e) => self.report(ACCEPT_LOCATION, e),
        }

        let mut shutdown = self.shutdown_signal();
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        self.report(ACCEPT_LOCATION, e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        tracing::info!("Listener closed for {}", self.identity().address());
    }

    fn spawn_connection(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let Some(permit) = self.admit(&peer) else {
            self.metrics()
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);
            let refusal = WireError::new(ErrorCode::InternalError, SERVER_BUSY);
            tokio::spawn(Connection::new(self.clone(), stream, peer.to_string()).refuse(refusal));
            return;
        };
        self.metrics().connections_total.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }

        let connection = Connection::new(self.clone(), stream, peer.to_string());
        // Spawn connection handler - don't block the accept loop
        tokio::spawn(async move {
            connection.run().await;
            drop(permit);
        });
    }

    /// Apply capacity, per-IP and global limits.
    ///
    /// The capacity permit is taken first since it is returned on rejection;
    /// rate-limit tokens are not. A peer over its own quota never draws from
    /// the global budget.
    fn admit(&self, peer: &SocketAddr) -> Option<OwnedSemaphorePermit> {
        let Ok(permit) = self.admission().clone().try_acquire_owned() else {
            tracing::warn!(
                "Connection limit reached ({}), rejecting {}",
                self.config().limits.max_concurrent_connections,
                peer
            );
            return None;
        };
        if let Err(e) = self.rate_limits().check_connection(peer.ip()) {
            tracing::warn!("Connection rate limited for {}: {}", peer, e);
            return None;
        }
        if let Err(e) = self.rate_limits().check_global() {
            tracing::warn!("Rejecting {}: {}", peer, e);
            return None;
        }
        Some(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::delegate::MemoryDelegate;
    use courier_types::Identity;

    fn server_with(config: Config) -> Arc<MailServer> {
        Arc::new(
            MailServer::new(
                config,
                Identity::generate().unwrap(),
                Arc::new(MemoryDelegate::new()),
            )
            .unwrap(),
        )
    }

    #[test]
    fn admission_respects_per_ip_quota() {
        let mut config = Config::default();
        config.limits.connections_per_ip = 2;
        let server = server_with(config);
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();

        let first = server.admit(&peer);
        let second = server.admit(&peer);
        assert!(first.is_some() && second.is_some());
        assert!(server.admit(&peer).is_none());
    }

    #[test]
    fn admission_respects_capacity() {
        let mut config = Config::default();
        config.limits.max_concurrent_connections = 1;
        let server = server_with(config);

        let held = server.admit(&"10.0.0.1:1".parse().unwrap());
        assert!(held.is_some());
        assert!(server.admit(&"10.0.0.2:1".parse().unwrap()).is_none());

        drop(held);
        assert!(server.admit(&"10.0.0.3:1".parse().unwrap()).is_some());
    }

    #[test]
    fn full_capacity_does_not_spend_per_ip_quota() {
        let mut config = Config::default();
        config.limits.connections_per_ip = 1;
        config.limits.max_concurrent_connections = 1;
        let server = server_with(config);

        let held = server.admit(&"10.0.0.1:1".parse().unwrap());
        assert!(held.is_some());
        assert!(server.admit(&"10.0.0.2:1".parse().unwrap()).is_none());

        drop(held);
        assert!(server.admit(&"10.0.0.2:2".parse().unwrap()).is_some());
    }

    #[tokio::test]
    async fn rejected_peer_gets_signed_busy_error() {
        let mut config = Config::default();
        config.limits.connections_per_ip = 1;
        let server = server_with(config);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        tokio::spawn(server.clone().serve(listener));
        let addr = server.ready().await.unwrap();

        let _admitted = TcpStream::connect(addr).await.unwrap();
        let mut refused = TcpStream::connect(addr).await.unwrap();

        let bytes = tokio::time::timeout(
            Duration::from_secs(5),
            crate::frame::read_frame(&mut refused, 1 << 20),
        )
        .await
        .expect("refused peer should be answered")
        .unwrap();
        let signed = courier_types::Envelope::from_bytes(&bytes)
            .unwrap()
            .open_plain()
            .unwrap();
        assert!(signed.verify());
        assert_eq!(signed.signer, server.identity().public_keys());
        let error: WireError = signed.unpack().unwrap().decode().unwrap();
        assert_eq!(error.error_code().unwrap(), ErrorCode::InternalError);
        assert_eq!(error.description, SERVER_BUSY);
        assert_eq!(
            server.metrics().connections_rejected.load(Ordering::Relaxed),
            1
        );

        server.shutdown();
    }

    #[tokio::test]
    async fn start_reports_bind_failure() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1".into();
        let server = server_with(config);

        let err = server.start(port).await.unwrap_err();
        assert!(matches!(err, NodeError::Bind { .. }));
    }

    #[tokio::test]
    async fn serve_returns_after_shutdown() {
        let server = server_with(Config::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let task = tokio::spawn(server.clone().serve(listener));
        let addr = server.ready().await.unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("serve should return after shutdown")
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
