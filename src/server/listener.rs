//! Subscribe server listener
//!
//! Handles the TCP accept loop and spawns one session task per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use super::config::ServerConfig;
use super::directory::{AnyRoom, RoomDirectory};
use super::upgrade;
use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::session::{ConnectionId, Session};
use crate::stats::{ServerCounters, ServerStats};

/// WebSocket subscribe server
pub struct RoomServer<D: RoomDirectory = AnyRoom> {
    config: ServerConfig,
    directory: Arc<D>,
    registry: Arc<SubscriberRegistry>,
    counters: Arc<ServerCounters>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<D: RoomDirectory> RoomServer<D> {
    /// Create a new server with the given configuration and room directory
    pub fn new(config: ServerConfig, directory: D) -> Self {
        Self::with_registry(config, directory, Arc::new(SubscriberRegistry::new()))
    }

    /// Create a new server that registers subscribers in `registry`
    ///
    /// Use this when the mutation handlers already hold the registry.
    pub fn with_registry(
        config: ServerConfig,
        directory: D,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            directory: Arc::new(directory),
            registry,
            counters: Arc::new(ServerCounters::new()),
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// A broadcaster bound to this server's registry
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(Arc::clone(&self.registry))
    }

    /// Get a reference to the room directory
    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current server statistics
    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    /// Bind and run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Bind and run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = ?listener.local_addr().ok(), "Subscribe server listening");
        self.accept_loop(&listener).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// Stops accepting on shutdown; sessions already running finish on their
    /// own schedule.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = ?listener.local_addr().ok(), "Subscribe server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.counters.connection_rejected();
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id =
            ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(
            connection_id = %connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let directory = Arc::clone(&self.directory);
        let registry = Arc::clone(&self.registry);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            let _permit = permit;
            counters.connection_opened();

            match upgrade::accept(socket, &config, &*directory).await {
                Ok((ws, room)) => {
                    let (sink, stream) = ws.split();
                    let session =
                        Session::new(connection_id, room, Some(peer_addr), registry, config.session());
                    session.run(sink, stream).await;
                }
                Err(e) => {
                    counters.handshake_failed();
                    match &e {
                        Error::Rejected { .. } | Error::RoomNotFound(_) => tracing::debug!(
                            connection_id = %connection_id,
                            peer = %peer_addr,
                            error = %e,
                            "Upgrade refused"
                        ),
                        _ => tracing::warn!(
                            connection_id = %connection_id,
                            peer = %peer_addr,
                            error = %e,
                            "Upgrade failed"
                        ),
                    }
                }
            }

            counters.connection_closed();
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
