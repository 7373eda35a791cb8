//! Proxy server accept loop

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::proxy::HttpProxy;
use crate::Result;

use super::connection_pool::ConnectionPool;
use super::SHUTDOWN_TIMEOUT_MS;

/// Serves the proxy on a TCP listener until shut down
pub struct NetworkHandler {
    proxy: Arc<HttpProxy>,
    listen_addr: SocketAddr,
    connection_pool: ConnectionPool,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl NetworkHandler {
    /// Create a handler for `config`
    ///
    /// # Errors
    ///
    /// Returns error if the proxy strategy cannot be built
    pub fn new(config: &Config) -> Result<Self> {
        let proxy = HttpProxy::new(config)?;
        let listen_addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
        Ok(Self::with_proxy(
            proxy,
            listen_addr,
            config.limits.max_connections,
        ))
    }

    /// Create a handler around an existing proxy
    #[must_use]
    pub fn with_proxy(proxy: HttpProxy, listen_addr: SocketAddr, max_connections: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Self {
            proxy: Arc::new(proxy),
            listen_addr,
            connection_pool: ConnectionPool::new(max_connections),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Sender that stops the accept loop when signalled
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind the configured address and serve until Ctrl-C or shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;

        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT, shutting down");
                let _ = shutdown_tx.send(());
            }
        });

        self.serve(listener).await
    }

    /// Serve connections from `listener` until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the listener address cannot be read
    pub async fn serve(mut self, listener: TcpListener) -> Result<()> {
        info!(
            "Listening on {} (mode: {})",
            listener.local_addr()?,
            self.proxy.mode()
        );

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let Some(guard) = self.connection_pool.try_acquire() else {
                                warn!("Connection limit reached, rejecting {}", peer_addr);
                                drop(stream);
                                continue;
                            };

                            debug!(
                                "Accepted {} ({}/{} connections)",
                                peer_addr,
                                self.connection_pool.active_connections(),
                                self.connection_pool.max_connections()
                            );

                            let proxy = Arc::clone(&self.proxy);
                            connections.spawn(async move {
                                let _guard = guard;
                                let service = service_fn(move |request: Request<Incoming>| {
                                    let proxy = Arc::clone(&proxy);
                                    async move {
                                        Ok::<_, Infallible>(proxy.handle(request, Some(peer_addr)).await)
                                    }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await
                                {
                                    debug!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Initiating graceful shutdown");
                    break;
                }
            }
        }

        drop(listener);
        self.connection_pool.close();

        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while let Some(result) = connections.join_next().await {
                if let Err(e) = result {
                    warn!("Task cleanup error: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting open connections");
            connections.abort_all();
        }

        info!("Shutdown complete");
        Ok(())
    }
}
