// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound-connection acceptor and server lifecycle.

use crate::config::{ConfigError, ServerConfig};
use crate::session::SessionFactory;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub mod handler;
pub mod handshake;

pub use handler::{Callbacks, ConnectStrategy, ConnectionContext, ConnectionError};
pub use handshake::{drain_handshake, HandshakeField, HandshakeFields, HandshakeParser};

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server already running")]
    AlreadyRunning,

    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Collector for devices that dial in.
///
/// Owns the listening socket while running. `start` registers the user
/// callbacks and spawns the accept loop; each accepted connection is handed
/// to its own task. `stop` closes the listener and returns the server to a
/// startable state without waiting for in-flight connections.
pub struct OutboundServer {
    config: Arc<ServerConfig>,
    factory: Arc<dyn SessionFactory>,
    strategy: ConnectStrategy,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl OutboundServer {
    /// Create a new server. Fails on invalid configuration.
    pub fn new(
        config: ServerConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            factory,
            strategy: ConnectStrategy::default(),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }

    /// Select the connection-handling strategy (default: direct session).
    pub fn with_strategy(mut self, strategy: ConnectStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bind, listen, and start accepting in a background task.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] if already listening; the
    /// running instance is left undisturbed. Callbacks are registered anew
    /// on every start.
    pub async fn start(&self, callbacks: Callbacks) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = self.config.bind_addr();
        let listener = match Self::bind(addr, self.config.listen_backlog) {
            Ok(listener) => listener,
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(ServerError::Bind { addr, source });
            }
        };

        let local = listener.local_addr().map_err(|source| {
            self.running.store(false, Ordering::SeqCst);
            ServerError::Bind { addr, source }
        })?;
        *self.local_addr.lock().unwrap() = Some(local);

        info!("outbound collector listening on {}", local);

        let config = self.config.clone();
        let factory = self.factory.clone();
        let strategy = self.strategy;
        let shutdown = self.shutdown.clone();
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            accept_loop(
                listener, config, factory, strategy, callbacks, shutdown, running,
            )
            .await;
        });
        *self.accept_task.lock().unwrap() = Some(task);

        Ok(())
    }

    /// Close the listener and unblock the accept loop.
    ///
    /// Waits for the accept task (so the socket is released before a
    /// subsequent `start`), but not for in-flight connection handlers.
    pub async fn stop(&self) {
        let task = self.accept_task.lock().unwrap().take();
        let Some(task) = task else {
            return;
        };

        // notify_one stores a permit, so the signal is not lost if the
        // accept loop is busy dispatching a connection right now.
        self.shutdown.notify_one();
        if task.await.is_err() {
            error!("accept task terminated abnormally");
        }

        self.running.store(false, Ordering::SeqCst);
        *self.local_addr.lock().unwrap() = None;
        info!("outbound collector stopped");
    }

    /// True while the accept loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound address while running (reports the ephemeral port).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    fn bind(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(backlog)
    }
}

/// Accept until told to shut down.
///
/// Transient accept errors are logged and the loop continues; the shutdown
/// notification is the only clean exit and is not an error.
async fn accept_loop(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    factory: Arc<dyn SessionFactory>,
    strategy: ConnectStrategy,
    callbacks: Callbacks,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let ctx = ConnectionContext::new(peer);
                        info!("accepted outbound connection from {}", ctx.label());

                        let factory = factory.clone();
                        let callbacks = callbacks.clone();
                        let credentials = config.credentials();
                        let idle_timeout = config.handshake_idle_timeout();

                        tokio::spawn(handler::handle_connection(
                            ctx,
                            stream,
                            factory,
                            credentials,
                            callbacks,
                            strategy,
                            idle_timeout,
                        ));
                    }
                    Err(e) => {
                        error!("accept failed: {}", e);
                    }
                }
            }
            _ = shutdown.notified() => {
                info!("outbound collector shutting down");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
}
