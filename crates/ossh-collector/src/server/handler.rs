// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection processing: session establishment, fact derivation, and
//! callback dispatch.
//!
//! Each accepted connection runs in its own task and either delivers a
//! [`FactRecord`] through `on_device` or an error through `on_error`,
//! exactly one of the two. The transport is owned by the session factory
//! (and then the session) once handed over, so it is closed on every exit
//! path, including callback panics.

use super::handshake::{drain_handshake, HandshakeField, HandshakeParser};
use crate::facts::{gather_basic_facts, CollectError, FactRecord};
use crate::session::{Credentials, ManagementSession, SessionError, SessionFactory};
use std::net::{IpAddr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Per-connection record created at accept time.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    peer_addr: IpAddr,
    peer_port: u16,
    label: String,
}

impl ConnectionContext {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer_addr: peer.ip(),
            peer_port: peer.port(),
            label: format!("{}:{}", peer.ip(), peer.port()),
        }
    }

    pub fn peer_addr(&self) -> IpAddr {
        self.peer_addr
    }

    pub fn peer_port(&self) -> u16 {
        self.peer_port
    }

    /// Human-readable `address:port` label used for log correlation.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// How an accepted connection is turned into a management session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectStrategy {
    /// Hand the transport straight to the session factory.
    #[default]
    DirectSession,
    /// Drain and parse the device handshake first, then open the session.
    HandshakeFirst,
}

/// Failure of one connection. Never affects other connections.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("session open failed: {0}")]
    SessionOpen(#[source] SessionError),

    #[error("fact collection failed: {0}")]
    Facts(#[from] CollectError),

    #[error("handshake read failed: {0}")]
    Handshake(#[from] std::io::Error),
}

/// `on_device` handler: an open session and the derived facts.
pub type OnDevice = Arc<dyn Fn(&mut dyn ManagementSession, &FactRecord) + Send + Sync>;

/// `on_error` handler: the session (if one was established) and the error.
pub type OnError = Arc<dyn Fn(Option<&mut dyn ManagementSession>, &ConnectionError) + Send + Sync>;

/// Optional user callbacks, registered at server start.
///
/// Either slot may be absent; invocation routes to a no-op in that case. A
/// panic inside a handler is logged and contained so transport cleanup and
/// the accept loop are unaffected.
#[derive(Clone, Default)]
pub struct Callbacks {
    on_device: Option<OnDevice>,
    on_error: Option<OnError>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_device<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut dyn ManagementSession, &FactRecord) + Send + Sync + 'static,
    {
        self.on_device = Some(Arc::new(handler));
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(Option<&mut dyn ManagementSession>, &ConnectionError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub(crate) fn notify_device(&self, session: &mut dyn ManagementSession, facts: &FactRecord) {
        if let Some(handler) = &self.on_device {
            if catch_unwind(AssertUnwindSafe(|| handler(session, facts))).is_err() {
                error!("on_device callback panicked");
            }
        }
    }

    pub(crate) fn notify_error(
        &self,
        session: Option<&mut dyn ManagementSession>,
        error: &ConnectionError,
    ) {
        if let Some(handler) = &self.on_error {
            if catch_unwind(AssertUnwindSafe(|| handler(session, error))).is_err() {
                error!("on_error callback panicked");
            }
        }
    }
}

/// Process one accepted connection to completion.
pub(crate) async fn handle_connection(
    ctx: ConnectionContext,
    mut stream: TcpStream,
    factory: Arc<dyn SessionFactory>,
    credentials: Credentials,
    callbacks: Callbacks,
    strategy: ConnectStrategy,
    handshake_idle_timeout: Duration,
) {
    if strategy == ConnectStrategy::HandshakeFirst {
        match drain_handshake(&mut stream, handshake_idle_timeout).await {
            Ok(raw) => {
                let fields = HandshakeParser::new().parse(&String::from_utf8_lossy(&raw));
                match fields.get(HandshakeField::DeviceId) {
                    Some(device_id) => {
                        info!("{}: handshake from device-id {}", ctx.label(), device_id);
                    }
                    None => debug!("{}: handshake carried no device-id", ctx.label()),
                }
            }
            Err(e) => {
                error!("{}: failed to read handshake: {}", ctx.label(), e);
                callbacks.notify_error(None, &ConnectionError::Handshake(e));
                return;
            }
        }
    }

    info!("{}: establishing management session", ctx.label());

    // The factory consumes the transport; on failure the stream is dropped
    // (closed) inside it, on success the session owns it from here on.
    let mut session = match factory.open(stream, &credentials).await {
        Ok(session) => session,
        Err(e) => {
            if e.is_connect() {
                error!("{}: connection error to device: {}", ctx.label(), e);
            } else {
                error!(
                    "{}: unable to establish management session: {}",
                    ctx.label(),
                    e
                );
            }
            callbacks.notify_error(None, &ConnectionError::SessionOpen(e));
            return;
        }
    };

    info!("{}: gathering basic facts", ctx.label());

    match gather_basic_facts(session.as_mut()).await {
        Ok(facts) => {
            info!(
                "{}: completed device with management address {}",
                ctx.label(),
                facts.mgmt_ipaddr
            );
            callbacks.notify_device(session.as_mut(), &facts);
            if let Err(e) = session.close().await {
                warn!("{}: session close failed: {}", ctx.label(), e);
            }
        }
        Err(e) => {
            error!("{}: unable to process device: {}", ctx.label(), e);
            let error = ConnectionError::Facts(e);
            // The still-open session is handed over so the caller may
            // inspect it before the transport is released.
            callbacks.notify_error(Some(session.as_mut()), &error);
        }
    }

    // Session (and with it the transport) dropped here on every path.
}
