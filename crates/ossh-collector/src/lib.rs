// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector for network devices that dial in.
//!
//! Managed devices open an outbound TCP connection to this server
//! (inverting the usual client/server direction), optionally announce
//! themselves with a short handshake, and are then interrogated over a
//! management session to derive a fixed set of operational facts. Results
//! are delivered to caller-supplied callbacks; a failure on one connection
//! never affects others.
//!
//! The management protocol itself is a collaborator: callers provide a
//! [`SessionFactory`] that turns an accepted transport plus credentials
//! into a [`ManagementSession`].
//!
//! # Quick Start
//!
//! ```no_run
//! use ossh_collector::{Callbacks, OutboundServer, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn run(factory: Arc<dyn ossh_collector::SessionFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig {
//!     port: 2200,
//!     login_user: "collector".into(),
//!     login_password: "secret".into(),
//!     ..Default::default()
//! };
//!
//! let server = OutboundServer::new(config, factory)?;
//! let callbacks = Callbacks::new()
//!     .on_device(|_session, facts| println!("device {}: {}", facts.hostname, facts.mgmt_ipaddr))
//!     .on_error(|_session, error| eprintln!("device failed: {}", error));
//!
//! server.start(callbacks).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod facts;
pub mod server;
pub mod session;

pub use config::{ConfigError, ServerConfig};
pub use facts::{gather_basic_facts, CollectError, FactRecord};
pub use server::{
    drain_handshake, Callbacks, ConnectStrategy, ConnectionContext, ConnectionError,
    HandshakeField, HandshakeFields, HandshakeParser, OutboundServer, ServerError,
};
pub use session::{
    Credentials, ManagementSession, RpcRequest, SessionError, SessionFactory, SessionFacts,
};
