// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Management-session collaborator interface.
//!
//! The collector does not implement the management protocol itself. A
//! caller-supplied [`SessionFactory`] turns each accepted transport into an
//! authenticated [`ManagementSession`], which exposes identity facts and a
//! generic request/response query surface. Replies are JSON trees
//! ([`serde_json::Value`]), queried by descendant lookup in
//! [`crate::facts`].

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::net::TcpStream;

/// Session error types.
///
/// [`SessionError::Connect`] is the distinguishable connection-establishment
/// kind (authentication or protocol negotiation rejected by the device).
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Connect(String),

    #[error("rpc `{call}` failed: {reason}")]
    Rpc { call: String, reason: String },

    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// True for connection-establishment failures (authentication,
    /// negotiation), as opposed to failures of an established session.
    pub fn is_connect(&self) -> bool {
        matches!(self, SessionError::Connect(_))
    }
}

/// Login credentials for the management session.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity facts exposed by an open session without an extra query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFacts {
    pub version: String,
    pub hostname: String,
    pub serial_number: String,
    pub model: String,
}

/// A named remote call with string parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    call: String,
    args: Vec<(String, String)>,
}

impl RpcRequest {
    pub fn new(call: impl Into<String>) -> Self {
        Self {
            call: call.into(),
            args: Vec::new(),
        }
    }

    /// Add a call parameter.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    pub fn call(&self) -> &str {
        &self.call
    }

    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Look up a parameter by name.
    pub fn get_arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// An authenticated, query-capable session to one device.
#[async_trait]
pub trait ManagementSession: Send {
    /// Identity facts gathered during session establishment.
    fn facts(&self) -> &SessionFacts;

    /// Issue a remote call and return the reply tree.
    async fn rpc(&mut self, request: RpcRequest) -> Result<Value, SessionError>;

    /// Close the session gracefully.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens management sessions over accepted transports.
///
/// The factory consumes the transport: on failure the stream is dropped
/// (and therefore closed) inside the factory, on success the returned
/// session owns it until the session itself is dropped.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    async fn open(
        &self,
        transport: TcpStream,
        credentials: &Credentials,
    ) -> Result<Box<dyn ManagementSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_kind() {
        let err = SessionError::Connect("auth failed".into());
        assert!(err.is_connect());

        let err = SessionError::Rpc {
            call: "get-config".into(),
            reason: "timeout".into(),
        };
        assert!(!err.is_connect());
    }

    #[test]
    fn test_rpc_request_builder() {
        let req = RpcRequest::new("get-interface-information")
            .arg("interface-name", "ge-0/0/0.0")
            .arg("terse", "true");
        assert_eq!(req.call(), "get-interface-information");
        assert_eq!(req.get_arg("interface-name"), Some("ge-0/0/0.0"));
        assert_eq!(req.get_arg("terse"), Some("true"));
        assert_eq!(req.get_arg("media"), None);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            user: "admin".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
