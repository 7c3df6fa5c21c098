// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device handshake: idle-timeout raw receiver and field extraction.
//!
//! A device that dials in may announce itself with a short burst of
//! `FIELD-NAME: value\r\n` lines before the management protocol takes over.
//! [`drain_handshake`] collects the burst; [`HandshakeParser`] extracts the
//! known fields best-effort. This is not a strict protocol validator:
//! unknown bytes are skipped and any subset of fields (including none) is
//! acceptable.

use regex::Regex;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Read chunk size for the handshake drain.
const RECV_CHUNK: usize = 128;

/// The known handshake field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeField {
    MsgId,
    DeviceId,
    MsgVersion,
    HostKey,
    Hmac,
}

impl HandshakeField {
    /// The wire name of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeField::MsgId => "MSG-ID",
            HandshakeField::DeviceId => "DEVICE-ID",
            HandshakeField::MsgVersion => "MSG-VER",
            HandshakeField::HostKey => "HOST-KEY",
            HandshakeField::Hmac => "HMAC",
        }
    }
}

/// Extracted handshake fields. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandshakeFields {
    pub msg_id: Option<String>,
    pub device_id: Option<String>,
    pub msg_version: Option<String>,
    pub host_key: Option<String>,
    pub hmac: Option<String>,
}

impl HandshakeFields {
    pub fn get(&self, field: HandshakeField) -> Option<&str> {
        let slot = match field {
            HandshakeField::MsgId => &self.msg_id,
            HandshakeField::DeviceId => &self.device_id,
            HandshakeField::MsgVersion => &self.msg_version,
            HandshakeField::HostKey => &self.host_key,
            HandshakeField::Hmac => &self.hmac,
        };
        slot.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.msg_id.is_none()
            && self.device_id.is_none()
            && self.msg_version.is_none()
            && self.host_key.is_none()
            && self.hmac.is_none()
    }

    fn set(&mut self, field: HandshakeField, value: String) {
        let slot = match field {
            HandshakeField::MsgId => &mut self.msg_id,
            HandshakeField::DeviceId => &mut self.device_id,
            HandshakeField::MsgVersion => &mut self.msg_version,
            HandshakeField::HostKey => &mut self.host_key,
            HandshakeField::Hmac => &mut self.hmac,
        };
        *slot = Some(value);
    }
}

/// Tokenizing extractor for the handshake fields.
pub struct HandshakeParser {
    patterns: Vec<(HandshakeField, Regex)>,
}

impl HandshakeParser {
    pub fn new() -> Self {
        // Each field is a CRLF-terminated line; the host key is additionally
        // NUL-terminated before its CRLF.
        let table = [
            (HandshakeField::MsgId, r"MSG-ID: (.*)\r\n"),
            (HandshakeField::DeviceId, r"DEVICE-ID: (.*)\r\n"),
            (HandshakeField::MsgVersion, r"MSG-VER: (.*)\r\n"),
            (HandshakeField::HostKey, r"HOST-KEY: (.*)\x00\r\n"),
            (HandshakeField::Hmac, r"HMAC: (.*)\r\n"),
        ];
        let patterns = table
            .into_iter()
            .map(|(field, pattern)| {
                (field, Regex::new(pattern).expect("handshake field pattern"))
            })
            .collect();
        Self { patterns }
    }

    /// Extract fields from a decoded handshake buffer.
    ///
    /// Scans left to right, taking the earliest field match and resuming
    /// after it; bytes that belong to no field are skipped. A truncated
    /// field therefore never discards fields parsed before or after it.
    pub fn parse(&self, input: &str) -> HandshakeFields {
        let mut fields = HandshakeFields::default();
        let mut pos = 0;

        while pos < input.len() {
            let earliest = self
                .patterns
                .iter()
                .filter_map(|(field, pattern)| {
                    pattern
                        .captures(&input[pos..])
                        .map(|captures| (*field, captures))
                })
                .min_by_key(|(_, captures)| {
                    captures.get(0).map(|m| m.start()).unwrap_or(usize::MAX)
                });

            match earliest {
                Some((field, captures)) => {
                    if let (Some(whole), Some(value)) = (captures.get(0), captures.get(1)) {
                        fields.set(field, value.as_str().to_string());
                        pos += whole.end();
                    } else {
                        break;
                    }
                }
                None => break,
            }
        }

        fields
    }
}

impl Default for HandshakeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain whatever the peer sends within `idle_timeout` of its last byte.
///
/// The idle timeout is the expected terminator, not an error: a silent peer
/// yields an empty buffer once the window elapses. EOF also terminates the
/// drain. Only genuine read errors are returned.
pub async fn drain_handshake<R>(stream: &mut R, idle_timeout: Duration) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut received = Vec::new();
    let mut chunk = [0u8; RECV_CHUNK];

    loop {
        match timeout(idle_timeout, stream.read(&mut chunk)).await {
            Err(_elapsed) => break,
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => received.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e),
        }
    }

    Ok(received)
}
