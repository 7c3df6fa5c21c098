// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Basic-fact derivation over an open management session.
//!
//! Four dependent steps: session identity facts, the configured
//! outbound-connection server address, a route lookup toward that address to
//! find the management interface, and two interface queries for the local
//! address and hardware address. The steps are order-dependent; any failure
//! fails the whole derivation and no partial record is returned.

use crate::session::{ManagementSession, RpcRequest, SessionError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Derived facts for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactRecord {
    pub os_version: String,
    pub hostname: String,
    pub serial_number: String,
    pub model: String,
    pub mgmt_interface: String,
    pub mgmt_ipaddr: String,
    pub mgmt_macaddr: String,
}

/// Fact-derivation error types.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("missing `{node}` in {reply} reply")]
    MissingNode {
        node: &'static str,
        reply: &'static str,
    },

    #[error("empty `{node}` list in {reply} reply")]
    EmptyNode {
        node: &'static str,
        reply: &'static str,
    },
}

impl CollectError {
    fn missing(node: &'static str, reply: &'static str) -> Self {
        Self::MissingNode { node, reply }
    }
}

/// First value stored under `key`, searching the reply tree depth-first.
///
/// JSON analogue of a `.//key` descendant lookup.
fn find_node<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                return Some(found);
            }
            map.values().find_map(|child| find_node(child, key))
        }
        Value::Array(items) => items.iter().find_map(|child| find_node(child, key)),
        _ => None,
    }
}

/// First string stored under `key` anywhere in the reply tree.
fn find_text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    find_node(value, key).and_then(Value::as_str)
}

/// Derive the fact record for the device behind `session`.
pub async fn gather_basic_facts(
    session: &mut dyn ManagementSession,
) -> Result<FactRecord, CollectError> {
    // Step 1: identity facts exposed by the session itself.
    let identity = session.facts().clone();

    // Step 2: the device's outbound-connection configuration names the
    // collector it dialed. Only the first configured server is used; devices
    // with multiple servers are not disambiguated.
    let config = session
        .rpc(RpcRequest::new("get-config").arg("filter", "system/services/outbound-ssh"))
        .await?;
    let servers = find_node(&config, "servers")
        .ok_or_else(|| CollectError::missing("servers", "outbound-ssh config"))?;
    let first_server = match servers {
        Value::Array(items) => items.first().ok_or(CollectError::EmptyNode {
            node: "servers",
            reply: "outbound-ssh config",
        })?,
        other => other,
    };
    let server_addr = find_text(first_server, "name")
        .ok_or_else(|| CollectError::missing("name", "outbound-ssh config"))?
        .to_string();

    // Step 3: route lookup toward that address yields the logical interface;
    // stripping the unit suffix gives the physical management interface.
    let route = session
        .rpc(RpcRequest::new("get-route-information").arg("destination", &server_addr))
        .await?;
    let logical_ifname = ["via", "nh-local-interface"]
        .into_iter()
        .find_map(|node| find_text(&route, node))
        .ok_or_else(|| CollectError::missing("via | nh-local-interface", "route lookup"))?
        .to_string();
    let mgmt_interface = match logical_ifname.split_once('.') {
        Some((physical, _unit)) => physical,
        None => logical_ifname.as_str(),
    }
    .to_string();

    // Step 4a: terse query on the logical interface for the local address.
    let terse = session
        .rpc(
            RpcRequest::new("get-interface-information")
                .arg("interface-name", &logical_ifname)
                .arg("terse", "true"),
        )
        .await?;
    let ifa_local = find_text(&terse, "ifa-local")
        .ok_or_else(|| CollectError::missing("ifa-local", "terse interface"))?;
    let mgmt_ipaddr = match ifa_local.split_once('/') {
        Some((addr, _prefix_len)) => addr,
        None => ifa_local,
    }
    .trim()
    .to_string();

    // Step 4b: media query on the physical interface for the MAC address.
    let media = session
        .rpc(
            RpcRequest::new("get-interface-information")
                .arg("interface-name", &mgmt_interface)
                .arg("media", "true"),
        )
        .await?;
    let mgmt_macaddr = find_text(&media, "current-physical-address")
        .ok_or_else(|| CollectError::missing("current-physical-address", "media interface"))?
        .trim()
        .to_string();

    Ok(FactRecord {
        os_version: identity.version,
        hostname: identity.hostname,
        serial_number: identity.serial_number,
        model: identity.model,
        mgmt_interface,
        mgmt_ipaddr,
        mgmt_macaddr,
    })
}
