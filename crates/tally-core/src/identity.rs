//! Node identity attached to every published snapshot.
//!
//! Identity strings come from operator configuration and are bounded by
//! the published schema. Oversized values are truncated, never rejected:
//! the caller receives a list of [`FieldTruncation`]s to report.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

pub const NODE_ID_MAX_LENGTH: usize = 1024;
pub const NODE_NAME_MAX_LENGTH: usize = 128;
pub const NODE_AUTH_DID_MAX_LENGTH: usize = 256;
pub const NODE_IP_ADDR_MAX_LENGTH: usize = 64;
pub const NODE_PEER_ID_MAX_LENGTH: usize = 256;
pub const VERSION_MAX_LENGTH: usize = 32;

/// Immutable description of the node publishing metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: String,
    pub name: String,
    #[serde(rename = "nodeAuthDID", default, skip_serializing_if = "String::is_empty")]
    pub auth_did: String,
    #[serde(rename = "IPAddress", default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
    #[serde(rename = "PeerID", default, skip_serializing_if = "String::is_empty")]
    pub peer_id: String,
    #[serde(rename = "ceramicVersion", default, skip_serializing_if = "String::is_empty")]
    pub ceramic_version: String,
    #[serde(rename = "ipfsVersion", default, skip_serializing_if = "String::is_empty")]
    pub ipfs_version: String,
}

/// A configuration field that was cut down to its schema bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTruncation {
    pub field: &'static str,
    pub limit: usize,
    pub original_len: usize,
}

impl fmt::Display for FieldTruncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: value of {} characters longer than {}, truncating",
            self.field, self.original_len, self.limit
        )
    }
}

impl NodeIdentity {
    /// Build an identity from configuration, truncating oversized fields.
    ///
    /// When `node_id` is empty the peer id stands in for it.
    pub fn from_config(config: &EngineConfig) -> (Self, Vec<FieldTruncation>) {
        let mut truncations = Vec::new();
        let mut bounded = |field: &'static str, value: &str, limit: usize| {
            let kept = truncate_chars(value, limit);
            if kept.len() < value.len() {
                truncations.push(FieldTruncation {
                    field,
                    limit,
                    original_len: value.chars().count(),
                });
            }
            kept.to_string()
        };

        let id = bounded("nodeId", &config.node_id, NODE_ID_MAX_LENGTH);
        let name = bounded("nodeName", &config.node_name, NODE_NAME_MAX_LENGTH);
        let auth_did = bounded("nodeAuthDID", &config.node_auth_did, NODE_AUTH_DID_MAX_LENGTH);
        let ip_address = bounded("nodeIPAddr", &config.node_ip_addr, NODE_IP_ADDR_MAX_LENGTH);
        let peer_id = bounded("nodePeerId", &config.node_peer_id, NODE_PEER_ID_MAX_LENGTH);
        let ceramic_version =
            bounded("ceramicVersion", &config.ceramic_version, VERSION_MAX_LENGTH);
        let ipfs_version = bounded("ipfsVersion", &config.ipfs_version, VERSION_MAX_LENGTH);

        let identity = Self {
            id: if id.is_empty() { peer_id.clone() } else { id },
            name,
            auth_did,
            ip_address,
            peer_id,
            ceramic_version,
            ipfs_version,
        };
        (identity, truncations)
    }
}

/// Return the prefix of `s` holding at most `max_chars` characters.
///
/// Cuts on a char boundary so multi-byte text never splits mid-codepoint.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
