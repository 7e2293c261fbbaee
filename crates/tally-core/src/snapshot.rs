//! The published snapshot: a frozen, owned projection of one window.
//!
//! Field names follow the periodic metric event schema the publisher
//! writes (camelCase, `MS` suffixes).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::NodeIdentity;

/// Point-in-time projection of accumulator state.
///
/// Every field is owned; nothing here aliases the accumulator, so a
/// snapshot stays unchanged after the accumulator resets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// RFC 3339 timestamp of when the snapshot was taken.
    pub ts: String,
    pub node_identity: NodeIdentity,
    /// Length of the observation window this snapshot covers.
    #[serde(rename = "lookbackWindowMS", default, skip_serializing_if = "Option::is_none")]
    pub lookback_window_ms: Option<u64>,

    pub total_pinned_streams: i64,
    pub total_indexed_models: i64,
    pub current_pending_requests: i64,

    #[serde(rename = "meanAnchorRequestAgeMS")]
    pub mean_anchor_request_age_ms: i64,
    #[serde(rename = "maxAnchorRequestAgeMS")]
    pub max_anchor_request_age_ms: i64,

    pub recent_completed_requests: i64,
    pub recent_errors: i64,

    pub sample_recent_errors: Vec<String>,

    /// Caller-defined counters, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_counters: BTreeMap<String, i64>,
    /// Caller-defined observables, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_observables: BTreeMap<String, i64>,
    /// Caller-defined sample aggregates, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_aggregates: BTreeMap<String, AggregateSummary>,
}

/// Mean, max and sample count of one named aggregate over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

impl Snapshot {
    /// Serialize to the JSON document handed to document-store publishers.
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_snapshot() -> Snapshot {
        Snapshot {
            ts: "2024-01-01T00:00:00.000Z".to_string(),
            node_identity: NodeIdentity {
                id: "123".to_string(),
                ..NodeIdentity::default()
            },
            lookback_window_ms: Some(60_000),
            total_pinned_streams: 102,
            total_indexed_models: 4,
            current_pending_requests: 7,
            mean_anchor_request_age_ms: 2000,
            max_anchor_request_age_ms: 3000,
            recent_completed_requests: 50,
            recent_errors: 3,
            sample_recent_errors: vec!["boom".to_string()],
            custom_counters: BTreeMap::new(),
            custom_observables: BTreeMap::new(),
            custom_aggregates: BTreeMap::new(),
        }
    }

    #[test]
    fn json_uses_schema_names() {
        let json = test_snapshot().to_json();
        assert_eq!(json["ts"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["nodeIdentity"]["id"], "123");
        assert_eq!(json["lookbackWindowMS"], 60_000);
        assert_eq!(json["totalPinnedStreams"], 102);
        assert_eq!(json["meanAnchorRequestAgeMS"], 2000);
        assert_eq!(json["maxAnchorRequestAgeMS"], 3000);
        assert_eq!(json["recentCompletedRequests"], 50);
        assert_eq!(json["recentErrors"], 3);
        assert_eq!(json["sampleRecentErrors"][0], "boom");
        // Empty free-form buckets stay off the wire.
        assert!(json.get("customCounters").is_none());
    }

    #[test]
    fn custom_buckets_serialize_when_present() {
        let mut snap = test_snapshot();
        snap.custom_counters.insert("jobs_total".to_string(), 9);
        let json = snap.to_json();
        assert_eq!(json["customCounters"]["jobs_total"], 9);

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn aggregates_serialize_as_summaries() {
        let mut snap = test_snapshot();
        snap.custom_aggregates.insert(
            "hit_ratio".to_string(),
            AggregateSummary {
                mean: 0.5,
                max: 0.75,
                count: 2,
            },
        );
        let json = snap.to_json();
        assert_eq!(json["customAggregates"]["hit_ratio"]["mean"], 0.5);
        assert_eq!(json["customAggregates"]["hit_ratio"]["max"], 0.75);
        assert_eq!(json["customAggregates"]["hit_ratio"]["count"], 2);
        assert!(test_snapshot().to_json().get("customAggregates").is_none());
    }
}
