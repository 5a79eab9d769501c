//! Typed order metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize};

/// Annotations carried alongside an order through every stage.
///
/// Known keys are typed fields; `extra` holds anything genuinely unstructured
/// (client address, user agent and the like).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl OrderMetadata {
    /// Returns the correlation id as a string, empty when none was assigned.
    pub fn correlation_id_or_empty(&self) -> String {
        self.correlation_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}
