//! Wire shapes exchanged with remote preference backends.
//!
//! The polling endpoint answers `GET` with the record nested under one of
//! several keys and accepts `PUT` with the record flattened next to the
//! account id. The realtime backend stores one document per account with two
//! extra audit fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PreferenceRecord;

/// Provenance tag written into realtime documents by this crate family.
pub const DOCUMENT_SOURCE: &str = "prefsync";

/// Body of a `PUT` to the polling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutPreferencesBody {
    /// Account id.
    pub uid: String,
    /// The full record, flattened into the body.
    #[serde(flatten)]
    pub record: PreferenceRecord,
}

impl PutPreferencesBody {
    /// Build a body for the given account.
    pub fn new(uid: &str, record: &PreferenceRecord) -> Self {
        Self {
            uid: uid.to_string(),
            record: record.clone().normalized(),
        }
    }
}

/// Find the record inside a `GET` response body.
///
/// Looks at `preferences`, then `data.preferences`, then `data`. The first
/// non-null candidate decides: it must be an object or the response is
/// rejected.
pub fn extract_preferences(payload: &Value) -> Option<PreferenceRecord> {
    let candidates = [
        payload.get("preferences"),
        payload.get("data").and_then(|data| data.get("preferences")),
        payload.get("data"),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_null())?;
    PreferenceRecord::from_value(found)
}

/// A realtime preferences document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    /// The record fields, stored at the top level of the document.
    #[serde(flatten)]
    pub record: PreferenceRecord,
    /// Server-assigned write time. Audit only, never used for ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_updated_at_ms: Option<i64>,
    /// Which writer produced the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl RemoteDocument {
    /// Document for an outbound write. The server fills in its timestamp.
    pub fn outbound(record: &PreferenceRecord) -> Self {
        Self {
            record: record.clone().normalized(),
            server_updated_at_ms: None,
            source: Some(DOCUMENT_SOURCE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_top_level_preferences() {
        let payload = json!({ "preferences": { "language": "en", "updatedAtMs": 5 } });
        let record = extract_preferences(&payload).unwrap();
        assert_eq!(record.language, "en");
        assert_eq!(record.updated_at_ms, 5);
    }

    #[test]
    fn extracts_nested_data_preferences() {
        let payload = json!({ "data": { "preferences": { "currency": "aed" } } });
        assert_eq!(extract_preferences(&payload).unwrap().currency, "AED");
    }

    #[test]
    fn extracts_bare_data() {
        let payload = json!({ "data": { "timezone": "Asia/Dubai", "updatedAtMs": 9 } });
        let record = extract_preferences(&payload).unwrap();
        assert_eq!(record.timezone, "asia/dubai");
        assert_eq!(record.updated_at_ms, 9);
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(extract_preferences(&json!({ "prefs": { "language": "en" } })).is_none());
        assert!(extract_preferences(&json!({ "preferences": "en" })).is_none());
        assert!(extract_preferences(&json!({ "preferences": null })).is_none());
        assert!(extract_preferences(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn put_body_flattens_record() {
        let record = PreferenceRecord::new("en", "usd", "metric", "utc", 300);
        let body = serde_json::to_value(PutPreferencesBody::new("user-1", &record)).unwrap();
        assert_eq!(
            body,
            json!({
                "uid": "user-1",
                "language": "en",
                "currency": "USD",
                "metricSystem": "metric",
                "timezone": "utc",
                "updatedAtMs": 300
            })
        );
    }

    #[test]
    fn remote_document_carries_audit_fields() {
        let record = PreferenceRecord::new("ar", "aed", "metric", "utc", 7);
        let mut doc = RemoteDocument::outbound(&record);
        doc.server_updated_at_ms = Some(1_000);

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["source"], "prefsync");
        assert_eq!(value["serverUpdatedAtMs"], 1_000);
        assert_eq!(value["language"], "ar");

        let back: RemoteDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back.record, record);
        assert_eq!(back.server_updated_at_ms, Some(1_000));
    }
}
