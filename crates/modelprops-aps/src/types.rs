//! Wire types for the indexing service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Job lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state shared by index builds and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "processing")]
    Processing,
    #[serde(alias = "finished")]
    Finished,
    #[serde(alias = "failed")]
    Failed,
}

impl JobState {
    /// `finished` and `failed` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }

    /// Lowercase name used in logs and tool output.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    /// Opaque index identifier.
    pub index_id: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Error descriptors reported for a failed build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

/// Status of a query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatus {
    /// Opaque query identifier.
    pub query_id: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Error descriptors reported for a failed query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Body of an index build request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    /// Design versions to include in the index.
    pub versions: Vec<VersionRef>,
}

impl IndexRequest {
    /// Request an index over a single design version.
    pub fn single(version_urn: impl Into<String>) -> Self {
        Self {
            versions: vec![VersionRef {
                version_urn: version_urn.into(),
            }],
        }
    }
}

/// Reference to one design version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRef {
    /// Version URN as issued by the document management service.
    pub version_urn: String,
}

/// Structured query payload submitted against an index.
///
/// `query` holds the filter expression; `columns` optionally selects and
/// renames the returned properties. Other top-level keys pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    /// Filter expression selecting elements.
    pub query: Value,
    /// Projection of returned properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Value>,
    /// Any further keys understood by the service.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fields
// ─────────────────────────────────────────────────────────────────────────────

/// One raw field of an index, as listed by the service.
///
/// Every attribute is optional; incomplete records are skipped by consumers
/// rather than treated as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Opaque key used in queries.
    #[serde(default)]
    pub key: Option<String>,
    /// Property category.
    #[serde(default)]
    pub category: Option<String>,
    /// Human-readable property name.
    #[serde(default)]
    pub name: Option<String>,
    /// Value type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Unit of measure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uom: Option<String>,
}

impl FieldDescriptor {
    /// Build a descriptor with the three attributes the catalog uses.
    pub fn new(category: impl Into<String>, name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            category: Some(category.into()),
            name: Some(name.into()),
            field_type: None,
            uom: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// Bearer token for the indexing service.
///
/// Debug output never shows the token itself.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the authorization header.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_state_accepts_both_casings() {
        let upper: JobState = serde_json::from_value(json!("PROCESSING")).unwrap();
        let lower: JobState = serde_json::from_value(json!("finished")).unwrap();
        assert_eq!(upper, JobState::Processing);
        assert_eq!(lower, JobState::Finished);
        assert!(lower.is_terminal());
        assert!(!JobState::Pending.is_terminal());
    }

    #[test]
    fn test_index_status_from_service_payload() {
        let status: IndexStatus = serde_json::from_value(json!({
            "projectId": "p1",
            "indexId": "IDX1",
            "state": "FAILED",
            "errors": [{"code": "E42", "detail": "version not found"}]
        }))
        .unwrap();

        assert_eq!(status.index_id, "IDX1");
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.errors.len(), 1);
    }

    #[test]
    fn test_index_request_wire_format() {
        let body = serde_json::to_value(IndexRequest::single("urn:adsk.wipprod:fs.file:vf.x?version=1"))
            .unwrap();
        assert_eq!(
            body,
            json!({"versions": [{"versionUrn": "urn:adsk.wipprod:fs.file:vf.x?version=1"}]})
        );
    }

    #[test]
    fn test_structured_query_passes_extra_keys() {
        let query: StructuredQuery = serde_json::from_value(json!({
            "query": {"$eq": ["s.props.p5eddc473", "'Walls'"]},
            "columns": {"name": "s.props.p153cb174"},
            "pagination": {"limit": 10}
        }))
        .unwrap();

        assert!(query.columns.is_some());
        assert!(query.extra.contains_key("pagination"));
        let back = serde_json::to_value(&query).unwrap();
        assert_eq!(back["pagination"]["limit"], 10);
    }

    #[test]
    fn test_field_descriptor_tolerates_missing_attributes() {
        let field: FieldDescriptor = serde_json::from_value(json!({"key": "k9"})).unwrap();
        assert_eq!(field.key.as_deref(), Some("k9"));
        assert!(field.category.is_none());
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("eyJhbGciOi");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.secret(), "eyJhbGciOi");
    }
}
