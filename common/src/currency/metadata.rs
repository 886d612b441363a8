use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to ledger mutations and payment requests.
///
/// Values are restricted to a small tagged set so no dynamically-typed
/// object crosses the domain boundary; the map serializes as a plain JSON
/// object and keeps insertion order.
pub type Metadata = IndexMap<String, MetadataValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(i64),
    Bool(bool),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_object() {
        let mut metadata = Metadata::new();
        metadata.insert("reason".to_string(), "campaign".into());
        metadata.insert("tier".to_string(), 3i64.into());
        metadata.insert("test".to_string(), true.into());

        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"reason":"campaign","tier":3,"test":true}"#);
    }

    #[test]
    fn deserializes_tagged_variants() {
        let metadata: Metadata =
            serde_json::from_str(r#"{"a":"x","b":-7,"c":false}"#).unwrap();
        assert_eq!(metadata["a"], MetadataValue::String("x".to_string()));
        assert_eq!(metadata["b"], MetadataValue::Number(-7));
        assert_eq!(metadata["c"], MetadataValue::Bool(false));
    }
}
