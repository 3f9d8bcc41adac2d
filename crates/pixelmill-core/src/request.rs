//! Structured request surface
//!
//! The JSON alternative to the path grammar. The edits object deserializes
//! straight into the canonical `EditMap`; document order is preserved and
//! unrecognized keys are ignored.

use serde::{Deserialize, Serialize};

use crate::edits::{EditMap, OutputFormat};

/// A structured image-transformation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageRequest {
    pub edits: EditMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

impl ImageRequest {
    pub fn from_json(raw: &[u8]) -> Result<Self, crate::error::PipelineError> {
        serde_json::from_slice(raw)
            .map_err(|e| crate::error::PipelineError::parsing(format!("invalid request: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::{Edit, EditKey};

    #[test]
    fn test_request_parses_edits_in_order() {
        let request = ImageRequest::from_json(
            br#"{"edits": {"grayscale": true, "rotate": 90}, "outputFormat": "png"}"#,
        )
        .unwrap();

        let keys: Vec<_> = request.edits.iter().map(|e| e.key_name()).collect();
        assert_eq!(keys, vec!["grayscale", "rotate"]);
        assert_eq!(request.output_format, Some(OutputFormat::Png));
        assert_eq!(request.edits.get(EditKey::Rotate), Some(&Edit::Rotate(90)));
    }

    #[test]
    fn test_empty_request() {
        let request = ImageRequest::from_json(b"{}").unwrap();
        assert!(request.edits.is_empty());
        assert_eq!(request.output_format, None);
    }

    #[test]
    fn test_invalid_json_is_a_parsing_error() {
        let err = ImageRequest::from_json(b"{").unwrap_err();
        assert_eq!(err.kind(), "parsing");
    }
}
