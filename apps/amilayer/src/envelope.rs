//! # External Data Envelope
//!
//! The stdin/stdout contract used when amilayer runs as an external data
//! source. The query is one JSON object whose values are strings; the two
//! inputs arrive as JSON documents encoded inside those strings. The result
//! is one JSON object mapping each group name to its JSON-encoded build
//! specification.

use amilayer_core::{AmiLayerError, BuildGroup, BuildSpec, StateSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The query object read from stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalQuery {
    /// JSON object: image name -> last built state.
    pub current_images: String,
    /// JSON array of build groups.
    pub image_definitions: String,
}

impl ExternalQuery {
    /// Parse the query object.
    pub fn parse(input: &str) -> Result<Self, AmiLayerError> {
        if input.trim().is_empty() {
            return Err(AmiLayerError::DeserializationError(
                "empty query on stdin".to_string(),
            ));
        }
        serde_json::from_str(input)
            .map_err(|e| AmiLayerError::DeserializationError(format!("query: {}", e)))
    }

    /// Decode the nested state snapshot.
    pub fn state(&self) -> Result<StateSnapshot, AmiLayerError> {
        serde_json::from_str(&self.current_images)
            .map_err(|e| AmiLayerError::DeserializationError(format!("current_images: {}", e)))
    }

    /// Decode the nested group declarations.
    pub fn groups(&self) -> Result<Vec<BuildGroup>, AmiLayerError> {
        serde_json::from_str(&self.image_definitions).map_err(|e| {
            AmiLayerError::DeserializationError(format!("image_definitions: {}", e))
        })
    }
}

/// Encode each spec as a JSON string, keyed by group name.
pub fn encode_specs(
    specs: &BTreeMap<String, BuildSpec>,
) -> Result<BTreeMap<String, String>, AmiLayerError> {
    specs
        .iter()
        .map(|(group, spec)| {
            serde_json::to_string(spec)
                .map(|json| (group.clone(), json))
                .map_err(|e| AmiLayerError::SerializationError(e.to_string()))
        })
        .collect()
}

/// Render the full response document.
pub fn render_response(specs: &BTreeMap<String, BuildSpec>) -> Result<String, AmiLayerError> {
    let encoded = encode_specs(specs)?;
    serde_json::to_string(&encoded).map_err(|e| AmiLayerError::SerializationError(e.to_string()))
}
