//! # Core Type Definitions
//!
//! This module contains the input and error types for the amilayer engine:
//! - Declarations (`BuildGroup`, `ImageDeclaration`, `ProvisionerDeclaration`)
//! - Last-known build state (`CurrentState`, `StateSnapshot`)
//! - Diagnostics returned to the caller (`Diagnostic`)
//! - Error types (`AmiLayerError`)
//!
//! ## Determinism Guarantees
//!
//! All maps in this module are `BTreeMap`, so serialization and iteration
//! order never depend on hashing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// DECLARATIONS
// =============================================================================

/// A single image build target as declared in configuration.
///
/// Every field except `name` may be omitted and defaults to empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDeclaration {
    /// Unique key of the image within one invocation.
    pub name: String,
    pub description: String,
    /// Declared semantic version, independent of what was last built.
    pub version: Option<String>,
    /// Name of the image this one is layered on.
    pub source_ami_name: Option<String>,
    pub region: String,
    /// SSH user of the source image; also used for sudo in shell steps.
    pub source_ami_user: String,
    pub instance_type: String,
    pub iam_instance_profile: String,
    /// Passed through to the builder untouched.
    pub run_tags: BTreeMap<String, serde_json::Value>,
    pub profile: String,
    pub additional_regions: Vec<String>,
}

impl ImageDeclaration {
    /// Create a declaration with only a name set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the declared version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the source image reference.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_ami_name = Some(source.into());
        self
    }

    /// The source reference, if one is declared and non-empty.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source_ami_name.as_deref().filter(|s| !s.is_empty())
    }
}

/// A file to upload as part of a `files` provisioner.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDeclaration {
    pub source: String,
    pub destination: String,
    pub chown: Option<String>,
    pub chmod: Option<String>,
}

/// A provisioning declaration attached to a build group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProvisionerDeclaration {
    /// Run a list of scripts through the shell.
    Shell {
        #[serde(default)]
        scripts: Vec<String>,
    },
    /// Upload files and move them into place with sudo.
    Files {
        #[serde(default)]
        files: Vec<FileDeclaration>,
    },
    /// Any provisioner type this tool does not translate.
    #[serde(other)]
    Unsupported,
}

/// A named group of images sharing one set of provisioners.
///
/// Each group renders to at most one build specification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildGroup {
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageDeclaration>,
    #[serde(default)]
    pub provisioners: Vec<ProvisionerDeclaration>,
}

impl BuildGroup {
    /// Create a group with images and no provisioners.
    #[must_use]
    pub fn new(name: impl Into<String>, images: Vec<ImageDeclaration>) -> Self {
        Self {
            name: name.into(),
            images,
            provisioners: Vec::new(),
        }
    }
}

// =============================================================================
// CURRENT STATE
// =============================================================================

/// Observable attributes of the last successful build of one image.
///
/// Attributes other than the three the engine reads are kept verbatim. A
/// known attribute recorded as `null` is kept in `extra`, so a record with any
/// key at all counts as built.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CurrentState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ami_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ami_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ami_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl<'de> Deserialize<'de> for CurrentState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut extra = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut take = |key: &str| -> Result<Option<String>, D::Error> {
            match extra.remove(key) {
                None => Ok(None),
                Some(serde_json::Value::String(value)) => Ok(Some(value)),
                Some(serde_json::Value::Null) => {
                    extra.insert(key.to_string(), serde_json::Value::Null);
                    Ok(None)
                }
                Some(other) => Err(serde::de::Error::custom(format!(
                    "{} must be a string, got {}",
                    key, other
                ))),
            }
        };

        let ami_version = take("ami_version")?;
        let source_ami_id = take("source_ami_id")?;
        let ami_id = take("ami_id")?;
        Ok(Self {
            ami_version,
            source_ami_id,
            ami_id,
            extra,
        })
    }
}

impl CurrentState {
    /// Create a state record from the three attributes the engine reads.
    #[must_use]
    pub fn new(
        ami_version: impl Into<String>,
        source_ami_id: impl Into<String>,
        ami_id: impl Into<String>,
    ) -> Self {
        Self {
            ami_version: Some(ami_version.into()),
            source_ami_id: Some(source_ami_id.into()),
            ami_id: Some(ami_id.into()),
            extra: BTreeMap::new(),
        }
    }

    /// An empty record means the image has never been built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ami_version.is_none()
            && self.source_ami_id.is_none()
            && self.ami_id.is_none()
            && self.extra.is_empty()
    }
}

/// Last-known state of every image, keyed by image name.
///
/// The snapshot is an input value: it is handed to the graph builder by
/// value and nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSnapshot(BTreeMap<String, CurrentState>);

impl StateSnapshot {
    /// Create an empty snapshot (nothing built yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state of one image.
    pub fn insert(&mut self, name: impl Into<String>, state: CurrentState) {
        self.0.insert(name.into(), state);
    }

    /// Look up the state of one image.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CurrentState> {
        self.0.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<CurrentState> {
        self.0.remove(name)
    }
}

impl<K: Into<String>> FromIterator<(K, CurrentState)> for StateSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, CurrentState)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// A non-fatal condition found while planning.
///
/// The core does not log; callers decide how to report these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An image name was declared more than once; the last declaration won.
    DuplicateImage { name: String },
    /// A provisioner of an unknown type was skipped.
    UnsupportedProvisioner { group: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateImage { name } => write!(f, "Duplicate declaration: {}", name),
            Self::UnsupportedProvisioner { group } => {
                write!(f, "Skipped unsupported provisioner in group {}", group)
            }
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the amilayer system.
///
/// - No silent failures
/// - Use `Result<T, AmiLayerError>` for fallible operations
/// - The CORE never panics on input; every error is returned
#[derive(Debug, Error)]
pub enum AmiLayerError {
    /// A declared version is not a valid semantic version.
    #[error("Invalid version '{version}' for image {image}: {reason}")]
    InvalidVersion {
        image: String,
        version: String,
        reason: String,
    },

    /// An image needs an automatic bump but declares no version.
    #[error("Image {0} changed its source image but declares no version to bump")]
    MissingVersion(String),

    /// Source references form a cycle.
    #[error("Cycle in source images: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// An image name was declared more than once under the reject policy.
    #[error("Duplicate image declaration: {0}")]
    DuplicateImage(String),

    /// An internal consistency check failed.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_declaration_fields_default_to_empty() {
        let decl: ImageDeclaration =
            serde_json::from_str(r#"{"name":"base"}"#).expect("deserialize");
        assert_eq!(decl.name, "base");
        assert!(decl.version.is_none());
        assert!(decl.region.is_empty());
        assert!(decl.run_tags.is_empty());
        assert!(decl.additional_regions.is_empty());
    }

    #[test]
    fn empty_source_reference_is_no_source() {
        let decl = ImageDeclaration::new("app").with_source("");
        assert_eq!(decl.source(), None);

        let decl = ImageDeclaration::new("app").with_source("base");
        assert_eq!(decl.source(), Some("base"));
    }

    #[test]
    fn current_state_keeps_unknown_attributes() {
        let state: CurrentState = serde_json::from_str(
            r#"{"ami_version":"1.0.0","ami_id":"ami-1","built_at":"2024-01-01"}"#,
        )
        .expect("deserialize");

        assert_eq!(state.ami_version.as_deref(), Some("1.0.0"));
        assert!(state.source_ami_id.is_none());
        assert_eq!(
            state.extra.get("built_at"),
            Some(&serde_json::Value::String("2024-01-01".to_string()))
        );
        assert!(!state.is_empty());
    }

    #[test]
    fn empty_state_object_is_never_built() {
        let state: CurrentState = serde_json::from_str("{}").expect("deserialize");
        assert!(state.is_empty());
    }

    #[test]
    fn null_attribute_still_counts_as_built() {
        let state: CurrentState =
            serde_json::from_str(r#"{"ami_id":null}"#).expect("deserialize");
        assert!(state.ami_id.is_none());
        assert!(!state.is_empty());

        let json = serde_json::to_string(&state).expect("serialize");
        assert_eq!(json, r#"{"ami_id":null}"#);
    }

    #[test]
    fn non_string_attribute_is_rejected() {
        let result = serde_json::from_str::<CurrentState>(r#"{"ami_version":3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn run_tags_keep_non_string_values() {
        let decl: ImageDeclaration = serde_json::from_str(
            r#"{"name":"base","run_tags":{"Team":"infra","Cost":12,"Spot":true}}"#,
        )
        .expect("deserialize");

        assert_eq!(decl.run_tags["Cost"], serde_json::json!(12));
        assert_eq!(decl.run_tags["Spot"], serde_json::json!(true));
        let json = serde_json::to_value(&decl).expect("serialize");
        assert_eq!(json["run_tags"]["Cost"], 12);
    }

    #[test]
    fn provisioner_types_deserialize() {
        let provisioners: Vec<ProvisionerDeclaration> = serde_json::from_str(
            r#"[
                {"type":"shell","scripts":["a.sh"]},
                {"type":"files","files":[{"source":"a","destination":"/etc/a"}]},
                {"type":"ansible","playbook":"site.yml"}
            ]"#,
        )
        .expect("deserialize");

        assert_eq!(
            provisioners[0],
            ProvisionerDeclaration::Shell {
                scripts: vec!["a.sh".to_string()]
            }
        );
        assert!(matches!(
            provisioners[1],
            ProvisionerDeclaration::Files { ref files } if files.len() == 1
        ));
        assert_eq!(provisioners[2], ProvisionerDeclaration::Unsupported);
    }

    #[test]
    fn snapshot_is_ordered_by_name() {
        let snapshot: StateSnapshot = [
            ("zeta", CurrentState::new("1.0.0", "ami-0", "ami-z")),
            ("alpha", CurrentState::new("1.0.0", "ami-0", "ami-a")),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&snapshot).expect("serialize");
        assert!(json.find("alpha") < json.find("zeta"));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn cycle_error_shows_chain() {
        let err = AmiLayerError::CycleDetected(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(err.to_string(), "Cycle in source images: a -> b -> a");
    }
}
