//! # Version Policy
//!
//! Assigns the output version of every selected chain root.
//!
//! A root selected only because its parent image moved gets a minor bump of
//! its declared version. A root whose declared version changed keeps that
//! version as written.

use crate::detect::{ChangeReason, ChangedRoots};
use crate::graph::ImageGraph;
use crate::AmiLayerError;
use semver::Version;
use serde::{Deserialize, Serialize};

/// The version decided for one selected root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionAssignment {
    pub image: String,
    pub reason: ChangeReason,
    /// Version of the last successful build, if any.
    pub previous: Option<String>,
    /// Version the image will be built as.
    pub version: String,
    /// Whether `version` was derived by a minor bump.
    pub bumped: bool,
}

/// Increment the minor component of a semantic version.
///
/// The patch component resets to zero; pre-release and build metadata are
/// dropped.
pub fn bump_minor(version: &str) -> Result<String, semver::Error> {
    let parsed = Version::parse(version)?;
    Ok(Version::new(parsed.major, parsed.minor.saturating_add(1), 0).to_string())
}

pub struct VersionPolicy;

impl VersionPolicy {
    /// Decide and write back the version of every root in `roots`.
    ///
    /// The graph is mutated in place: bumped roots carry their new version
    /// for the emitter. Assignments are returned in root name order.
    pub fn apply(
        graph: &mut ImageGraph,
        roots: &ChangedRoots,
    ) -> Result<Vec<VersionAssignment>, AmiLayerError> {
        let mut assignments = Vec::with_capacity(roots.len());

        for (name, reason) in roots.iter() {
            let node = graph.get_mut(name).ok_or_else(|| {
                AmiLayerError::InvariantViolation(format!("selected root {} is not in the graph", name))
            })?;

            let declared = node
                .version
                .clone()
                .ok_or_else(|| AmiLayerError::MissingVersion(name.to_string()))?;

            let bumped = reason.ami_changed() && !reason.version_changed();
            let version = if bumped {
                bump_minor(&declared).map_err(|e| AmiLayerError::InvalidVersion {
                    image: name.to_string(),
                    version: declared.clone(),
                    reason: e.to_string(),
                })?
            } else {
                declared
            };

            node.version = Some(version.clone());
            assignments.push(VersionAssignment {
                image: name.to_string(),
                reason,
                previous: node.current.ami_version.clone(),
                version,
                bumped,
            });
        }

        Ok(assignments)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ChangeDetector;
    use crate::graph::{DuplicatePolicy, GraphBuilder};
    use crate::{BuildGroup, CurrentState, ImageDeclaration, StateSnapshot};

    fn plan_versions(
        images: Vec<ImageDeclaration>,
        state: StateSnapshot,
    ) -> (ImageGraph, Result<Vec<VersionAssignment>, AmiLayerError>) {
        let mut graph = GraphBuilder::build(
            &[BuildGroup::new("group", images)],
            state,
            DuplicatePolicy::Overwrite,
        )
        .expect("build");
        let roots = ChangeDetector::new(&graph).changed_roots().expect("roots");
        let result = VersionPolicy::apply(&mut graph, &roots);
        (graph, result)
    }

    #[test]
    fn bump_minor_resets_patch() {
        assert_eq!(bump_minor("1.2.3").expect("bump"), "1.3.0");
        assert_eq!(bump_minor("0.9.0").expect("bump"), "0.10.0");
        assert_eq!(bump_minor("2.0.0-rc.1+build.5").expect("bump"), "2.1.0");
    }

    #[test]
    fn bump_minor_rejects_garbage() {
        assert!(bump_minor("latest").is_err());
        assert!(bump_minor("1.2").is_err());
    }

    #[test]
    fn ami_only_change_bumps_minor() {
        let mut state = StateSnapshot::new();
        state.insert("base", CurrentState::new("1.0.0", "ami-0", "ami-2"));
        state.insert("app", CurrentState::new("1.2.3", "ami-1", "ami-10"));
        let (graph, result) = plan_versions(
            vec![
                ImageDeclaration::new("base").with_version("1.0.0"),
                ImageDeclaration::new("app").with_version("1.2.3").with_source("base"),
            ],
            state,
        );

        let assignments = result.expect("apply");
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].version, "1.3.0");
        assert_eq!(assignments[0].previous.as_deref(), Some("1.2.3"));
        assert!(assignments[0].bumped);
        assert_eq!(
            graph.get("app").and_then(|n| n.version.as_deref()),
            Some("1.3.0")
        );
    }

    #[test]
    fn explicit_version_wins_over_ami_change() {
        let mut state = StateSnapshot::new();
        state.insert("base", CurrentState::new("1.0.0", "ami-0", "ami-2"));
        state.insert("app", CurrentState::new("1.4.0", "ami-1", "ami-10"));
        let (_, result) = plan_versions(
            vec![
                ImageDeclaration::new("base").with_version("1.0.0"),
                ImageDeclaration::new("app").with_version("1.5.0").with_source("base"),
            ],
            state,
        );

        let assignments = result.expect("apply");
        assert_eq!(assignments[0].reason, ChangeReason::VersionAndAmi);
        assert_eq!(assignments[0].version, "1.5.0");
        assert!(!assignments[0].bumped);
    }

    #[test]
    fn explicit_version_is_not_validated() {
        let mut state = StateSnapshot::new();
        state.insert("base", CurrentState::new("2023.1", "ami-0", "ami-1"));
        let (_, result) =
            plan_versions(vec![ImageDeclaration::new("base").with_version("2024.1")], state);

        assert_eq!(result.expect("apply")[0].version, "2024.1");
    }

    #[test]
    fn invalid_version_on_bump_is_fatal() {
        let mut state = StateSnapshot::new();
        state.insert("base", CurrentState::new("1.0.0", "ami-0", "ami-2"));
        state.insert("app", CurrentState::new("v1", "ami-1", "ami-10"));
        let (_, result) = plan_versions(
            vec![
                ImageDeclaration::new("base").with_version("1.0.0"),
                ImageDeclaration::new("app").with_version("v1").with_source("base"),
            ],
            state,
        );

        assert!(matches!(
            result,
            Err(AmiLayerError::InvalidVersion { ref image, .. }) if image == "app"
        ));
    }

    #[test]
    fn missing_version_on_bump_is_fatal() {
        let mut state = StateSnapshot::new();
        state.insert("base", CurrentState::new("1.0.0", "ami-0", "ami-2"));
        state.insert("app", CurrentState::new("1.0.0", "ami-1", "ami-10"));
        let (_, result) = plan_versions(
            vec![
                ImageDeclaration::new("base").with_version("1.0.0"),
                ImageDeclaration::new("app").with_source("base"),
            ],
            state,
        );

        assert!(matches!(result, Err(AmiLayerError::MissingVersion(ref n)) if n == "app"));
    }
}
