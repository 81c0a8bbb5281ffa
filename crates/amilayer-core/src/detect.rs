//! # Change Detection
//!
//! Per-node change predicates and chain-root selection.
//!
//! A node has changed when its declared version differs from the last built
//! version, or when it was built from an image id that is no longer its
//! parent's current image id. Only the highest node of each contiguous run of
//! changed nodes is selected. Its descendants are re-evaluated against the new
//! parent image on the next invocation, so the rebuild frontier advances one
//! hop per chain per run.

use crate::graph::{ImageGraph, ImageNode};
use crate::AmiLayerError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CHANGE REASON
// =============================================================================

/// Why a node registers as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Declared version differs from the last built version.
    Version,
    /// Built from an image id that is not the parent's current id.
    Ami,
    /// Both of the above.
    VersionAndAmi,
}

impl ChangeReason {
    fn from_flags(version: bool, ami: bool) -> Option<Self> {
        match (version, ami) {
            (true, true) => Some(Self::VersionAndAmi),
            (true, false) => Some(Self::Version),
            (false, true) => Some(Self::Ami),
            (false, false) => None,
        }
    }

    /// Whether the declared version was changed explicitly.
    #[must_use]
    pub fn version_changed(self) -> bool {
        matches!(self, Self::Version | Self::VersionAndAmi)
    }

    /// Whether the parent image id moved.
    #[must_use]
    pub fn ami_changed(self) -> bool {
        matches!(self, Self::Ami | Self::VersionAndAmi)
    }
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Version => write!(f, "version changed"),
            Self::Ami => write!(f, "source image changed"),
            Self::VersionAndAmi => write!(f, "version and source image changed"),
        }
    }
}

// =============================================================================
// CHANGED ROOTS
// =============================================================================

/// The chain roots selected for this invocation, keyed by image name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedRoots {
    roots: BTreeMap<String, ChangeReason>,
}

impl ChangedRoots {
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.roots.contains_key(name)
    }

    /// The reason a root was selected.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ChangeReason> {
        self.roots.get(name).copied()
    }

    /// Selected roots in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ChangeReason)> {
        self.roots.iter().map(|(name, reason)| (name.as_str(), *reason))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

// =============================================================================
// CHANGE DETECTOR
// =============================================================================

/// Evaluates change predicates against a completed graph.
///
/// All predicates are pure functions of the graph and its attached state.
pub struct ChangeDetector<'g> {
    graph: &'g ImageGraph,
}

impl<'g> ChangeDetector<'g> {
    #[must_use]
    pub fn new(graph: &'g ImageGraph) -> Self {
        Self { graph }
    }

    /// A declared version exists and the node was built before.
    #[must_use]
    pub fn has_version(&self, node: &ImageNode) -> bool {
        node.version.is_some() && node.has_current()
    }

    #[must_use]
    pub fn version_changed(&self, node: &ImageNode) -> bool {
        self.has_version(node) && node.version != node.current.ami_version
    }

    /// The node has a parent and the parent was built before.
    #[must_use]
    pub fn has_parent_current(&self, node: &ImageNode) -> bool {
        self.graph
            .parent_of(node)
            .is_some_and(ImageNode::has_current)
    }

    /// The node was built from an image id other than its parent's current one.
    ///
    /// A never-built node cannot register this change.
    #[must_use]
    pub fn ami_changed(&self, node: &ImageNode) -> bool {
        if !node.has_current() {
            return false;
        }
        match self.graph.parent_of(node) {
            Some(parent) if parent.has_current() => {
                node.current.source_ami_id != parent.current.ami_id
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn has_changed(&self, node: &ImageNode) -> bool {
        self.ami_changed(node) || self.version_changed(node)
    }

    /// Why `node` changed, or `None` if it did not.
    #[must_use]
    pub fn reason(&self, node: &ImageNode) -> Option<ChangeReason> {
        ChangeReason::from_flags(self.version_changed(node), self.ami_changed(node))
    }

    /// The highest ancestor reachable from `node` through changed parents.
    ///
    /// Returns `Ok(None)` if `node` itself has not changed.
    pub fn chain_root(&self, node: &'g ImageNode) -> Result<Option<&'g ImageNode>, AmiLayerError> {
        if !self.has_changed(node) {
            return Ok(None);
        }

        let mut seen = BTreeSet::new();
        seen.insert(node.name.as_str());
        let mut root = node;

        while let Some(parent) = self.graph.parent_of(root) {
            if !self.has_parent_current(root) || !self.has_changed(parent) {
                break;
            }
            if !seen.insert(parent.name.as_str()) {
                return Err(AmiLayerError::CycleDetected(vec![
                    node.name.clone(),
                    parent.name.clone(),
                ]));
            }
            root = parent;
        }

        Ok(Some(root))
    }

    /// Select one root per maximal contiguous run of changed nodes.
    pub fn changed_roots(&self) -> Result<ChangedRoots, AmiLayerError> {
        let mut roots = BTreeMap::new();

        for node in self.graph.nodes() {
            if let Some(root) = self.chain_root(node)? {
                if let Some(reason) = self.reason(root) {
                    roots.insert(root.name.clone(), reason);
                }
            }
        }

        Ok(ChangedRoots { roots })
    }
}

// =============================================================================
// TESTS
// =============================================================================
