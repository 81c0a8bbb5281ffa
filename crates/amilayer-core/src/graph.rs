//! # Image Graph
//!
//! The invocation-scoped dependency graph of machine images.
//!
//! Nodes are keyed by image name in a `BTreeMap`. Parent and child links are
//! stored as names, so a node never owns its relatives.

use crate::{AmiLayerError, BuildGroup, CurrentState, Diagnostic, ImageDeclaration, StateSnapshot};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// IMAGE NODE
// =============================================================================

/// One image in the graph together with its last-known build state.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNode {
    /// Unique key of the image.
    pub name: String,
    pub description: String,
    /// Declared version. The version policy may replace it with a bump.
    pub version: Option<String>,
    /// Last successful build; empty if the image was never built.
    pub current: CurrentState,
    parent: Option<String>,
    children: Vec<String>,
}

impl ImageNode {
    /// Create an unlinked node from its declaration.
    #[must_use]
    pub fn from_declaration(declaration: &ImageDeclaration) -> Self {
        Self {
            name: declaration.name.clone(),
            description: declaration.description.clone(),
            version: declaration.version.clone(),
            current: CurrentState::default(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Name of the image this one is layered on.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Names of images layered on this one, in link order.
    #[must_use]
    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Whether a previous build of this image is known.
    #[must_use]
    pub fn has_current(&self) -> bool {
        !self.current.is_empty()
    }
}

// =============================================================================
// IMAGE GRAPH
// =============================================================================

/// The `name -> ImageNode` mapping for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ImageGraph {
    nodes: BTreeMap<String, ImageNode>,
    diagnostics: Vec<Diagnostic>,
}

impl ImageGraph {
    /// Look up a node by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ImageNode> {
        self.nodes.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ImageNode> {
        self.nodes.get_mut(name)
    }

    /// The parent node of `node`, if it has one.
    #[must_use]
    pub fn parent_of(&self, node: &ImageNode) -> Option<&ImageNode> {
        node.parent().and_then(|name| self.nodes.get(name))
    }

    /// All nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &ImageNode> {
        self.nodes.values()
    }

    /// Diagnostics raised while building the graph.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk from `name` up through its ancestors, nearest first.
    ///
    /// Returns `CycleDetected` if the walk revisits a node.
    pub fn ancestors(&self, name: &str) -> Result<Vec<&ImageNode>, AmiLayerError> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        seen.insert(name);

        let mut current = self.nodes.get(name);
        while let Some(parent) = current.and_then(|node| self.parent_of(node)) {
            if !seen.insert(parent.name.as_str()) {
                let mut names: Vec<String> = std::iter::once(name.to_string())
                    .chain(chain.iter().map(|n: &&ImageNode| n.name.clone()))
                    .collect();
                names.push(parent.name.clone());
                return Err(AmiLayerError::CycleDetected(names));
            }
            chain.push(parent);
            current = Some(parent);
        }

        Ok(chain)
    }

    fn link(&mut self, child: &str, parent: &str) {
        let previous = match self.nodes.get_mut(child) {
            Some(node) => node.parent.replace(parent.to_string()),
            None => return,
        };

        if let Some(previous) = previous
            && let Some(old) = self.nodes.get_mut(&previous)
        {
            old.children.retain(|c| c != child);
        }

        if let Some(node) = self.nodes.get_mut(parent)
            && !node.children.iter().any(|c| c == child)
        {
            node.children.push(child.to_string());
        }
    }

    fn check_acyclic(&self) -> Result<(), AmiLayerError> {
        let mut verified: BTreeSet<&str> = BTreeSet::new();
        for name in self.nodes.keys() {
            if verified.contains(name.as_str()) {
                continue;
            }
            let chain = self.ancestors(name)?;
            verified.insert(name.as_str());
            verified.extend(chain.iter().map(|n| n.name.as_str()));
        }
        Ok(())
    }
}

// =============================================================================
// GRAPH BUILDER
// =============================================================================

/// What to do when two declarations share an image name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// The later declaration replaces the earlier one and a diagnostic is raised.
    #[default]
    Overwrite,
    /// Planning fails with `AmiLayerError::DuplicateImage`.
    Reject,
}

/// Builds an `ImageGraph` from declarations and the last-known state.
pub struct GraphBuilder;

impl GraphBuilder {
    /// Build the graph in two passes.
    ///
    /// Pass 1 creates one node per declaration and attaches its state.
    /// Pass 2 links every declaration whose source reference names a known
    /// image. Unresolved references leave the node as a root.
    pub fn build(
        groups: &[BuildGroup],
        mut state: StateSnapshot,
        duplicates: DuplicatePolicy,
    ) -> Result<ImageGraph, AmiLayerError> {
        let mut graph = ImageGraph::default();

        for declaration in groups.iter().flat_map(|g| g.images.iter()) {
            if graph.nodes.contains_key(&declaration.name) {
                if duplicates == DuplicatePolicy::Reject {
                    return Err(AmiLayerError::DuplicateImage(declaration.name.clone()));
                }
                graph.diagnostics.push(Diagnostic::DuplicateImage {
                    name: declaration.name.clone(),
                });
            }
            graph.nodes.insert(
                declaration.name.clone(),
                ImageNode::from_declaration(declaration),
            );
        }

        for node in graph.nodes.values_mut() {
            if let Some(current) = state.take(&node.name) {
                node.current = current;
            }
        }

        // Every declaration links against the surviving node; the last
        // resolving source of a duplicated name wins.
        for declaration in groups.iter().flat_map(|g| g.images.iter()) {
            if let Some(source) = declaration.source()
                && graph.nodes.contains_key(source)
            {
                graph.link(&declaration.name, source);
            }
        }

        graph.check_acyclic()?;
        Ok(graph)
    }
}

// =============================================================================
// TESTS
// =============================================================================
