//! # Plan Pipeline
//!
//! Runs one full invocation:
//!
//! ```text
//! declarations + state -> GraphBuilder -> ChangeDetector -> VersionPolicy -> ConfigEmitter
//! ```
//!
//! The pipeline is a pure function of its inputs. Nothing survives between
//! calls; the next invocation starts from the next state snapshot.

use crate::detect::ChangeDetector;
use crate::emit::{BuildSpec, ConfigEmitter, EmitOptions};
use crate::graph::{DuplicatePolicy, GraphBuilder};
use crate::version::{VersionAssignment, VersionPolicy};
use crate::{AmiLayerError, BuildGroup, Diagnostic, StateSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller-supplied switches for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanOptions {
    pub emit: EmitOptions,
    pub duplicates: DuplicatePolicy,
}

/// Everything decided by one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Selected chain roots with their versions, in name order.
    pub images: Vec<VersionAssignment>,
    /// Non-fatal conditions found while planning.
    pub diagnostics: Vec<Diagnostic>,
    /// Build specifications keyed by group name.
    pub specs: BTreeMap<String, BuildSpec>,
}

impl BuildPlan {
    /// Whether nothing needs to be built this run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Decide what to rebuild and produce the build specifications.
pub fn plan(
    groups: &[BuildGroup],
    state: StateSnapshot,
    options: &PlanOptions,
) -> Result<BuildPlan, AmiLayerError> {
    let mut graph = GraphBuilder::build(groups, state, options.duplicates)?;
    let roots = ChangeDetector::new(&graph).changed_roots()?;
    let images = VersionPolicy::apply(&mut graph, &roots)?;
    let emission = ConfigEmitter::new(options.emit).emit(groups, &graph, &roots)?;

    let mut diagnostics = graph.diagnostics().to_vec();
    diagnostics.extend(emission.diagnostics);

    Ok(BuildPlan {
        images,
        diagnostics,
        specs: emission.specs,
    })
}
