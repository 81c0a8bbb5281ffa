//! # amilayer-core
//!
//! The deterministic change-detection engine for amilayer - THE LOGIC.
//!
//! Given a declared graph of layered machine images and the last successfully
//! built state of each image, this crate decides which images to rebuild in
//! this run, assigns each a version, and emits the build specification of
//! every affected group.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is a pure function of (declarations, state snapshot, options)
//! - Is invocation-scoped: nothing is cached between calls
//! - Has NO async, NO I/O, NO environment reads
//! - Reports non-fatal conditions as `Diagnostic`s instead of logging

// =============================================================================
// MODULES
// =============================================================================

pub mod detect;
pub mod emit;
pub mod graph;
pub mod plan;
pub mod primitives;
pub mod provision;
pub mod types;
pub mod version;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AmiLayerError, BuildGroup, CurrentState, Diagnostic, FileDeclaration, ImageDeclaration,
    ProvisionerDeclaration, StateSnapshot,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use detect::{ChangeDetector, ChangeReason, ChangedRoots};
pub use emit::{BuildSpec, BuilderRecord, ConfigEmitter, EmitOptions, Emission, ImageTags};
pub use graph::{DuplicatePolicy, GraphBuilder, ImageGraph, ImageNode};
pub use plan::{BuildPlan, PlanOptions, plan};
pub use provision::{BuildStep, FileStep, ShellOverride, ShellStep};
pub use version::{VersionAssignment, VersionPolicy, bump_minor};
