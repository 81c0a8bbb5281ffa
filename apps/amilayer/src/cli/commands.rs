//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::Settings;
use crate::envelope::{ExternalQuery, render_response};
use amilayer_core::{
    AmiLayerError, BuildGroup, BuildPlan, StateSnapshot, plan, primitives::MAX_INPUT_FILE_SIZE,
};
use serde::Deserialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), AmiLayerError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| AmiLayerError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(AmiLayerError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve symlinks and "..", and make sure the path is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, AmiLayerError> {
    let canonical = path.canonicalize().map_err(|e| {
        AmiLayerError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(AmiLayerError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve the template path of `group` inside the output directory.
///
/// The group name must be a single plain file name component.
fn validate_output_path(output: &Path, group: &str) -> Result<PathBuf, AmiLayerError> {
    let mut components = Path::new(group).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    if !plain || group.contains(['/', '\\']) {
        return Err(AmiLayerError::IoError(format!(
            "Group name '{}' is not a valid file name",
            group
        )));
    }

    let canonical_dir = output.canonicalize().map_err(|e| {
        AmiLayerError::IoError(format!(
            "Invalid output directory '{}': {}",
            output.display(),
            e
        ))
    })?;
    if !canonical_dir.is_dir() {
        return Err(AmiLayerError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            output.display()
        )));
    }

    Ok(canonical_dir.join(format!("{}.json", group)))
}

/// Read a bounded input file as UTF-8.
fn read_input(path: &Path) -> Result<String, AmiLayerError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_INPUT_FILE_SIZE)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| AmiLayerError::IoError(format!("Read file: {}", e)))
}

// =============================================================================
// INPUT LOADING
// =============================================================================

/// TOML has no top-level arrays, so groups live under a `groups` key.
#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    #[serde(default)]
    groups: Vec<BuildGroup>,
}

/// Load group declarations from a `.toml` or JSON file.
pub fn load_definitions(path: &Path) -> Result<Vec<BuildGroup>, AmiLayerError> {
    let text = read_input(path)?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let groups = if is_toml {
        toml::from_str::<DefinitionsFile>(&text)
            .map(|file| file.groups)
            .map_err(|e| AmiLayerError::DeserializationError(format!("definitions: {}", e)))?
    } else {
        serde_json::from_str(&text)
            .map_err(|e| AmiLayerError::DeserializationError(format!("definitions: {}", e)))?
    };

    tracing::debug!("Loaded {} groups from {}", groups.len(), path.display());
    Ok(groups)
}

/// Load the state snapshot, or start empty when there is none yet.
pub fn load_state(path: Option<&Path>) -> Result<StateSnapshot, AmiLayerError> {
    let Some(path) = path else {
        tracing::info!("No state file given; treating every image as never built");
        return Ok(StateSnapshot::new());
    };

    let text = read_input(path)?;
    let state: StateSnapshot = serde_json::from_str(&text)
        .map_err(|e| AmiLayerError::DeserializationError(format!("state: {}", e)))?;
    tracing::debug!("Loaded state for {} images", state.len());
    Ok(state)
}

/// Run the core and report what it decided.
pub fn run_plan(
    settings: &Settings,
    groups: &[BuildGroup],
    state: StateSnapshot,
) -> Result<BuildPlan, AmiLayerError> {
    let plan = plan(groups, state, &settings.plan_options())?;

    for diagnostic in &plan.diagnostics {
        tracing::warn!("{}", diagnostic);
    }
    for image in &plan.images {
        tracing::info!(
            image = %image.image,
            version = %image.version,
            reason = %image.reason,
            "Selected for rebuild"
        );
    }
    tracing::debug!(groups = plan.specs.len(), "Plan complete");

    Ok(plan)
}

// =============================================================================
// EXTERNAL COMMAND
// =============================================================================

/// Answer one external data source query.
pub fn cmd_external(settings: &Settings) -> Result<(), AmiLayerError> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| AmiLayerError::IoError(format!("Read stdin: {}", e)))?;

    let query = ExternalQuery::parse(&input)?;
    let plan = run_plan(settings, &query.groups()?, query.state()?)?;
    let response = render_response(&plan.specs)?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(response.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| AmiLayerError::IoError(format!("Write stdout: {}", e)))
}

// =============================================================================
// PLAN COMMAND
// =============================================================================

/// Show the selected images.
pub fn cmd_plan(
    settings: &Settings,
    json_mode: bool,
    definitions: &Path,
    state: Option<&Path>,
) -> Result<(), AmiLayerError> {
    let groups = load_definitions(definitions)?;
    let plan = run_plan(settings, &groups, load_state(state)?)?;

    if json_mode {
        let output = serde_json::json!({
            "images": plan.images,
            "groups": plan.specs.keys().collect::<Vec<_>>(),
            "diagnostics": plan.diagnostics,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)
                .map_err(|e| AmiLayerError::SerializationError(e.to_string()))?
        );
        return Ok(());
    }

    println!("amilayer Plan");
    println!("=============");

    if plan.images.is_empty() {
        println!("Nothing to rebuild.");
        return Ok(());
    }

    for image in &plan.images {
        println!(
            "  {:<24} {} -> {} ({})",
            image.image,
            image.previous.as_deref().unwrap_or("-"),
            image.version,
            image.reason
        );
    }
    println!();
    println!(
        "Groups: {}",
        plan.specs.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    Ok(())
}

// =============================================================================
// RENDER COMMAND
// =============================================================================

/// Write one template per affected group.
pub fn cmd_render(
    settings: &Settings,
    definitions: &Path,
    state: Option<&Path>,
    output: &Path,
) -> Result<(), AmiLayerError> {
    let groups = load_definitions(definitions)?;
    let plan = run_plan(settings, &groups, load_state(state)?)?;

    std::fs::create_dir_all(output).map_err(|e| {
        AmiLayerError::IoError(format!(
            "Invalid output directory '{}': {}",
            output.display(),
            e
        ))
    })?;

    // Check every target before writing any of them.
    let targets = plan
        .specs
        .iter()
        .map(|(group, spec)| validate_output_path(output, group).map(|path| (path, spec)))
        .collect::<Result<Vec<_>, _>>()?;

    for (path, spec) in targets {
        let data = serde_json::to_vec_pretty(spec)
            .map_err(|e| AmiLayerError::SerializationError(e.to_string()))?;
        std::fs::write(&path, &data)
            .map_err(|e| AmiLayerError::IoError(format!("Write file: {}", e)))?;
        println!("Wrote {}", path.display());
    }

    if plan.specs.is_empty() {
        println!("Nothing to rebuild.");
    }

    Ok(())
}
