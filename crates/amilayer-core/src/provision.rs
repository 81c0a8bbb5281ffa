//! # Provisioner Translation
//!
//! Turns provisioner declarations into the ordered build steps of a group.
//! This is a stateless format translation with no graph logic.

use crate::primitives::STAGING_DIR;
use crate::{FileDeclaration, ProvisionerDeclaration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-image override applied to a shell step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOverride {
    pub execute_command: String,
}

impl ShellOverride {
    /// Run the step's script with sudo as `ssh_user`.
    #[must_use]
    pub fn for_user(ssh_user: &str) -> Self {
        Self {
            execute_command: format!("echo '{}' | sudo -S sh '{{{{.Path}}}}'", ssh_user),
        }
    }
}

/// A shell step, either running scripts or inline commands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShellStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<Vec<String>>,
    #[serde(
        rename = "override",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub overrides: BTreeMap<String, ShellOverride>,
}

impl ShellStep {
    /// Only steps declared as `shell` provisioners take per-image overrides.
    /// Inline steps generated for file moves do not.
    #[must_use]
    pub fn takes_overrides(&self) -> bool {
        self.scripts.is_some()
    }
}

/// Upload one file to the build instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStep {
    pub source: String,
    pub destination: String,
}

/// One step of a build specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuildStep {
    Shell(ShellStep),
    File(FileStep),
}

/// Result of translating a group's provisioners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub steps: Vec<BuildStep>,
    /// Number of declarations of an unsupported type that were skipped.
    pub skipped: usize,
}

/// Translate declarations into build steps, preserving order.
pub fn translate(declarations: &[ProvisionerDeclaration]) -> Translation {
    let mut translation = Translation::default();

    for declaration in declarations {
        match declaration {
            ProvisionerDeclaration::Shell { scripts } => {
                translation.steps.push(BuildStep::Shell(ShellStep {
                    scripts: Some(scripts.clone()),
                    ..ShellStep::default()
                }));
            }
            ProvisionerDeclaration::Files { files } => {
                for file in files {
                    translate_file(file, &mut translation.steps);
                }
            }
            ProvisionerDeclaration::Unsupported => {
                translation.skipped = translation.skipped.saturating_add(1);
            }
        }
    }

    translation
}

/// Upload to the staging directory, then move into place with sudo.
fn translate_file(file: &FileDeclaration, steps: &mut Vec<BuildStep>) {
    let file_name = file
        .destination
        .rsplit('/')
        .next()
        .unwrap_or(file.destination.as_str());
    let staged = format!("{}/{}", STAGING_DIR, file_name);

    steps.push(BuildStep::File(FileStep {
        source: file.source.clone(),
        destination: staged.clone(),
    }));

    let mut commands = vec![format!("sudo mv {} {}", staged, file.destination)];
    if let Some(owner) = file.chown.as_deref().filter(|s| !s.is_empty()) {
        commands.push(format!("sudo chown {} {}", owner, file.destination));
    }
    if let Some(mode) = file.chmod.as_deref().filter(|s| !s.is_empty()) {
        commands.push(format!("sudo chmod {} {}", mode, file.destination));
    }

    steps.push(BuildStep::Shell(ShellStep {
        inline: Some(commands),
        ..ShellStep::default()
    }));
}

// =============================================================================
// TESTS
// =============================================================================
