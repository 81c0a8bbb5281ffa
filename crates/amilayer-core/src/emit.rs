//! # Config Emitter
//!
//! Assembles the per-group build specifications for the selected roots.
//!
//! - A group renders only if at least one of its images is a selected root
//! - Each selected image yields one builder record
//! - Script shell steps get a per-image `execute_command` override

use crate::detect::ChangedRoots;
use crate::graph::ImageGraph;
use crate::primitives::{BUILDER_TYPE, REGION_SEPARATOR, ami_name};
use crate::provision::{BuildStep, ShellOverride, translate};
use crate::{AmiLayerError, BuildGroup, Diagnostic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// Tags attached to the built image and its snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageTags {
    pub name: String,
    pub ami_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ami_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ami_id: Option<String>,
    pub ssh_username: String,
    pub build_region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_regions: Option<String>,
}

/// One builder of a build specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderRecord {
    #[serde(rename = "type")]
    pub builder_type: String,
    /// Image name.
    pub name: String,
    pub region: String,
    pub ssh_username: String,
    pub instance_type: String,
    pub iam_instance_profile: String,
    pub run_tags: BTreeMap<String, serde_json::Value>,
    /// Omitted in deployment contexts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Parent's current image id; absent for a parentless root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ami: Option<String>,
    pub ami_name: String,
    pub tags: ImageTags,
    pub snapshot_tags: ImageTags,
}

/// The build specification of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Group name.
    pub description: String,
    pub provisioners: Vec<BuildStep>,
    pub builders: Vec<BuilderRecord>,
}

/// Options injected into the emitter by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmitOptions {
    /// Deployment context: builder records carry no `profile`.
    pub deployment: bool,
}

/// Emitter output: specs keyed by group name plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emission {
    pub specs: BTreeMap<String, BuildSpec>,
    pub diagnostics: Vec<Diagnostic>,
}

// =============================================================================
// CONFIG EMITTER
// =============================================================================

pub struct ConfigEmitter {
    options: EmitOptions,
}

impl ConfigEmitter {
    #[must_use]
    pub fn new(options: EmitOptions) -> Self {
        Self { options }
    }

    /// Emit one spec per group that contains a selected root.
    ///
    /// Groups without selected roots have no entry at all.
    pub fn emit(
        &self,
        groups: &[BuildGroup],
        graph: &ImageGraph,
        roots: &ChangedRoots,
    ) -> Result<Emission, AmiLayerError> {
        let mut emission = Emission::default();

        for group in groups {
            let translation = translate(&group.provisioners);
            if translation.skipped > 0 {
                emission.diagnostics.push(Diagnostic::UnsupportedProvisioner {
                    group: group.name.clone(),
                });
            }

            let mut overrides = BTreeMap::new();
            let mut builders = Vec::new();

            // Each declaration of a selected root yields a builder, so every
            // group holding a copy of a duplicated name builds it.
            for declaration in &group.images {
                let Some(reason) = roots.get(&declaration.name) else {
                    continue;
                };

                let node = graph.get(&declaration.name).ok_or_else(|| {
                    AmiLayerError::InvariantViolation(format!(
                        "selected root {} is not in the graph",
                        declaration.name
                    ))
                })?;
                let version = node.version.clone().ok_or_else(|| {
                    AmiLayerError::InvariantViolation(format!(
                        "selected root {} has no assigned version",
                        node.name
                    ))
                })?;

                // Unreachable for roots chosen by the detector: an image change
                // requires a built parent.
                let parent = graph.parent_of(node);
                if reason.ami_changed() && !parent.is_some_and(|p| p.has_current()) {
                    return Err(AmiLayerError::InvariantViolation(format!(
                        "{} selected for an image change without parent state",
                        node.name
                    )));
                }
                let source_ami = parent.and_then(|p| p.current.ami_id.clone());

                let tags = ImageTags {
                    name: ami_name(&node.name, &version),
                    ami_version: version.clone(),
                    source_ami_name: parent.map(|p| p.name.clone()),
                    source_ami_id: source_ami.clone(),
                    ssh_username: declaration.source_ami_user.clone(),
                    build_region: declaration.region.clone(),
                    additional_regions: (!declaration.additional_regions.is_empty())
                        .then(|| declaration.additional_regions.join(REGION_SEPARATOR)),
                };

                overrides.insert(
                    node.name.clone(),
                    ShellOverride::for_user(&declaration.source_ami_user),
                );

                builders.push(BuilderRecord {
                    builder_type: BUILDER_TYPE.to_string(),
                    name: node.name.clone(),
                    region: declaration.region.clone(),
                    ssh_username: declaration.source_ami_user.clone(),
                    instance_type: declaration.instance_type.clone(),
                    iam_instance_profile: declaration.iam_instance_profile.clone(),
                    run_tags: declaration.run_tags.clone(),
                    profile: (!self.options.deployment).then(|| declaration.profile.clone()),
                    source_ami,
                    ami_name: ami_name(&node.name, &version),
                    snapshot_tags: tags.clone(),
                    tags,
                });
            }

            if builders.is_empty() {
                continue;
            }

            let mut steps = translation.steps;
            for step in &mut steps {
                if let BuildStep::Shell(shell) = step
                    && shell.takes_overrides()
                {
                    shell.overrides = overrides.clone();
                }
            }

            emission.specs.insert(
                group.name.clone(),
                BuildSpec {
                    description: group.name.clone(),
                    provisioners: steps,
                    builders,
                },
            );
        }

        Ok(emission)
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
    use crate::version::VersionPolicy;
    use crate::{CurrentState, ImageDeclaration, ProvisionerDeclaration, StateSnapshot};

    fn declaration(name: &str, version: &str, source: Option<&str>) -> ImageDeclaration {
        let mut decl = ImageDeclaration::new(name).with_version(version);
        decl.source_ami_name = source.map(str::to_string);
        decl.region = "eu-west-1".to_string();
        decl.source_ami_user = "ubuntu".to_string();
        decl.instance_type = "t3.small".to_string();
        decl.iam_instance_profile = "packer".to_string();
        decl.profile = "dev".to_string();
        decl.run_tags.insert("Team".to_string(), "infra".into());
        decl
    }

    fn emit(groups: &[BuildGroup], state: StateSnapshot, options: EmitOptions) -> Emission {
        let mut graph =
            GraphBuilder::build(groups, state, DuplicatePolicy::Overwrite).expect("build");
        let roots = ChangeDetector::new(&graph).changed_roots().expect("roots");
        VersionPolicy::apply(&mut graph, &roots).expect("versions");
        ConfigEmitter::new(options)
            .emit(groups, &graph, &roots)
            .expect("emit")
    }

    fn layered_state() -> StateSnapshot {
        let mut state = StateSnapshot::new();
        state.insert("base", CurrentState::new("1.0.0", "ami-ext", "ami-2"));
        state.insert("app", CurrentState::new("1.2.3", "ami-1", "ami-10"));
        state
    }

    #[test]
    fn builder_record_for_ami_change() {
        let mut apps = BuildGroup::new("apps", vec![declaration("app", "1.2.3", Some("base"))]);
        apps.provisioners = vec![ProvisionerDeclaration::Shell {
            scripts: vec!["app.sh".to_string()],
        }];
        let groups = vec![
            BuildGroup::new("bases", vec![declaration("base", "1.0.0", None)]),
            apps,
        ];

        let emission = emit(&groups, layered_state(), EmitOptions::default());

        assert!(!emission.specs.contains_key("bases"));
        let spec = emission.specs.get("apps").expect("apps spec");
        assert_eq!(spec.description, "apps");

        let builder = &spec.builders[0];
        assert_eq!(builder.builder_type, "amazon-ebs");
        assert_eq!(builder.source_ami.as_deref(), Some("ami-2"));
        assert_eq!(builder.ami_name, "app-1.3.0");
        assert_eq!(builder.profile.as_deref(), Some("dev"));
        assert_eq!(builder.tags.name, "app-1.3.0");
        assert_eq!(builder.tags.ami_version, "1.3.0");
        assert_eq!(builder.tags.source_ami_name.as_deref(), Some("base"));
        assert_eq!(builder.tags.source_ami_id.as_deref(), Some("ami-2"));
        assert_eq!(builder.tags.build_region, "eu-west-1");
        assert_eq!(builder.tags.additional_regions, None);
        assert_eq!(builder.tags, builder.snapshot_tags);

        match &spec.provisioners[0] {
            BuildStep::Shell(step) => {
                assert_eq!(
                    step.overrides.get("app"),
                    Some(&ShellOverride::for_user("ubuntu"))
                );
            }
            other => unreachable!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn deployment_omits_profile() {
        let groups = vec![
            BuildGroup::new("bases", vec![declaration("base", "1.0.0", None)]),
            BuildGroup::new("apps", vec![declaration("app", "1.2.3", Some("base"))]),
        ];

        let emission = emit(&groups, layered_state(), EmitOptions { deployment: true });
        let builder = &emission.specs["apps"].builders[0];
        assert_eq!(builder.profile, None);

        let json = serde_json::to_value(builder).expect("serialize");
        assert!(json.get("profile").is_none());
    }

    #[test]
    fn additional_regions_are_comma_joined() {
        let mut app = declaration("app", "1.2.3", Some("base"));
        app.additional_regions = vec!["us-east-1".to_string(), "ap-south-1".to_string()];
        let groups = vec![
            BuildGroup::new("bases", vec![declaration("base", "1.0.0", None)]),
            BuildGroup::new("apps", vec![app]),
        ];

        let emission = emit(&groups, layered_state(), EmitOptions::default());
        let tags = &emission.specs["apps"].builders[0].tags;
        assert_eq!(tags.additional_regions.as_deref(), Some("us-east-1,ap-south-1"));

        let json = serde_json::to_value(tags).expect("serialize");
        assert_eq!(json["AdditionalRegions"], "us-east-1,ap-south-1");
        assert_eq!(json["SshUsername"], "ubuntu");
    }

    #[test]
    fn parentless_root_has_no_source() {
        let mut state = StateSnapshot::new();
        state.insert("base", CurrentState::new("1.9.0", "ami-ext", "ami-2"));
        let groups = vec![BuildGroup::new("bases", vec![declaration("base", "2.0.0", None)])];

        let emission = emit(&groups, state, EmitOptions::default());
        let builder = &emission.specs["bases"].builders[0];
        assert_eq!(builder.source_ami, None);
        assert_eq!(builder.tags.source_ami_name, None);
        assert_eq!(builder.ami_name, "base-2.0.0");
    }

    #[test]
    fn file_move_steps_do_not_take_overrides() {
        let mut apps = BuildGroup::new("apps", vec![declaration("app", "1.2.3", Some("base"))]);
        apps.provisioners = vec![
            ProvisionerDeclaration::Files {
                files: vec![crate::FileDeclaration {
                    source: "a".to_string(),
                    destination: "/etc/a".to_string(),
                    chown: None,
                    chmod: None,
                }],
            },
            ProvisionerDeclaration::Shell {
                scripts: vec!["app.sh".to_string()],
            },
        ];
        let groups = vec![
            BuildGroup::new("bases", vec![declaration("base", "1.0.0", None)]),
            apps,
        ];

        let emission = emit(&groups, layered_state(), EmitOptions::default());
        let steps = &emission.specs["apps"].provisioners;
        assert_eq!(steps.len(), 3);

        let overridden: Vec<bool> = steps
            .iter()
            .map(|s| matches!(s, BuildStep::Shell(shell) if !shell.overrides.is_empty()))
            .collect();
        assert_eq!(overridden, [false, false, true]);
    }

    #[test]
    fn unsupported_provisioner_reported_even_without_builders() {
        let mut bases = BuildGroup::new("bases", vec![declaration("base", "1.0.0", None)]);
        bases.provisioners = vec![ProvisionerDeclaration::Unsupported];

        let emission = emit(&[bases], StateSnapshot::new(), EmitOptions::default());
        assert!(emission.specs.is_empty());
        assert_eq!(
            emission.diagnostics,
            [Diagnostic::UnsupportedProvisioner {
                group: "bases".to_string()
            }]
        );
    }
}
