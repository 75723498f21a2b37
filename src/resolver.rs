//! Picks the first artifact of a tool version that can run on this host.
//!
//! Artifacts are tried in declaration order. A docker artifact needs the
//! docker binary; an interpreted executable needs its interpreter on PATH
//! (CPU architecture and platform are ignored for those); a plain executable
//! needs a matching arch/platform pair. Declared requirements are an OR
//! list: one satisfied requirement accepts the artifact.
//!
//! When nothing matches, the error carries one reason set per artifact, in
//! declaration order, so the caller can print a useful diagnostic.

use crate::registry::{Interpreter, Requirement, ToolArtifact};
use crate::sys;
use std::fmt;

/// Why a single artifact was rejected.
#[derive(Debug)]
pub struct ArtifactIncompatibility {
    pub reasons: Vec<String>,
}

/// No artifact of the version is runnable here.
#[derive(Debug)]
pub struct ResolutionError {
    pub artifacts: Vec<ArtifactIncompatibility>,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "no runnable artifact found for your system:")?;
        for (idx, artifact) in self.artifacts.iter().enumerate() {
            for reason in &artifact.reasons {
                writeln!(f, "  artifact #{}: {}", idx + 1, reason)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {}

/// Return the first artifact whose platform, interpreter and requirements
/// are all satisfied on this host.
pub fn find_runnable_artifact(
    artifacts: &[ToolArtifact],
) -> Result<&ToolArtifact, ResolutionError> {
    let mut incompatibilities = Vec::with_capacity(artifacts.len());

    for artifact in artifacts {
        let reasons = collect_incompatibilities(artifact);
        if reasons.is_empty() {
            return Ok(artifact);
        }
        incompatibilities.push(ArtifactIncompatibility { reasons });
    }

    Err(ResolutionError {
        artifacts: incompatibilities,
    })
}

/// Every reason this artifact cannot run here; empty means runnable.
fn collect_incompatibilities(artifact: &ToolArtifact) -> Vec<String> {
    match artifact {
        ToolArtifact::Docker(_) => {
            let mut reasons = Vec::new();
            if !sys::docker_available() {
                reasons.push("docker is not installed on your system".to_string());
            }
            reasons
        }
        ToolArtifact::Executable(exec) => match &exec.interpreter {
            Some(interpreter) => {
                let mut reasons = Vec::new();
                if !interpreter_available(interpreter) {
                    reasons.push(format!(
                        "interpreter '{}' is not available",
                        interpreter.name()
                    ));
                }
                reasons.extend(requirement_failures(&exec.require));
                reasons
            }
            None => {
                let mut reasons = Vec::new();
                if exec.arch != "*" && exec.arch != sys::arch() {
                    reasons.push(format!("architecture '{}' is incompatible", sys::arch()));
                }
                if exec.platform != "*" && exec.platform != sys::platform() {
                    reasons.push(format!("platform '{}' is incompatible", sys::platform()));
                }
                reasons.extend(requirement_failures(&exec.require));
                reasons
            }
        },
    }
}

/// OR semantics: an empty list is satisfied, and a single satisfied
/// requirement clears the artifact. On failure every requirement is
/// reported, so the user sees the full picture.
fn requirement_failures(requirements: &[Requirement]) -> Vec<String> {
    if requirements.is_empty() {
        return Vec::new();
    }

    let mut failures = Vec::new();
    for requirement in requirements {
        match requirement {
            Requirement::Command { cmd } => {
                if sys::has_command(cmd) {
                    return Vec::new();
                }
                failures.push(format!("required command '{}' does not exist", cmd));
            }
            Requirement::Exec { exec } => {
                if sys::shell_exits_with_zero(exec) {
                    return Vec::new();
                }
                failures.push(format!("pilot command '{}' exited with error", exec));
            }
        }
    }
    failures
}

fn interpreter_available(interpreter: &Interpreter) -> bool {
    match interpreter {
        Interpreter::Python { python, .. } => sys::has_command(python),
        Interpreter::Java { .. } => sys::has_command("java"),
        Interpreter::Shell { shell } => sys::has_command(shell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DockerArtifact, ExecutableArtifact, Source};
    use std::collections::BTreeMap;

    fn executable(
        arch: &str,
        platform: &str,
        interpreter: Option<Interpreter>,
        require: Vec<Requirement>,
    ) -> ToolArtifact {
        ToolArtifact::Executable(ExecutableArtifact {
            source: Source::File {
                url: "http://example.com/tool".to_string(),
                checksum: "00".repeat(32),
            },
            require,
            entrypoint: None,
            arch: arch.to_string(),
            platform: platform.to_string(),
            interpreter,
            install_script: None,
            uninstall_script: None,
            workdir: None,
            env: BTreeMap::new(),
        })
    }

    #[test]
    fn wildcard_executable_is_runnable() {
        let artifacts = vec![executable("*", "*", None, vec![])];
        assert!(find_runnable_artifact(&artifacts).is_ok());
    }

    #[test]
    fn host_matching_executable_is_runnable() {
        let artifacts = vec![executable(sys::arch(), sys::platform(), None, vec![])];
        assert!(find_runnable_artifact(&artifacts).is_ok());
    }

    #[test]
    fn foreign_arch_is_rejected_with_reason() {
        let artifacts = vec![executable("s390x", "*", None, vec![])];
        let err = find_runnable_artifact(&artifacts).unwrap_err();
        assert_eq!(err.artifacts.len(), 1);
        assert!(err.artifacts[0].reasons[0].contains("architecture"));
    }

    #[test]
    fn shell_interpreter_ignores_arch() {
        // `sh` is present everywhere these tests run, so the foreign arch
        // must not matter for an interpreted artifact.
        let interpreter = Some(Interpreter::Shell {
            shell: "sh".to_string(),
        });
        let artifacts = vec![executable("s390x", "plan9", interpreter, vec![])];
        assert!(find_runnable_artifact(&artifacts).is_ok());
    }

    #[test]
    fn missing_interpreter_is_reported() {
        let interpreter = Some(Interpreter::Shell {
            shell: "no-such-shell-anywhere".to_string(),
        });
        let artifacts = vec![executable("*", "*", interpreter, vec![])];
        let err = find_runnable_artifact(&artifacts).unwrap_err();
        assert!(err.artifacts[0].reasons[0].contains("interpreter"));
    }

    #[test]
    fn one_satisfied_requirement_clears_the_artifact() {
        let artifacts = vec![executable(
            "*",
            "*",
            None,
            vec![
                Requirement::Command {
                    cmd: "definitely-not-installed".to_string(),
                },
                Requirement::Exec {
                    exec: "true".to_string(),
                },
            ],
        )];
        assert!(find_runnable_artifact(&artifacts).is_ok());
    }

    #[test]
    fn all_failing_requirements_are_listed() {
        let artifacts = vec![executable(
            "*",
            "*",
            None,
            vec![
                Requirement::Command {
                    cmd: "definitely-not-installed".to_string(),
                },
                Requirement::Exec {
                    exec: "false".to_string(),
                },
            ],
        )];
        let err = find_runnable_artifact(&artifacts).unwrap_err();
        assert_eq!(err.artifacts[0].reasons.len(), 2);
        assert!(err.artifacts[0].reasons[0].contains("required command"));
        assert!(err.artifacts[0].reasons[1].contains("pilot command"));
    }

    #[test]
    fn reasons_come_one_set_per_artifact_in_order() {
        let artifacts = vec![
            executable("s390x", "*", None, vec![]),
            executable(
                "*",
                "plan9",
                None,
                vec![Requirement::Exec {
                    exec: "false".to_string(),
                }],
            ),
        ];
        let err = find_runnable_artifact(&artifacts).unwrap_err();
        assert_eq!(err.artifacts.len(), 2);
        assert!(err.artifacts[0].reasons[0].contains("architecture"));
        assert!(err.artifacts[1].reasons[0].contains("platform"));
        assert!(err.artifacts[1].reasons[1].contains("pilot command"));
    }

    #[test]
    fn first_runnable_wins() {
        let artifacts = vec![
            executable("s390x", "*", None, vec![]),
            executable("*", "*", None, vec![]),
        ];
        let picked = find_runnable_artifact(&artifacts).unwrap();
        assert!(std::ptr::eq(picked, &artifacts[1]));
    }

    #[test]
    fn docker_artifact_depends_on_docker_presence() {
        let artifacts = vec![ToolArtifact::Docker(DockerArtifact {
            image: "busybox".to_string(),
            tag: "1.36".to_string(),
            docker_args: String::new(),
        })];

        match find_runnable_artifact(&artifacts) {
            Ok(_) => assert!(sys::docker_available()),
            Err(err) => {
                assert!(!sys::docker_available());
                assert!(err.artifacts[0].reasons[0].contains("docker"));
            }
        }
    }
}
