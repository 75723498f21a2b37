//! Catalog data model and JSON codec.
//!
//! The registry is a signed JSON document enumerating tools, their versions
//! and the artifacts each version can be installed from. Tagged unions keep
//! the wire shape of the catalog: artifacts and sources carry a `type`
//! discriminator, while interpreters, requirements and help entries are
//! discriminated by which fields are present.

use crate::error::{Result, ToolbeltError};
use crate::version::{parse_fragments, VersionTriplet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The only envelope version this build understands.
pub const REGISTRY_VERSION: u64 = 1;

/// The registry entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub version: u64,
    /// Minimum tool version that may consume this catalog.
    pub tool_version: VersionTriplet,
    pub tools: BTreeMap<String, ToolInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    #[serde(default)]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<ToolHelp>,
    pub versions: Vec<ToolVersion>,
}

/// Help for a tool: either inline text or a URL to fetch or open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolHelp {
    Text {
        text: String,
        #[serde(default)]
        markdown: bool,
    },
    Url {
        url: String,
        #[serde(default)]
        inline: bool,
        #[serde(default)]
        markdown: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolVersion {
    pub version: VersionTriplet,
    /// Declaration order is the resolver's preference order.
    pub artifacts: Vec<ToolArtifact>,
}

/// A concrete installable form of a tool version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolArtifact {
    Docker(DockerArtifact),
    Executable(ExecutableArtifact),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerArtifact {
    pub image: String,
    pub tag: String,
    #[serde(default)]
    pub docker_args: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableArtifact {
    pub source: Source,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default = "wildcard")]
    pub arch: String,
    #[serde(default = "wildcard")]
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Interpreter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn wildcard() -> String {
    "*".to_string()
}

impl ExecutableArtifact {
    /// The file the wrapper invokes inside the package directory.
    pub fn entrypoint(&self) -> &str {
        self.entrypoint.as_deref().unwrap_or("run")
    }
}

/// Where the bytes of an executable artifact come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Source {
    #[serde(rename = "file")]
    File { url: String, checksum: String },
    #[serde(rename = "archive/tar")]
    Tar { url: String, checksum: String },
    #[serde(rename = "vcs/git")]
    Git {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
}

/// Ref cloned when a git source does not name a branch.
pub const DEFAULT_GIT_BRANCH: &str = "refs/heads/master";

/// Interpreter the executable artifact is hosted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Interpreter {
    Python {
        /// `python2*` or `python3*`; also the binary probed on PATH.
        python: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        install_requirements: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        install_pip: Option<String>,
    },
    Java {
        java: String,
        #[serde(default)]
        java_args: String,
    },
    Shell {
        shell: String,
    },
}

impl Interpreter {
    pub fn name(&self) -> &str {
        match self {
            Interpreter::Python { python, .. } => python,
            Interpreter::Java { .. } => "java",
            Interpreter::Shell { shell } => shell,
        }
    }
}

/// A host-side precondition an artifact can declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Requirement {
    Command { cmd: String },
    Exec { exec: String },
}

impl Registry {
    /// Parse a registry document and reject unknown envelope versions.
    pub fn parse(bytes: &[u8]) -> Result<Registry> {
        let registry: Registry = serde_json::from_slice(bytes)?;
        if registry.version != REGISTRY_VERSION {
            return Err(ToolbeltError::UnsupportedRegistryVersion(registry.version));
        }
        Ok(registry)
    }

    /// True when this catalog demands a newer tool binary than `own`.
    pub fn requires_newer_tool(&self, own: VersionTriplet) -> bool {
        self.tool_version > own
    }
}

impl ToolInfo {
    /// The highest published version of the tool.
    pub fn latest(&self) -> Option<&ToolVersion> {
        self.versions.iter().max_by_key(|v| v.version)
    }

    /// Find a version by a possibly partial selector ("2", "2.1", "2.1.0").
    pub fn find(&self, selector: &str) -> Result<&ToolVersion> {
        let fragments = parse_fragments(selector)?;
        if fragments.len() > 3 {
            return Err(ToolbeltError::VersionNotFound(selector.to_string()));
        }
        self.versions
            .iter()
            .find(|v| v.version.matches_prefix(&fragments))
            .ok_or_else(|| ToolbeltError::VersionNotFound(selector.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> Registry {
        let mut tools = BTreeMap::new();
        tools.insert(
            "kubectl".to_string(),
            ToolInfo {
                desc: "Kubernetes CLI".to_string(),
                topics: vec!["kubernetes".to_string()],
                help: Some(ToolHelp::Text {
                    text: "run kubectl".to_string(),
                    markdown: false,
                }),
                versions: vec![ToolVersion {
                    version: VersionTriplet(1, 9, 2),
                    artifacts: vec![
                        ToolArtifact::Docker(DockerArtifact {
                            image: "busybox".to_string(),
                            tag: "1.36".to_string(),
                            docker_args: String::new(),
                        }),
                        ToolArtifact::Executable(ExecutableArtifact {
                            source: Source::Tar {
                                url: "http://example.com/kubectl.tgz".to_string(),
                                checksum: "ab".repeat(32),
                            },
                            require: vec![
                                Requirement::Command {
                                    cmd: "docker".to_string(),
                                },
                                Requirement::Exec {
                                    exec: "true".to_string(),
                                },
                            ],
                            entrypoint: Some("bin/kubectl".to_string()),
                            arch: "amd64".to_string(),
                            platform: "linux".to_string(),
                            interpreter: None,
                            install_script: Some("chmod +x bin/kubectl".to_string()),
                            uninstall_script: None,
                            workdir: Some("%artifact%".to_string()),
                            env: BTreeMap::from([(
                                "KUBECONFIG".to_string(),
                                "%env:HOME%/.kube/config".to_string(),
                            )]),
                        }),
                        ToolArtifact::Executable(ExecutableArtifact {
                            source: Source::Git {
                                url: "https://example.com/repo.git".to_string(),
                                branch: Some("refs/heads/main".to_string()),
                            },
                            require: vec![],
                            entrypoint: None,
                            arch: "*".to_string(),
                            platform: "*".to_string(),
                            interpreter: Some(Interpreter::Python {
                                python: "python3".to_string(),
                                install_requirements: Some("requirements.txt".to_string()),
                                install_pip: None,
                            }),
                            install_script: None,
                            uninstall_script: None,
                            workdir: None,
                            env: BTreeMap::new(),
                        }),
                        ToolArtifact::Executable(ExecutableArtifact {
                            source: Source::File {
                                url: "http://example.com/tool".to_string(),
                                checksum: "cd".repeat(32),
                            },
                            require: vec![],
                            entrypoint: None,
                            arch: "*".to_string(),
                            platform: "*".to_string(),
                            interpreter: Some(Interpreter::Java {
                                java: "java8".to_string(),
                                java_args: "-Xmx512m".to_string(),
                            }),
                            install_script: None,
                            uninstall_script: None,
                            workdir: None,
                            env: BTreeMap::new(),
                        }),
                    ],
                }],
            },
        );

        Registry {
            version: REGISTRY_VERSION,
            tool_version: VersionTriplet(0, 1, 0),
            tools,
        }
    }

    #[test]
    fn round_trips_every_variant() {
        let registry = sample_registry();
        let json = serde_json::to_vec(&registry).unwrap();
        let back = Registry::parse(&json).unwrap();
        assert_eq!(back, registry);
    }

    #[test]
    fn rejects_unsupported_envelope() {
        let mut registry = sample_registry();
        registry.version = 2;
        let json = serde_json::to_vec(&registry).unwrap();
        match Registry::parse(&json) {
            Err(ToolbeltError::UnsupportedRegistryVersion(2)) => {}
            other => panic!("expected unsupported version error, got {:?}", other),
        }
    }

    #[test]
    fn artifact_tag_discriminates() {
        let json = r#"{"type":"docker","image":"busybox","tag":"1.36"}"#;
        let artifact: ToolArtifact = serde_json::from_str(json).unwrap();
        match artifact {
            ToolArtifact::Docker(d) => {
                assert_eq!(d.image, "busybox");
                assert_eq!(d.docker_args, "");
            }
            _ => panic!("expected a docker artifact"),
        }
    }

    #[test]
    fn executable_defaults() {
        let json = r#"{
            "type": "executable",
            "source": {"type": "file", "url": "http://x/y", "checksum": "00"}
        }"#;
        let artifact: ToolArtifact = serde_json::from_str(json).unwrap();
        match artifact {
            ToolArtifact::Executable(e) => {
                assert_eq!(e.arch, "*");
                assert_eq!(e.platform, "*");
                assert_eq!(e.entrypoint(), "run");
                assert!(e.require.is_empty());
                assert!(e.env.is_empty());
            }
            _ => panic!("expected an executable artifact"),
        }
    }

    #[test]
    fn source_type_names() {
        let tar: Source =
            serde_json::from_str(r#"{"type":"archive/tar","url":"u","checksum":"c"}"#).unwrap();
        assert!(matches!(tar, Source::Tar { .. }));

        let git: Source = serde_json::from_str(r#"{"type":"vcs/git","url":"u"}"#).unwrap();
        match git {
            Source::Git { branch, .. } => assert!(branch.is_none()),
            _ => panic!("expected a git source"),
        }
    }

    #[test]
    fn interpreter_field_presence() {
        let python: Interpreter =
            serde_json::from_str(r#"{"python":"python3","installPip":"requests==2.31"}"#).unwrap();
        match python {
            Interpreter::Python { install_pip, .. } => {
                assert_eq!(install_pip.as_deref(), Some("requests==2.31"))
            }
            _ => panic!("expected python"),
        }

        let shell: Interpreter = serde_json::from_str(r#"{"shell":"bash"}"#).unwrap();
        assert_eq!(shell.name(), "bash");

        let java: Interpreter = serde_json::from_str(r#"{"java":"java11"}"#).unwrap();
        assert_eq!(java.name(), "java");
    }

    #[test]
    fn requirement_field_presence() {
        let cmd: Requirement = serde_json::from_str(r#"{"cmd":"kubectl"}"#).unwrap();
        assert!(matches!(cmd, Requirement::Command { .. }));

        let exec: Requirement = serde_json::from_str(r#"{"exec":"test -d /tmp"}"#).unwrap();
        assert!(matches!(exec, Requirement::Exec { .. }));
    }

    #[test]
    fn finds_latest_and_partial_versions() {
        let info = ToolInfo {
            desc: String::new(),
            topics: vec![],
            help: None,
            versions: vec![
                ToolVersion {
                    version: VersionTriplet(1, 2, 3),
                    artifacts: vec![],
                },
                ToolVersion {
                    version: VersionTriplet(1, 10, 0),
                    artifacts: vec![],
                },
            ],
        };

        assert_eq!(info.latest().unwrap().version, VersionTriplet(1, 10, 0));
        assert_eq!(info.find("1.2").unwrap().version, VersionTriplet(1, 2, 3));
        assert_eq!(info.find("1.10.0").unwrap().version, VersionTriplet(1, 10, 0));
        assert!(info.find("3").is_err());
        assert!(info.find("not-a-version").is_err());
    }

    #[test]
    fn min_tool_version_gate() {
        let registry = sample_registry();
        assert!(!registry.requires_newer_tool(VersionTriplet(0, 1, 0)));
        assert!(!registry.requires_newer_tool(VersionTriplet(0, 2, 0)));
        assert!(registry.requires_newer_tool(VersionTriplet(0, 0, 9)));
    }
}
