//! The local repository: a content-addressed artifact store shared across
//! tools and versions, plus per-tool/per-version wrapper directories.
//!
//! On-disk layout under the data directory:
//!
//! ```text
//! pkg/<artifact-id>/                  installed source artifact (+ .state)
//! tools/<tool>/<ver>-<artifact-id>/   wrapper dir, always holds `run`
//! ```
//!
//! Reference counts are not persisted; they are reconstructed on every load
//! by counting the version directories that point at each artifact, which
//! keeps the store and its index trivially consistent.

use crate::install;
use crate::registry::{Source, ToolArtifact, ToolVersion};
use crate::version::VersionTriplet;
use crate::wrapper;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An installed source package in the store.
#[derive(Debug, Clone)]
pub struct InstalledArtifact {
    pub id: String,
    pub folder: PathBuf,
    pub references: u32,
}

impl InstalledArtifact {
    /// The registry artifact this package was installed from.
    pub fn registry_artifact(&self) -> Result<ToolArtifact> {
        install::read_artifact_state(&self.folder.join(".state"))
    }
}

/// One installed version of a tool.
#[derive(Debug, Clone)]
pub struct InstalledVersion {
    pub version: VersionTriplet,
    pub artifact_id: String,
    pub folder: PathBuf,
}

impl InstalledVersion {
    /// The wrapper the user-bin symlink points at.
    pub fn executable_path(&self) -> PathBuf {
        self.folder.join("run")
    }
}

/// A tool with at least one installed version.
#[derive(Debug, Clone)]
pub struct InstalledTool {
    pub name: String,
    pub folder: PathBuf,
    pub versions: Vec<InstalledVersion>,
}

impl InstalledTool {
    pub fn find_version(&self, version: VersionTriplet) -> Option<&InstalledVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn has_installed_versions(&self) -> bool {
        !self.versions.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Repository {
    pub base_dir: PathBuf,
    pub artifacts: BTreeMap<String, InstalledArtifact>,
    pub tools: BTreeMap<String, InstalledTool>,
}

/// Stable identifier of an artifact, derived from its identity fields only.
///
/// Two tools referencing the same artifact hash to the same ID and share one
/// `pkg/` directory.
pub fn artifact_id(artifact: &ToolArtifact) -> String {
    let identity = match artifact {
        ToolArtifact::Docker(docker) => format!(
            "docker:{}:{}:{}",
            docker.image, docker.tag, docker.docker_args
        ),
        ToolArtifact::Executable(exec) => match &exec.source {
            Source::File { url, checksum } => format!("file:{}:{}", url, checksum),
            Source::Tar { url, checksum } => format!("tar:{}:{}", url, checksum),
            Source::Git { url, branch } => {
                format!("git:{}:{}", url, branch.as_deref().unwrap_or_default())
            }
        },
    };

    format!("{:x}", Sha256::digest(identity.as_bytes()))
}

impl Repository {
    fn pkg_dir(&self) -> PathBuf {
        self.base_dir.join("pkg")
    }

    fn tools_dir(&self) -> PathBuf {
        self.base_dir.join("tools")
    }

    /// Scan the data directory and reconstruct the in-memory index.
    ///
    /// Unknown sub-directory layouts are a hard error: refusing to operate
    /// beats silently mismanaging directories we do not understand.
    pub fn load(base_dir: &Path) -> Result<Repository> {
        let mut repository = Repository {
            base_dir: base_dir.to_path_buf(),
            ..Default::default()
        };

        let tools_dir = repository.tools_dir();
        if !tools_dir.exists() {
            return Ok(repository);
        }

        for entry in fs::read_dir(&tools_dir)
            .with_context(|| format!("could not read {}", tools_dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }

            let tool = repository.load_tool(&name, &entry.path())?;
            repository.tools.insert(name, tool);
        }

        debug!(
            tools = repository.tools.len(),
            artifacts = repository.artifacts.len(),
            "repository loaded"
        );
        Ok(repository)
    }

    fn load_tool(&mut self, name: &str, tool_dir: &Path) -> Result<InstalledTool> {
        let mut tool = InstalledTool {
            name: name.to_string(),
            folder: tool_dir.to_path_buf(),
            versions: Vec::new(),
        };

        for entry in fs::read_dir(tool_dir)
            .with_context(|| format!("could not read {}", tool_dir.display()))?
        {
            let entry = entry?;
            let dir_name = entry.file_name().to_string_lossy().to_string();
            if dir_name.starts_with('.') {
                continue;
            }

            let (version_str, artifact_id) = dir_name.split_once('-').with_context(|| {
                format!(
                    "unexpected entry '{}' in tool '{}': not a <version>-<artifact> directory",
                    dir_name, name
                )
            })?;

            let version: VersionTriplet = version_str.parse().with_context(|| {
                format!("could not parse tool '{}' version '{}'", name, dir_name)
            })?;

            let pkg_folder = self.pkg_dir().join(artifact_id);
            if !pkg_folder.exists() {
                bail!("source package '{}' was not found", pkg_folder.display());
            }

            self.artifacts
                .entry(artifact_id.to_string())
                .and_modify(|artifact| artifact.references += 1)
                .or_insert_with(|| InstalledArtifact {
                    id: artifact_id.to_string(),
                    folder: pkg_folder,
                    references: 1,
                });

            tool.versions.push(InstalledVersion {
                version,
                artifact_id: artifact_id.to_string(),
                folder: entry.path(),
            });
        }

        Ok(tool)
    }

    pub fn is_tool_installed(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    pub fn find_tool_version(
        &self,
        tool: &str,
        version: VersionTriplet,
    ) -> Option<&InstalledVersion> {
        self.tools.get(tool).and_then(|t| t.find_version(version))
    }

    /// Look up an installed artifact by the identity of a registry artifact.
    pub fn find_artifact(&self, artifact: &ToolArtifact) -> Option<&InstalledArtifact> {
        self.artifacts.get(&artifact_id(artifact))
    }

    /// Reverse lookup: which installed tool version owns this `run` path?
    ///
    /// Used to decide whether an existing user-bin symlink belongs to us.
    pub fn find_tool_from_link(
        &self,
        link_target: &Path,
    ) -> Option<(&InstalledTool, &InstalledVersion)> {
        for tool in self.tools.values() {
            for version in &tool.versions {
                if version.executable_path() == link_target {
                    return Some((tool, version));
                }
            }
        }
        None
    }

    /// Install a tool version: locate or fetch the artifact, then synthesize
    /// the wrapper directory. Returns the path of the new `run` file.
    pub fn install_tool_version(
        &mut self,
        tool: &str,
        version: &ToolVersion,
        artifact: &ToolArtifact,
    ) -> Result<PathBuf> {
        println!(
            "{} {} {}",
            "==>".green().bold(),
            "Add",
            format!("{}/{}", tool, version.version).bold().green()
        );

        let id = artifact_id(artifact);
        if !self.artifacts.contains_key(&id) {
            let installed = install::install_artifact(&self.pkg_dir(), artifact)?;
            self.artifacts.insert(id.clone(), installed);
        }
        let pkg_folder = self.artifacts[&id].folder.clone();

        let tool_dir = self.tools_dir().join(tool);
        let version_dir = tool_dir.join(format!("{}-{}", version.version, id));
        fs::create_dir_all(&version_dir)
            .with_context(|| format!("unable to create the tool directory: {}", version_dir.display()))?;

        let wrapped = match artifact {
            ToolArtifact::Docker(_) => wrapper::create_docker_wrapper(&version_dir, &pkg_folder),
            ToolArtifact::Executable(exec) => match &exec.interpreter {
                Some(interpreter) => {
                    wrapper::create_interpreter_wrapper(&version_dir, &pkg_folder, exec, interpreter)
                }
                None => wrapper::create_binary_wrapper(&version_dir, &pkg_folder, exec),
            },
        };

        if let Err(e) = wrapped {
            let _ = fs::remove_dir_all(&version_dir);
            return Err(e);
        }

        if let Some(entry) = self.artifacts.get_mut(&id) {
            entry.references += 1;
        }

        let installed_version = InstalledVersion {
            version: version.version,
            artifact_id: id,
            folder: version_dir,
        };
        let run_path = installed_version.executable_path();

        self.tools
            .entry(tool.to_string())
            .or_insert_with(|| InstalledTool {
                name: tool.to_string(),
                folder: tool_dir,
                versions: Vec::new(),
            })
            .versions
            .push(installed_version);

        Ok(run_path)
    }

    /// Remove one installed version, releasing (and possibly removing) the
    /// underlying artifact. Removal is best effort: a failing uninstall
    /// script surfaces as the returned error, but the directories are still
    /// cleaned up.
    pub fn uninstall_tool_version(&mut self, tool: &str, version: VersionTriplet) -> Result<()> {
        println!(
            "{} {} {}",
            "==>".red().bold(),
            "Remove",
            format!("{}/{}", tool, version).bold().red()
        );

        let installed = self
            .find_tool_version(tool, version)
            .with_context(|| format!("{}/{} is not installed", tool, version))?
            .clone();

        let mut first_error: Option<anyhow::Error> = None;

        let drop_artifact = match self.artifacts.get_mut(&installed.artifact_id) {
            Some(artifact) => {
                artifact.references = artifact.references.saturating_sub(1);
                artifact.references == 0
            }
            None => false,
        };

        if drop_artifact {
            if let Some(artifact) = self.artifacts.remove(&installed.artifact_id) {
                if let Err(e) = install::uninstall_artifact(&artifact) {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Err(e) = fs::remove_dir_all(&installed.folder)
            .with_context(|| format!("could not remove {}", installed.folder.display()))
        {
            first_error.get_or_insert(e);
        }

        if let Some(tool_entry) = self.tools.get_mut(tool) {
            tool_entry.versions.retain(|v| v.version != version);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remove a tool's now-empty directory and forget it.
    pub fn uninstall_tool(&mut self, tool: &str) -> Result<()> {
        if let Some(entry) = self.tools.remove(tool) {
            fs::remove_dir(&entry.folder)
                .with_context(|| format!("could not remove {}", entry.folder.display()))?;
        }
        Ok(())
    }

    /// Bytes on disk for an installed version: wrapper dir plus its share of
    /// the package dir.
    pub fn installed_size(&self, version: &InstalledVersion) -> Result<u64> {
        let mut size = dir_size(&version.folder)?;
        if let Some(artifact) = self.artifacts.get(&version.artifact_id) {
            size += dir_size(&artifact.folder)?;
        }
        Ok(size)
    }
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut size = 0;
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry.with_context(|| format!("could not walk {}", path.display()))?;
        if entry.file_type().is_file() {
            size += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DockerArtifact, ExecutableArtifact};
    use std::collections::BTreeMap;

    fn file_artifact(url: &str) -> ToolArtifact {
        ToolArtifact::Executable(ExecutableArtifact {
            source: Source::File {
                url: url.to_string(),
                checksum: "ab".repeat(32),
            },
            require: vec![],
            entrypoint: None,
            arch: "*".to_string(),
            platform: "*".to_string(),
            interpreter: None,
            install_script: None,
            uninstall_script: None,
            workdir: None,
            env: BTreeMap::new(),
        })
    }

    #[test]
    fn artifact_id_is_stable_and_identity_sensitive() {
        let a = file_artifact("http://example.com/a");
        let b = file_artifact("http://example.com/a");
        let c = file_artifact("http://example.com/c");

        assert_eq!(artifact_id(&a), artifact_id(&b));
        assert_ne!(artifact_id(&a), artifact_id(&c));
        assert_eq!(artifact_id(&a).len(), 64);
        assert!(artifact_id(&a).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn artifact_id_docker_identity() {
        let docker = ToolArtifact::Docker(DockerArtifact {
            image: "busybox".to_string(),
            tag: "1.36".to_string(),
            docker_args: String::new(),
        });

        // The identity string ends with a ':' when dockerArgs is empty.
        let expected = format!("{:x}", Sha256::digest(b"docker:busybox:1.36:"));
        assert_eq!(artifact_id(&docker), expected);
    }

    #[test]
    fn artifact_id_discriminates_kinds() {
        let file = file_artifact("http://example.com/x");
        let tar = ToolArtifact::Executable(ExecutableArtifact {
            source: Source::Tar {
                url: "http://example.com/x".to_string(),
                checksum: "ab".repeat(32),
            },
            require: vec![],
            entrypoint: None,
            arch: "*".to_string(),
            platform: "*".to_string(),
            interpreter: None,
            install_script: None,
            uninstall_script: None,
            workdir: None,
            env: BTreeMap::new(),
        });

        // Same URL and checksum, different kind prefix.
        assert_ne!(artifact_id(&file), artifact_id(&tar));
    }

    #[test]
    fn git_branch_is_part_of_the_identity() {
        let main = ToolArtifact::Executable(ExecutableArtifact {
            source: Source::Git {
                url: "https://example.com/r.git".to_string(),
                branch: Some("refs/heads/main".to_string()),
            },
            require: vec![],
            entrypoint: None,
            arch: "*".to_string(),
            platform: "*".to_string(),
            interpreter: None,
            install_script: None,
            uninstall_script: None,
            workdir: None,
            env: BTreeMap::new(),
        });

        let mut unset = main.clone();
        if let ToolArtifact::Executable(exec) = &mut unset {
            exec.source = Source::Git {
                url: "https://example.com/r.git".to_string(),
                branch: None,
            };
        }

        assert_ne!(artifact_id(&main), artifact_id(&unset));
    }

    #[test]
    fn load_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::load(&dir.path().join("nope")).unwrap();
        assert!(repo.tools.is_empty());
        assert!(repo.artifacts.is_empty());
    }
}
