//! Per-source-kind artifact installation.
//!
//! Artifacts land in a fresh `pkg/<artifact-id>` directory. A pre-existing
//! directory with that ID is wiped first: the refcount logic guarantees an
//! unknown directory is an orphan from an interrupted run. Every failure
//! path removes the partially created directory before returning.

use crate::pipeline::{DownloadFlags, Pipeline};
use crate::registry::{DockerArtifact, Source, ToolArtifact, DEFAULT_GIT_BRANCH};
use crate::repository::{artifact_id, InstalledArtifact};
use crate::sys;
use crate::wrapper;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Download and install the source package for `artifact` under `pkg_root`.
pub fn install_artifact(pkg_root: &Path, artifact: &ToolArtifact) -> Result<InstalledArtifact> {
    let id = artifact_id(artifact);
    let dst = pkg_root.join(&id);

    if dst.exists() {
        debug!(id = %id, "wiping orphaned package directory");
        fs::remove_dir_all(&dst)
            .with_context(|| format!("could not wipe {}", dst.display()))?;
    }
    fs::create_dir_all(&dst)
        .with_context(|| format!("could not create package dir {}", dst.display()))?;

    let fetched = match artifact {
        ToolArtifact::Docker(docker) => install_docker(&dst, docker),
        ToolArtifact::Executable(exec) => match &exec.source {
            Source::File { url, checksum } => install_web_file(&dst, url, checksum),
            Source::Tar { url, checksum } => install_web_tar(&dst, url, checksum),
            Source::Git { url, branch } => install_git(&dst, url, branch.as_deref()),
        },
    };

    let result = fetched
        .and_then(|_| run_install_script(&dst, artifact))
        .and_then(|_| create_uninstall_script(&dst, artifact))
        .and_then(|_| write_artifact_state(&dst.join(".state"), artifact));

    if let Err(e) = result {
        let _ = fs::remove_dir_all(&dst);
        return Err(e);
    }

    Ok(InstalledArtifact {
        id,
        folder: dst,
        references: 0,
    })
}

fn install_docker(dst: &Path, docker: &DockerArtifact) -> Result<()> {
    println!(
        "{} {} {}",
        "==>".blue().bold(),
        "Pulling",
        format!("{}:{}", docker.image, docker.tag).bold()
    );
    sys::docker_pull(&docker.image, &docker.tag)?;

    // The wrapper script is the only installable content of a docker
    // artifact; version directories symlink to it.
    wrapper::write_executable(&dst.join("run"), &wrapper::docker_wrapper_contents(docker))
}

fn install_web_file(dst: &Path, url: &str, checksum: &str) -> Result<()> {
    println!("{} {} {}", "==>".blue().bold(), "Downloading", url.bold());
    Pipeline::download(
        url,
        DownloadFlags {
            without_compression: true,
            ..Default::default()
        },
    )
    .show_progress("")
    .validate_checksum(checksum)
    .decompress_if_compressed()
    .write_to(&dst.join("run"))
    .map_err(Into::into)
}

fn install_web_tar(dst: &Path, url: &str, checksum: &str) -> Result<()> {
    println!("{} {} {}", "==>".blue().bold(), "Downloading", url.bold());
    Pipeline::download(
        url,
        DownloadFlags {
            without_compression: true,
            ..Default::default()
        },
    )
    .show_progress("")
    .validate_checksum(checksum)
    .decompress_if_compressed()
    .untar_to(dst, 1)
    .map_err(Into::into)
}

fn install_git(dst: &Path, url: &str, branch: Option<&str>) -> Result<()> {
    println!("{} {} {}", "==>".blue().bold(), "Cloning", url.bold());

    // Configured refs arrive as full ref names; git clone wants the short one.
    let reference = branch.unwrap_or(DEFAULT_GIT_BRANCH);
    let reference = reference.strip_prefix("refs/heads/").unwrap_or(reference);

    let dst_str = dst.display().to_string();
    let exit = sys::exec_passthrough(
        "git",
        &[
            "clone",
            "--depth",
            "1",
            "--single-branch",
            "--branch",
            reference,
            url,
            &dst_str,
        ],
    )?;
    if exit != 0 {
        bail!("git clone exited with {}", exit);
    }
    Ok(())
}

/// Run the artifact's install script, if any, from inside the package dir.
fn run_install_script(pkg_dir: &Path, artifact: &ToolArtifact) -> Result<()> {
    let script = match artifact {
        ToolArtifact::Executable(exec) => match &exec.install_script {
            Some(script) => script,
            None => return Ok(()),
        },
        ToolArtifact::Docker(_) => return Ok(()),
    };

    println!("{} {}", "==>".blue().bold(), "Running install script");
    let exit = sys::shell_exec_in_dir(pkg_dir, script)?;
    if exit != 0 {
        bail!("install script failed");
    }
    Ok(())
}

/// Persist the artifact's uninstall script as an executable `.uninstall`
/// shell wrapper next to the installed files.
fn create_uninstall_script(pkg_dir: &Path, artifact: &ToolArtifact) -> Result<()> {
    let script = match artifact {
        ToolArtifact::Executable(exec) => match &exec.uninstall_script {
            Some(script) => script,
            None => return Ok(()),
        },
        ToolArtifact::Docker(_) => return Ok(()),
    };

    println!("{} {}", "==>".blue().bold(), "Creating uninstall script");
    let path = pkg_dir.join(".uninstall");
    fs::write(&path, format!("#!/bin/sh\n{}\n", script))
        .with_context(|| format!("could not create uninstall script: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("could not chmod {}", path.display()))?;
    }
    Ok(())
}

fn run_uninstall_script(pkg_dir: &Path) -> Result<()> {
    let script = pkg_dir.join(".uninstall");
    if !script.exists() {
        return Ok(());
    }

    println!("{} {}", "==>".blue().bold(), "Running uninstall script");
    let exit = sys::shell_exec_in_dir(pkg_dir, &script.display().to_string())?;
    if exit != 0 {
        bail!("uninstall script failed");
    }
    Ok(())
}

/// Physically remove an artifact whose last reference is gone.
///
/// The uninstall script and any docker image removal are best-effort: their
/// errors propagate, but the directory removal is attempted regardless.
pub fn uninstall_artifact(artifact: &InstalledArtifact) -> Result<()> {
    if !artifact.folder.exists() {
        bail!("the artifact does not exist");
    }

    let state = read_artifact_state(&artifact.folder.join(".state"))
        .context("could not read the artifact state")?;

    let mut first_error: Option<anyhow::Error> = None;

    if let Err(e) = run_uninstall_script(&artifact.folder) {
        first_error.get_or_insert(e);
    }

    if let ToolArtifact::Docker(docker) = &state {
        println!(
            "{} {} {}",
            "==>".blue().bold(),
            "Removing",
            format!("{}:{}", docker.image, docker.tag).bold()
        );
        if let Err(e) = sys::docker_rmi(&docker.image, &docker.tag) {
            first_error.get_or_insert(e);
        }
    }

    if let Err(e) = fs::remove_dir_all(&artifact.folder)
        .with_context(|| format!("could not remove {}", artifact.folder.display()))
    {
        first_error.get_or_insert(e);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Read the registry artifact a package directory was installed from.
pub fn read_artifact_state(path: &Path) -> Result<ToolArtifact> {
    let bytes = fs::read(path)
        .with_context(|| format!("could not find state file: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("could not parse state file: {}", path.display()))
}

/// Serialize the registry artifact into a package's `.state` file.
pub fn write_artifact_state(path: &Path, artifact: &ToolArtifact) -> Result<()> {
    let bytes = serde_json::to_vec(artifact).context("could not serialize the artifact state")?;
    fs::write(path, bytes).with_context(|| format!("could not write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ExecutableArtifact;
    use std::collections::BTreeMap;

    fn sample_artifact() -> ToolArtifact {
        ToolArtifact::Executable(ExecutableArtifact {
            source: Source::File {
                url: "http://example.com/tool".to_string(),
                checksum: "ab".repeat(32),
            },
            require: vec![],
            entrypoint: None,
            arch: "*".to_string(),
            platform: "*".to_string(),
            interpreter: None,
            install_script: None,
            uninstall_script: Some("echo removed".to_string()),
            workdir: None,
            env: BTreeMap::new(),
        })
    }

    #[test]
    fn state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".state");
        let artifact = sample_artifact();

        write_artifact_state(&path, &artifact).unwrap();
        let back = read_artifact_state(&path).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn uninstall_script_is_written_executable() {
        let dir = tempfile::tempdir().unwrap();
        create_uninstall_script(dir.path(), &sample_artifact()).unwrap();

        let script = dir.path().join(".uninstall");
        assert_eq!(
            fs::read_to_string(&script).unwrap(),
            "#!/bin/sh\necho removed\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&script).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn uninstall_removes_package_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg-id");
        fs::create_dir_all(&pkg).unwrap();

        let artifact = sample_artifact();
        write_artifact_state(&pkg.join(".state"), &artifact).unwrap();
        create_uninstall_script(&pkg, &artifact).unwrap();

        let installed = InstalledArtifact {
            id: "pkg-id".to_string(),
            folder: pkg.clone(),
            references: 0,
        };
        uninstall_artifact(&installed).unwrap();
        assert!(!pkg.exists());
    }

    #[test]
    fn failing_uninstall_script_still_removes_the_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg-id");
        fs::create_dir_all(&pkg).unwrap();

        let mut artifact = sample_artifact();
        if let ToolArtifact::Executable(exec) = &mut artifact {
            exec.uninstall_script = Some("exit 1".to_string());
        }
        write_artifact_state(&pkg.join(".state"), &artifact).unwrap();
        create_uninstall_script(&pkg, &artifact).unwrap();

        let installed = InstalledArtifact {
            id: "pkg-id".to_string(),
            folder: pkg.clone(),
            references: 0,
        };
        assert!(uninstall_artifact(&installed).is_err());
        assert!(!pkg.exists());
    }
}
