//! Host detection and subprocess plumbing.
//!
//! Subprocesses that should talk to the user (docker pulls, install scripts)
//! inherit the terminal's stdio; probe commands run with null handles.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Host platform in the catalog's naming scheme.
pub fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Host CPU architecture in the catalog's naming scheme.
pub fn arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Check whether a binary is reachable through PATH.
pub fn has_command(name: &str) -> bool {
    let path = match std::env::var_os("PATH") {
        Some(path) => path,
        None => return false,
    };

    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run a shell expression silently and report whether it exited with 0.
pub fn shell_exits_with_zero(expr: &str) -> bool {
    Command::new("sh")
        .args(["-c", expr])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Run a command with stdout/stderr forwarded to the terminal.
pub fn exec_passthrough(binary: &str, args: &[&str]) -> Result<i32> {
    debug!(binary, ?args, "spawning");
    let status = Command::new(binary)
        .args(args)
        .status()
        .with_context(|| format!("could not run '{}'", binary))?;
    Ok(status.code().unwrap_or(-1))
}

/// Run a command inside `dir` with stdout/stderr forwarded to the terminal.
pub fn exec_in_dir_passthrough(dir: &Path, binary: &str, args: &[&str]) -> Result<i32> {
    debug!(binary, ?args, dir = %dir.display(), "spawning");
    let status = Command::new(binary)
        .args(args)
        .current_dir(dir)
        .status()
        .with_context(|| format!("could not run '{}'", binary))?;
    Ok(status.code().unwrap_or(-1))
}

/// Run a shell command line inside `dir`, forwarding output.
pub fn shell_exec_in_dir(dir: &Path, cmdline: &str) -> Result<i32> {
    exec_in_dir_passthrough(dir, "sh", &["-c", cmdline])
}

/// Run a command with all stdio detached, returning the exit code.
pub fn exec_silently(binary: &str, args: &[&str]) -> Result<i32> {
    let status = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("could not run '{}'", binary))?;
    Ok(status.code().unwrap_or(-1))
}

/// Check if docker is installed on this host.
pub fn docker_available() -> bool {
    has_command("docker")
}

/// Pull a docker image, echoing progress on the terminal.
pub fn docker_pull(image: &str, tag: &str) -> Result<()> {
    let exit = exec_passthrough("docker", &["pull", &format!("{}:{}", image, tag)])?;
    if exit != 0 {
        anyhow::bail!("unable to pull the docker image");
    }
    Ok(())
}

/// Remove a docker image, echoing progress on the terminal.
pub fn docker_rmi(image: &str, tag: &str) -> Result<()> {
    let exit = exec_passthrough("docker", &["rmi", &format!("{}:{}", image, tag)])?;
    if exit != 0 {
        anyhow::bail!("unable to remove the docker image");
    }
    Ok(())
}
