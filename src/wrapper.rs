//! Wrapper synthesis.
//!
//! Every installed tool version gets a single executable `run` file in its
//! version directory. Docker artifacts get a `docker run` shell script,
//! plain binaries get a symlink to the entrypoint inside the package
//! directory, and interpreted artifacts get a script that prepares the
//! environment and hands the entrypoint to the interpreter. Python
//! artifacts additionally provision a virtualenv sandbox once, at install
//! time.

use crate::registry::{DockerArtifact, ExecutableArtifact, Interpreter};
use crate::sys;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Expand `%...%` templates inside catalog-provided strings.
///
/// `%artifact%` is the package directory, `%tool%` the tool version
/// directory, `%env:NAME%` a host environment variable and `%pwd%` the
/// current working directory. Unknown templates expand to nothing.
pub fn expand_templates(expr: &str, pkg_dir: &Path, tool_dir: &Path) -> String {
    static TEMPLATE: OnceLock<Regex> = OnceLock::new();
    let template = TEMPLATE.get_or_init(|| Regex::new(r"%\w+(:\w+)?%").expect("template regex"));

    template
        .replace_all(expr, |captures: &regex::Captures<'_>| {
            let token = &captures[0];
            let inner = &token[1..token.len() - 1];
            let (key, arg) = match inner.split_once(':') {
                Some((key, arg)) => (key.to_ascii_lowercase(), Some(arg)),
                None => (inner.to_ascii_lowercase(), None),
            };

            match key.as_str() {
                "artifact" => pkg_dir.display().to_string(),
                "tool" => tool_dir.display().to_string(),
                "env" => arg
                    .and_then(|name| std::env::var(name).ok())
                    .unwrap_or_default(),
                "pwd" => std::env::current_dir()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default(),
                _ => String::new(),
            }
        })
        .into_owned()
}

/// Quote a value for safe interpolation into a double-quoted shell string.
fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted
}

/// The shared environment preamble: a `cd` for the workdir plus one
/// `export` per environment entry, all template-expanded.
fn env_preamble(exec: &ExecutableArtifact, pkg_dir: &Path, tool_dir: &Path) -> String {
    let mut lines = Vec::new();

    if let Some(workdir) = &exec.workdir {
        let expanded = expand_templates(workdir, pkg_dir, tool_dir);
        lines.push(format!("cd \"{}\"", shell_quote(&expanded)));
    }

    for (key, value) in &exec.env {
        let expanded = expand_templates(value, pkg_dir, tool_dir);
        lines.push(format!("export {}=\"{}\"", key, shell_quote(&expanded)));
    }

    lines.join("\n")
}

/// Write `contents` to `path` with the executable bit set.
pub(crate) fn write_executable(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)
        .with_context(|| format!("could not create wrapper: {}", path.display()))?;
    set_executable(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("could not chmod {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Shell body for a docker artifact.
pub fn docker_wrapper_contents(docker: &DockerArtifact) -> String {
    format!(
        "#!/bin/sh\ndocker run -it --rm {} {}:{} $*\n",
        docker.docker_args, docker.image, docker.tag
    )
}

/// Link the version directory's `run` to the docker wrapper script written
/// into the package directory at install time. The wrapper is part of the
/// artifact's identity, so every version referencing the image shares it.
pub fn create_docker_wrapper(tool_ver_dir: &Path, pkg_dir: &Path) -> Result<()> {
    let wrapper = pkg_dir.join("run");
    if !wrapper.exists() {
        bail!("docker wrapper is missing from {}", pkg_dir.display());
    }

    let run = tool_ver_dir.join("run");
    symlink(&wrapper, &run)
        .with_context(|| format!("could not link {}", run.display()))?;
    Ok(())
}

/// Create the `run` symlink for a plain binary artifact.
///
/// The entrypoint must exist inside the package directory; it is chmod'd
/// executable and `run` becomes a symlink pointing at it.
pub fn create_binary_wrapper(
    tool_ver_dir: &Path,
    pkg_dir: &Path,
    exec: &ExecutableArtifact,
) -> Result<()> {
    let entrypoint = pkg_dir.join(exec.entrypoint());
    if !entrypoint.exists() {
        bail!("unable to find entrypoint: {}", exec.entrypoint());
    }

    set_executable(&entrypoint)?;

    let run = tool_ver_dir.join("run");
    symlink(&entrypoint, &run)
        .with_context(|| format!("could not link {}", run.display()))?;
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symlinks are not supported here"))
}

/// Create the `run` script for an interpreted artifact, provisioning the
/// interpreter sandbox where one is needed.
pub fn create_interpreter_wrapper(
    tool_ver_dir: &Path,
    pkg_dir: &Path,
    exec: &ExecutableArtifact,
    interpreter: &Interpreter,
) -> Result<()> {
    let contents = match interpreter {
        Interpreter::Python { .. } => {
            python_prepare_sandbox(tool_ver_dir, pkg_dir, interpreter)?;
            python_wrapper_contents(tool_ver_dir, pkg_dir, exec)
        }
        Interpreter::Java { java_args, .. } => java_wrapper_contents(pkg_dir, tool_ver_dir, exec, java_args),
        Interpreter::Shell { shell } => shell_wrapper_contents(pkg_dir, tool_ver_dir, exec, shell),
    };

    write_executable(&tool_ver_dir.join("run"), &contents)
}

fn shell_wrapper_contents(
    pkg_dir: &Path,
    tool_dir: &Path,
    exec: &ExecutableArtifact,
    shell: &str,
) -> String {
    format!(
        "#!/bin/sh\n{}\n{} {}/{} $*\n",
        env_preamble(exec, pkg_dir, tool_dir),
        shell,
        pkg_dir.display(),
        exec.entrypoint()
    )
}

fn java_wrapper_contents(
    pkg_dir: &Path,
    tool_dir: &Path,
    exec: &ExecutableArtifact,
    java_args: &str,
) -> String {
    format!(
        "#!/bin/sh\n{}\njava {} -jar {}/{} $*\n",
        env_preamble(exec, pkg_dir, tool_dir),
        java_args,
        pkg_dir.display(),
        exec.entrypoint()
    )
}

fn python_wrapper_contents(tool_dir: &Path, pkg_dir: &Path, exec: &ExecutableArtifact) -> String {
    let venv = tool_dir.join("python-venv");
    format!(
        "#!/bin/bash\nsource {}/bin/activate\n{}\n{}/bin/python {}/{} $*\n",
        venv.display(),
        env_preamble(exec, pkg_dir, tool_dir),
        venv.display(),
        pkg_dir.display(),
        exec.entrypoint()
    )
}

/// Provision the per-tool-version virtualenv and install any declared
/// python dependencies into it.
fn python_prepare_sandbox(
    tool_dir: &Path,
    pkg_dir: &Path,
    interpreter: &Interpreter,
) -> Result<()> {
    let (python, install_requirements, install_pip) = match interpreter {
        Interpreter::Python {
            python,
            install_requirements,
            install_pip,
        } => (python.as_str(), install_requirements, install_pip),
        _ => return Ok(()),
    };

    println!("{} Preparing python sandbox", "==>".blue().bold());

    let venv = tool_dir.join("python-venv");
    let venv_str = venv.display().to_string();

    if python.starts_with("python2") {
        if !sys::has_command("virtualenv") {
            bail!("python2 packages require `virtualenv` to be installed");
        }
        let exit = sys::exec_silently("virtualenv", &["-p", python, &venv_str])?;
        if exit != 0 {
            bail!("cannot create python2 sandbox: process exited with {}", exit);
        }
    } else if python.starts_with("python3") {
        let exit = sys::exec_silently("python3", &["-m", "venv", &venv_str])?;
        if exit != 0 {
            bail!("cannot create python3 sandbox: process exited with {}", exit);
        }
    } else {
        bail!("unknown python version: `{}`", python);
    }

    if let Some(requirements) = install_requirements {
        let exit = sys::shell_exec_in_dir(
            pkg_dir,
            &format!(
                "(source {}/bin/activate; pip install -r {})",
                venv_str, requirements
            ),
        )?;
        if exit != 0 {
            bail!("cannot install requirements: process exited with {}", exit);
        }
    }

    if let Some(spec) = install_pip {
        let exit = sys::shell_exec_in_dir(
            pkg_dir,
            &format!("(source {}/bin/activate; pip install {})", venv_str, spec),
        )?;
        if exit != 0 {
            bail!("cannot install requirements: process exited with {}", exit);
        }
    }

    Ok(())
}
