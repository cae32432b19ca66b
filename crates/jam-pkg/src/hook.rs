//! The buildpack's pre-package script.

use std::io;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Errors that can occur while running the pre-package script.
#[derive(Error, Debug)]
pub enum HookError {
    /// The shell could not be started.
    #[error("failed to execute pre-packaging script \"{script}\": {source}")]
    Spawn {
        script: String,
        #[source]
        source: io::Error,
    },

    /// The script exited unsuccessfully.
    #[error("failed to execute pre-packaging script \"{script}\": {status}\n{stderr}")]
    Failed {
        script: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Run `script` with `bash -c` inside `dir`.
///
/// An empty script does nothing.
///
/// # Errors
///
/// Returns an error if bash cannot be started or the script exits non-zero.
pub fn run_pre_package(script: &str, dir: &Path) -> Result<(), HookError> {
    if script.trim().is_empty() {
        return Ok(());
    }

    tracing::info!("Running pre-packaging script: {script}");
    let output = Command::new("bash")
        .arg("-c")
        .arg(script)
        .current_dir(dir)
        .output()
        .map_err(|source| HookError::Spawn {
            script: script.to_string(),
            source,
        })?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        tracing::info!("    {line}");
    }

    if !output.status.success() {
        return Err(HookError::Failed {
            script: script.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }

    Ok(())
}
