//! External tracer wrapper
//!
//! Drives the system bpftrace binary: attach the probe script, stream
//! events to the log file, wait for completion. The handle is constructed
//! from configuration and passed explicitly; nothing here is
//! process-global.

use crate::error::{Result, TracebomError};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub struct Tracer {
    binary: PathBuf,
    use_sudo: bool,
}

impl Tracer {
    pub fn new(binary: impl Into<PathBuf>, use_sudo: bool) -> Self {
        Self {
            binary: binary.into(),
            use_sudo,
        }
    }

    /// Verify the configured binary exists and is executable before
    /// spawning anything.
    pub fn preflight(&self) -> Result<()> {
        if !self.binary.exists() {
            return Err(TracebomError::Tracer(format!(
                "Tracer binary not found: {}",
                self.binary.display()
            )));
        }
        let metadata = std::fs::metadata(&self.binary).map_err(|source| TracebomError::Io {
            source,
            context: format!("Failed to stat tracer binary {}", self.binary.display()),
        })?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(TracebomError::Tracer(format!(
                "Tracer binary is not executable: {}",
                self.binary.display()
            )));
        }
        Ok(())
    }

    /// Trace a fresh target command to completion.
    pub fn trace_command(&self, script: &Path, log_file: &Path, command: &[String]) -> Result<()> {
        if command.is_empty() {
            return Err(TracebomError::Tracer(
                "No target command given".to_string(),
            ));
        }
        let joined = command.join(" ");
        self.run(script, log_file, &["-c".to_string(), joined])
    }

    /// Attach to an already running process.
    pub fn attach_pid(&self, script: &Path, log_file: &Path, pid: i32) -> Result<()> {
        // Signal 0 probes for existence without disturbing the target.
        kill(Pid::from_raw(pid), None).map_err(|err| {
            TracebomError::Tracer(format!("Process {pid} is not reachable: {err}"))
        })?;
        self.run(script, log_file, &["-p".to_string(), pid.to_string()])
    }

    /// System-wide trace; runs until the tracer is interrupted.
    pub fn global_trace(&self, script: &Path, log_file: &Path) -> Result<()> {
        self.run(script, log_file, &[])
    }

    fn run(&self, script: &Path, log_file: &Path, extra_args: &[String]) -> Result<()> {
        self.preflight()?;
        if !script.exists() {
            return Err(TracebomError::Tracer(format!(
                "Probe script not found: {}",
                script.display()
            )));
        }
        if let Some(parent) = log_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| TracebomError::Io {
                    source,
                    context: format!("Failed to create log directory {}", parent.display()),
                })?;
            }
        }

        let mut command = if self.use_sudo {
            let mut sudo = Command::new("sudo");
            sudo.arg(&self.binary);
            sudo
        } else {
            Command::new(&self.binary)
        };
        command.arg(script);
        command.args(extra_args);
        command.arg("-o").arg(log_file);

        tracing::info!("Starting tracer: {:?}", command);
        let status = command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| TracebomError::Io {
                source,
                context: format!("Failed to launch tracer {}", self.binary.display()),
            })?;

        if !status.success() {
            return Err(TracebomError::Tracer(format!(
                "Tracer exited with status {status}"
            )));
        }
        tracing::info!("Trace written to {}", log_file.display());
        Ok(())
    }
}
