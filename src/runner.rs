use anyhow::{Context, Result};
use std::process::{Command, ExitStatus, Output, Stdio};

use crate::sudo;

/// Build a command, prefixed with `sudo` when elevation is requested and
/// we are not already root
pub fn command(cmd: &str, args: &[&str], elevate: bool) -> Command {
    if elevate && !sudo::is_root() {
        let mut command = Command::new("sudo");
        command.arg(cmd).args(args);
        command
    } else {
        let mut command = Command::new(cmd);
        command.args(args);
        command
    }
}

fn describe(cmd: &str, args: &[&str], elevate: bool) -> String {
    let prefix = if elevate && !sudo::is_root() { "sudo " } else { "" };
    format!("{prefix}{cmd} {}", args.join(" "))
}

/// Run a command and inherit stdio (shows output in real-time)
pub fn run(cmd: &str, args: &[&str], elevate: bool) -> Result<ExitStatus> {
    log::debug!("Running: {}", describe(cmd, args, elevate));
    command(cmd, args, elevate)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args, elevate)))
}

/// Run a command and capture output, whatever the exit status
pub fn run_output(cmd: &str, args: &[&str], elevate: bool) -> Result<Output> {
    log::trace!("Capturing: {}", describe(cmd, args, elevate));
    command(cmd, args, elevate)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args, elevate)))
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_output_keeps_status() {
        let output = run_output("sh", &["-c", "echo partial; exit 1"], false).unwrap();
        assert!(!output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "partial");
    }

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("hostform-no-such-binary-12345"));
    }

    #[test]
    fn test_unelevated_command_runs_directly() {
        let cmd = command("pacman", &["-Qqe"], false);
        assert_eq!(cmd.get_program(), "pacman");
    }
}
