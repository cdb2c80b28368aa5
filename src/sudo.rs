//! Scoped sudo context
//!
//! Privileges are never held for the whole process. Everything is planned
//! first; sudo is validated once, with a reason, just before the first
//! privileged step and the timestamp is dropped again when the context goes
//! out of scope.

use anyhow::{Context, Result, bail};
use std::process::Command;

/// Whether the process already runs as root
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Scoped sudo context - invalidates the sudo timestamp on drop
pub struct SudoContext {
    _private: (),
}

impl SudoContext {
    /// Validate sudo with a reason shown to the user. Returns `None` when
    /// already root.
    pub fn acquire(reason: &str) -> Result<Option<Self>> {
        if is_root() {
            return Ok(None);
        }

        eprintln!();
        eprintln!("  Sudo required: {reason}");
        eprintln!();

        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }

        Ok(Some(Self { _private: () }))
    }
}

impl Drop for SudoContext {
    fn drop(&mut self) {
        let _ = Command::new("sudo").arg("-k").status();
    }
}
