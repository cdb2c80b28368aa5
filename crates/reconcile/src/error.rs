//! Error types for reconciliation.
//!
//! Errors are grouped the way the driver reports them: configuration
//! defects, dotfile conflicts, external process failures and ledger
//! problems. A missing ledger is not an error (see [`crate::ledger`]).

use std::path::PathBuf;
use thiserror::Error;

use crate::converge::SyncPhase;
use crate::dotfiles::Conflict;
use crate::hooks::HookKey;
use crate::resolver::InvalidModule;

/// Errors that can occur while reconciling a host.
#[derive(Debug, Error)]
pub enum Error {
    /// The host references modules that do not exist on disk
    #[error("missing modules: {}", .0.join(", "))]
    MissingModules(Vec<String>),

    /// Listed modules exist but could not be loaded
    #[error("invalid modules: {}", describe_invalid(.0))]
    InvalidModules(Vec<InvalidModule>),

    /// A host or module file could not be read or parsed
    #[error("invalid declaration {}: {message}", .path.display())]
    Declaration {
        /// File being loaded
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A sync phase failed; later phases were not attempted
    #[error("{phase} failed, {}", .phase.aftermath())]
    Phase {
        phase: SyncPhase,
        #[source]
        source: Box<Error>,
    },

    /// Two or more links claim the same dotfile target
    #[error("{} dotfile conflict(s): {}", .0.len(), describe_conflicts(.0))]
    DotfileConflicts(Vec<Conflict>),

    /// A package or service backend command failed
    #[error("{action} failed: {message}")]
    Backend {
        /// What was being attempted (e.g. "enable sshd.service")
        action: String,
        /// Detail from the failed command
        message: String,
    },

    /// A hook script exited non-zero
    #[error("hook {key} failed ({}): {}", exit_label(.code), .script.display())]
    HookFailed {
        /// Hook identity
        key: HookKey,
        /// Script that was executed
        script: PathBuf,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
    },

    /// A hook key could not be parsed or names an unknown phase
    #[error("invalid hook key '{0}': expected <owner>:<phase>")]
    InvalidHookKey(String),

    /// A hook was requested that is not configured anywhere
    #[error("hook not configured: {0}")]
    HookNotConfigured(HookKey),

    /// The ledger file exists but could not be parsed
    #[error("failed to parse ledger {}: {message}", .path.display())]
    LedgerParse {
        /// Ledger file path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The ledger could not be serialized
    #[error("failed to serialize ledger: {0}")]
    LedgerSerialize(String),

    /// Filesystem error with the path that caused it
    #[error("{action} {}: {source}", .path.display())]
    Fs {
        /// What was being attempted (e.g. "create symlink")
        action: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Tag an error with the sync phase it stopped.
    pub fn in_phase(phase: SyncPhase, source: Self) -> Self {
        Self::Phase {
            phase,
            source: Box::new(source),
        }
    }

    /// Build a backend error from an action description and a message.
    pub fn backend(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Attach a path and action to an IO error.
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fs {
            action,
            path: path.into(),
            source,
        }
    }
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_invalid(modules: &[InvalidModule]) -> String {
    modules
        .iter()
        .map(|m| format!("{} ({})", m.name, m.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "terminated by signal".to_string(), |c| format!("exit {c}"))
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
