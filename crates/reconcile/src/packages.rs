//! Package planning
//!
//! Pure diffing of the declared package list against what the package
//! manager reports. Orphan detection belongs to the package manager; the
//! plan only carries its answer through.

use std::collections::BTreeSet;

use crate::context::PackageBackend;
use crate::error::Result;
use crate::resolver::stable_dedup_by_key;
use crate::types::HostConfig;

/// Prune setting used when neither the host nor the caller sets one
pub const DEFAULT_PRUNE: bool = true;

/// What the package step will do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePlan {
    /// Declared but not installed, in declaration order
    pub to_install: Vec<String>,
    /// Explicitly installed but declared by no active module, sorted
    pub undeclared: Vec<String>,
    /// Dependencies nothing requires any more, sorted
    pub orphans: Vec<String>,
}

impl PackagePlan {
    /// Diff declared packages against the installed explicit set.
    pub fn compute(
        declared: &[String],
        installed_explicit: &BTreeSet<String>,
        orphans: &BTreeSet<String>,
    ) -> Self {
        let to_install = stable_dedup_by_key(
            declared
                .iter()
                .filter(|p| !installed_explicit.contains(*p))
                .cloned(),
            Clone::clone,
        );

        let declared_set: BTreeSet<&String> = declared.iter().collect();
        let undeclared = installed_explicit
            .iter()
            .filter(|p| !declared_set.contains(p))
            .cloned()
            .collect();

        Self {
            to_install,
            undeclared,
            orphans: orphans.iter().cloned().collect(),
        }
    }

    /// Query the backend and diff
    pub fn observe(declared: &[String], backend: &dyn PackageBackend) -> Result<Self> {
        let installed = backend.explicit_packages()?;
        let orphans = backend.orphan_packages()?;
        log::debug!(
            "{} explicit packages installed, {} orphans",
            installed.len(),
            orphans.len()
        );
        Ok(Self::compute(declared, &installed, &orphans))
    }

    /// Packages to remove: undeclared and orphans when pruning, else none
    pub fn removals(&self, prune: bool) -> Vec<String> {
        if !prune {
            return Vec::new();
        }
        let all: BTreeSet<&String> = self.undeclared.iter().chain(&self.orphans).collect();
        all.into_iter().cloned().collect()
    }

    /// Nothing to install and nothing to remove under `prune`
    pub fn is_in_sync(&self, prune: bool) -> bool {
        self.to_install.is_empty() && self.removals(prune).is_empty()
    }
}

/// Caller override, then the host's `auto_prune`, then [`DEFAULT_PRUNE`].
pub fn resolve_prune_mode(host: &HostConfig, override_prune: Option<bool>) -> bool {
    override_prune.or(host.auto_prune).unwrap_or(DEFAULT_PRUNE)
}

/// Parse a newline-separated package list, ignoring blank lines
pub fn parse_package_list(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
