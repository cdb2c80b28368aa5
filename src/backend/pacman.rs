//! pacman, optionally fronted by an AUR helper

use reconcile::{PackageBackend, Result, parse_package_list};
use std::collections::BTreeSet;

use super::{backend_error, exit_message};
use crate::runner;

/// AUR helpers tried, in order, when none is configured or found
const KNOWN_HELPERS: &[&str] = &["paru", "yay"];

const PACMAN: &str = "pacman";

pub struct Pacman {
    helper: String,
}

impl Pacman {
    /// Use the configured helper when it is installed, else the first known
    /// helper found, else plain pacman
    pub fn new(aur_helper: Option<&str>) -> Self {
        let helper = resolve_helper(aur_helper, runner::command_exists);
        log::debug!("Using package helper: {helper}");
        Self { helper }
    }

    pub fn helper(&self) -> &str {
        &self.helper
    }

    /// AUR helpers elevate on their own; pacman needs sudo
    fn elevate(&self) -> bool {
        self.helper == PACMAN
    }

    fn query(&self, flags: &str) -> Result<std::process::Output> {
        runner::run_output(PACMAN, &[flags], false)
            .map_err(|e| backend_error(format!("{PACMAN} {flags}"), &e))
    }

    fn apply(&self, action: &str, flags: &[&str], packages: &[String]) -> Result<()> {
        let mut args: Vec<&str> = flags.to_vec();
        args.extend(packages.iter().map(String::as_str));

        let status = runner::run(&self.helper, &args, self.elevate())
            .map_err(|e| backend_error(action, &e))?;
        if status.success() {
            Ok(())
        } else {
            Err(reconcile::Error::backend(action, exit_message(status)))
        }
    }
}

impl PackageBackend for Pacman {
    fn explicit_packages(&self) -> Result<BTreeSet<String>> {
        let output = self.query("-Qqe")?;
        if !output.status.success() {
            return Err(reconcile::Error::backend(
                "list explicit packages",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_package_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn orphan_packages(&self) -> Result<BTreeSet<String>> {
        // pacman exits non-zero when there are no orphans
        let output = self.query("-Qdtq")?;
        if !output.status.success() {
            return Ok(BTreeSet::new());
        }
        Ok(parse_package_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        self.apply("install packages", &["-S", "--needed"], packages)
    }

    fn remove(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        self.apply("remove packages", &["-Rsu", "--noconfirm"], packages)
    }

    fn upgrade(&self) -> Result<()> {
        self.apply("upgrade system", &["-Syu"], &[])
    }

    fn needs_privilege(&self) -> bool {
        self.elevate()
    }
}

/// Pick the package helper from what is on `PATH`
pub fn resolve_helper(configured: Option<&str>, exists: impl Fn(&str) -> bool) -> String {
    if let Some(helper) = configured.filter(|h| !h.is_empty()) {
        if exists(helper) {
            return helper.to_string();
        }
        log::warn!("Configured AUR helper '{helper}' not found, falling back");
    }

    KNOWN_HELPERS
        .iter()
        .find(|h| exists(h))
        .map_or_else(|| PACMAN.to_string(), |h| (*h).to_string())
}
