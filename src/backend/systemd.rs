//! systemctl service backend

use reconcile::{Result, ServiceBackend, ServiceKey, ServiceScope};
use std::collections::BTreeSet;

use super::{backend_error, exit_message};
use crate::runner;

const SYSTEMCTL: &str = "systemctl";

/// System units go through sudo; user units run as the caller
pub struct Systemctl;

fn args<'a>(key: &'a ServiceKey, verb: &[&'a str]) -> Vec<&'a str> {
    let mut args = Vec::with_capacity(verb.len() + 2);
    if key.scope.is_user() {
        args.push("--user");
    }
    args.extend_from_slice(verb);
    args.push(&key.name);
    args
}

impl Systemctl {
    fn change(&self, key: &ServiceKey, verb: &str) -> Result<()> {
        let action = format!("{verb} {key}");
        let status = runner::run(SYSTEMCTL, &args(key, &[verb, "--now"]), !key.scope.is_user())
            .map_err(|e| backend_error(&action, &e))?;
        if status.success() {
            Ok(())
        } else {
            Err(reconcile::Error::backend(action, exit_message(status)))
        }
    }
}

impl ServiceBackend for Systemctl {
    fn is_enabled(&self, key: &ServiceKey) -> Result<bool> {
        let output = runner::run_output(SYSTEMCTL, &args(key, &["is-enabled"]), false)
            .map_err(|e| backend_error(format!("check {key}"), &e))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "enabled")
    }

    fn enable(&self, key: &ServiceKey) -> Result<()> {
        self.change(key, "enable")
    }

    fn disable(&self, key: &ServiceKey) -> Result<()> {
        self.change(key, "disable")
    }

    fn enabled_units(&self, scope: ServiceScope) -> Result<BTreeSet<String>> {
        let mut args = Vec::with_capacity(5);
        if scope.is_user() {
            args.push("--user");
        }
        args.extend([
            "list-unit-files",
            "--type=service",
            "--state=enabled",
            "--no-legend",
        ]);

        let action = format!("list enabled {scope} services");
        let output = runner::run_output(SYSTEMCTL, &args, false)
            .map_err(|e| backend_error(&action, &e))?;
        if !output.status.success() {
            return Err(reconcile::Error::backend(
                action,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_unit_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// First column of `systemctl list-unit-files --no-legend` output
fn parse_unit_list(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
