//! `hostform merge` - adopt what is on the machine but in no module
//!
//! Explicitly installed packages, or enabled services with `--services`, that
//! no active module declares are appended to the `system` module. Entries the
//! `system` module already lists are never added twice, whether or not the
//! host has it active.

use anyhow::{Context as _, Result};
use reconcile::{ModuleSource, PackagePlan, ServiceKey, ServiceScope, undeclared_enabled};
use serde_yaml::{Mapping, Value};

use super::Session;
use crate::Context;
use crate::backend::{Pacman, Systemctl};
use crate::cli::MergeArgs;
use crate::config::YamlDoc;
use crate::ui;

/// Module that captured packages and services land in
pub const CAPTURE_MODULE: &str = "system";

pub fn run(ctx: &Context, args: &MergeArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    session.warn_module_defects();
    let decls = &session.decls;
    let modules = session.root.modules();

    let existing = modules
        .load_module(CAPTURE_MODULE)
        .with_context(|| format!("Cannot merge into module '{CAPTURE_MODULE}'"))?;
    let (owned_packages, owned_services) = existing
        .map(|m| (m.decl.packages, m.decl.services))
        .unwrap_or_default();

    let (key, noun, captured) = if args.services {
        let mut declared = decls.services();
        declared.extend(owned_services);
        let found = undeclared_enabled(&declared, &Systemctl)?;
        ("services", "service", found.iter().map(service_entry).collect::<Vec<_>>())
    } else {
        let mut declared = decls.packages();
        declared.extend(owned_packages);
        let pacman = Pacman::new(decls.host.aur_helper.as_deref());
        let plan = PackagePlan::observe(&declared, &pacman)?;
        ("packages", "package", package_entries(&plan.undeclared))
    };

    ui::header(&format!("Merging {key} into {CAPTURE_MODULE}"));
    if captured.is_empty() {
        ui::success(&format!("All {key} are already managed"));
        return Ok(());
    }
    for (label, _) in &captured {
        ui::added(label);
    }

    let path = modules.module_file(CAPTURE_MODULE);
    if args.dry_run {
        ui::info(&format!(
            "Dry run - would add {} to {}",
            ui::count(captured.len(), noun),
            ui::tilde(&path)
        ));
        return Ok(());
    }

    let mut doc = YamlDoc::open(&path)?;
    let added = doc.append_unique(key, captured.into_iter().map(|(_, entry)| entry))?;
    doc.save()?;
    ui::success(&format!(
        "Added {} to {}",
        ui::count(added, noun),
        ui::tilde(doc.path())
    ));

    if !decls.host.modules.iter().any(|m| m == CAPTURE_MODULE) {
        ui::info(&format!(
            "Module '{CAPTURE_MODULE}' is not active on {}; run `hostform module on {CAPTURE_MODULE}`",
            decls.host.name
        ));
    }
    Ok(())
}

/// Display label and module-file entry for each package
fn package_entries(names: &[String]) -> Vec<(String, Value)> {
    names
        .iter()
        .map(|n| (n.clone(), Value::from(n.as_str())))
        .collect()
}

/// System units as a bare name, user units as `{name, user: true}`
fn service_entry(key: &ServiceKey) -> (String, Value) {
    match key.scope {
        ServiceScope::System => (key.name.clone(), Value::from(key.name.as_str())),
        ServiceScope::User => {
            let mut map = Mapping::new();
            map.insert("name".into(), key.name.as_str().into());
            map.insert("user".into(), true.into());
            (format!("{} (user)", key.name), Value::Mapping(map))
        }
    }
}
