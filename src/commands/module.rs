//! `hostform module` - inspect modules on disk and edit the host's list

use anyhow::{Result, bail};
use colored::Colorize;
use reconcile::hooks::{HookPhase, module_hook};
use reconcile::resolver::stable_dedup_by_key;
use reconcile::{DotfilesDecl, Module, ModuleSource};
use serde_yaml::Value;
use std::collections::BTreeSet;

use crate::Context;
use crate::cli::ModuleCommand;
use crate::config::{ConfigRoot, ModuleDir, YamlDoc};
use crate::paths;
use crate::ui;

/// Key of the module list in a host file
const MODULES_KEY: &str = "modules";

pub fn run(ctx: &Context, cmd: &ModuleCommand) -> Result<()> {
    match cmd {
        ModuleCommand::List => list(ctx),
        ModuleCommand::Show { name } => show(name),
        ModuleCommand::New { names } => create(names),
        ModuleCommand::On { names } => switch(ctx, names, true),
        ModuleCommand::Off { names } => switch(ctx, names, false),
    }
}

/// Modules the selected host lists, if a host can be resolved
fn active_modules(ctx: &Context, root: &ConfigRoot) -> Vec<String> {
    let host = root
        .app_config()
        .and_then(|app| root.select_host(ctx.host.as_deref(), &app))
        .and_then(|name| root.load_host(&name));
    match host {
        Ok(host) => host.modules,
        Err(e) => {
            log::debug!("No active host: {e:#}");
            Vec::new()
        }
    }
}

fn list(ctx: &Context) -> Result<()> {
    let root = ConfigRoot::discover()?;
    let modules = root.modules();
    let names = modules.list()?;
    let active = active_modules(ctx, &root);
    let active_set: BTreeSet<&String> = active.iter().collect();

    ui::header("Modules");
    if names.is_empty() {
        ui::dim(&format!("No modules in {}", ui::tilde(modules.root())));
    }

    for name in &names {
        let marker = if active_set.contains(name) {
            "●".green()
        } else {
            "○".dimmed()
        };
        let summary = match modules.load_module(name) {
            Ok(Some(module)) => summarize(&module),
            Ok(None) => String::new(),
            Err(e) => format!("{}", e.to_string().red()),
        };
        println!("  {marker} {:<20} {}", name.bold(), summary.dimmed());
    }

    for name in active.iter().filter(|n| !names.contains(n)) {
        println!("  {} {:<20} {}", "✗".red(), name.bold(), "missing".red());
    }
    Ok(())
}

fn summarize(module: &Module) -> String {
    let decl = &module.decl;
    let mut parts = vec![
        ui::count(decl.packages.len(), "package"),
        ui::count(decl.services.len(), "service"),
    ];
    match decl.dotfiles {
        DotfilesDecl::Off => {}
        DotfilesDecl::All => parts.push("dotfiles".to_string()),
        DotfilesDecl::Explicit(ref map) => parts.push(ui::count(map.len(), "dotfile")),
        DotfilesDecl::Invalid => parts.push("invalid dotfiles".to_string()),
    }
    if !decl.hooks.is_empty() {
        parts.push("hooks".to_string());
    }
    parts.join(", ")
}

fn show(name: &str) -> Result<()> {
    let root = ConfigRoot::discover()?;
    let Some(module) = root.modules().load_module(name)? else {
        bail!("Module '{name}' not found in {}", root.modules().root().display());
    };
    let decl = &module.decl;

    ui::header(&format!("Module: {}", module.name));
    ui::kv("Path", &ui::tilde(&module.dir));

    ui::section("Packages");
    if decl.packages.is_empty() {
        ui::dim("none");
    }
    for pkg in &decl.packages {
        ui::item(pkg);
    }

    ui::section("Services");
    if decl.services.is_empty() {
        ui::dim("none");
    }
    for svc in &decl.services {
        let state = if svc.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        };
        ui::item(&format!("{svc} {state}"));
    }

    ui::section("Dotfiles");
    match &decl.dotfiles {
        DotfilesDecl::Off => ui::dim("off"),
        DotfilesDecl::All => ui::item("every entry of dotfiles/ into ~/.config"),
        DotfilesDecl::Explicit(map) => {
            for (entry, target) in map {
                ui::item(&format!("{entry} -> {target}"));
            }
        }
        DotfilesDecl::Invalid => ui::warn("invalid dotfiles declaration"),
    }

    ui::section("Hooks");
    let hooks: Vec<_> = HookPhase::MODULE
        .into_iter()
        .filter_map(|phase| module_hook(&module, phase))
        .collect();
    if hooks.is_empty() {
        ui::dim("none");
    }
    for hook in hooks {
        let mut line = format!("{}: {}", hook.key.phase, ui::tilde(&hook.script));
        if hook.always {
            line.push_str(" [always]");
        }
        if hook.root {
            line.push_str(" [root]");
        }
        if !hook.exists() {
            line.push_str(&format!(" {}", "(missing)".red()));
        }
        ui::item(&line);
    }
    Ok(())
}

fn create(names: &[String]) -> Result<()> {
    let root = ConfigRoot::discover()?;
    let modules = root.modules();
    for name in names {
        if modules.create(name)? {
            ui::success(&format!(
                "Created module {name} at {}",
                ui::tilde(&modules.module_file(name))
            ));
        } else {
            ui::warn(&format!("Module '{name}' already exists"));
        }
    }
    Ok(())
}

/// What an edit did to the host's module list
#[derive(Debug, Default, PartialEq, Eq)]
struct ListEdit {
    changed: Vec<String>,
    /// Already in (or already absent from) the list
    unchanged: Vec<String>,
    /// Not on disk; never added
    unknown: Vec<String>,
}

fn activate(doc: &mut YamlDoc, names: &[String], modules: &ModuleDir) -> Result<ListEdit> {
    let active = doc.strings(MODULES_KEY);
    let mut edit = ListEdit::default();
    for name in stable_dedup_by_key(names.iter().cloned(), Clone::clone) {
        if active.contains(&name) {
            edit.unchanged.push(name);
        } else if modules.module_file(&name).is_file() {
            edit.changed.push(name);
        } else {
            edit.unknown.push(name);
        }
    }
    doc.append_unique(
        MODULES_KEY,
        edit.changed.iter().map(|n| Value::from(n.as_str())),
    )?;
    Ok(edit)
}

fn deactivate(doc: &mut YamlDoc, names: &[String]) -> Result<ListEdit> {
    let removed = doc.remove_strings(MODULES_KEY, names)?;
    let mut edit = ListEdit::default();
    for name in stable_dedup_by_key(names.iter().cloned(), Clone::clone) {
        if removed.contains(&name) {
            edit.changed.push(name);
        } else {
            edit.unchanged.push(name);
        }
    }
    Ok(edit)
}

fn switch(ctx: &Context, names: &[String], on: bool) -> Result<()> {
    let root = ConfigRoot::discover()?;
    let host = root.select_host(ctx.host.as_deref(), &root.app_config()?)?;
    let path = paths::host_file(&root.dir, &host);
    if !path.exists() {
        bail!("Host file not found: {}", path.display());
    }

    let mut doc = YamlDoc::open(&path)?;
    let edit = if on {
        activate(&mut doc, names, &root.modules())?
    } else {
        deactivate(&mut doc, names)?
    };

    for name in &edit.unknown {
        ui::warn(&format!(
            "Module '{name}' not found in {}",
            ui::tilde(root.modules().root())
        ));
    }
    for name in &edit.unchanged {
        let state = if on { "already active" } else { "not active" };
        ui::info(&format!("Module '{name}' is {state} on {host}"));
    }
    if edit.changed.is_empty() {
        return Ok(());
    }

    doc.save()?;
    let verb = if on { "Activated" } else { "Deactivated" };
    for name in &edit.changed {
        ui::success(&format!("{verb} {name} on {host}"));
    }
    Ok(())
}
