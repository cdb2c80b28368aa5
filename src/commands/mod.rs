//! Command implementations
//!
//! Every command starts from a [`Session`]: the config root, `config.yaml`,
//! and the selected host with its modules resolved.

pub mod hook;
pub mod merge;
pub mod module;
pub mod status;
pub mod sync;
pub mod update;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use reconcile::dotfiles::{Conflict, LinkAction, LinkChange, SyncReport};
use reconcile::{
    ConfirmCallback, Declarations, DisableReason, FileLedgerStore, HookKey, HookOutcome, Ledger,
    PackagePlan, PrivilegeProvider, ProgressCallback, ResolvedHook, ServicePlan, SyncPhase,
};
use std::path::PathBuf;

use crate::Context;
use crate::backend::ScriptInterpreter;
use crate::config::{AppConfig, ConfigRoot};
use crate::paths;
use crate::sudo::SudoContext;
use crate::ui;

/// Everything a command needs about the active host
pub struct Session {
    pub root: ConfigRoot,
    pub app: AppConfig,
    pub decls: Declarations,
    pub home: PathBuf,
}

impl Session {
    pub fn load(ctx: &Context) -> Result<Self> {
        let root = ConfigRoot::discover()?;
        let app = root.app_config()?;
        let host_name = root.select_host(ctx.host.as_deref(), &app)?;
        let host = root.load_host(&host_name)?;
        let decls = Declarations::resolve(host, &root.modules());
        log::debug!(
            "Host {host_name}: {} modules loaded, {} missing, {} invalid",
            decls.modules.len(),
            decls.missing_modules().len(),
            decls.invalid_modules().len()
        );

        Ok(Self {
            root,
            app,
            decls,
            home: paths::home_dir()?,
        })
    }

    pub fn open_ledger(&self) -> Result<Ledger> {
        Ok(Ledger::open(FileLedgerStore::new(paths::ledger_file()?))?)
    }

    pub fn interpreter(&self) -> ScriptInterpreter {
        ScriptInterpreter::new(self.app.interpreter())
    }

    /// Print a warning per missing or unloadable module. Returns whether
    /// there were any.
    pub fn warn_module_defects(&self) -> bool {
        let host = &self.decls.host.name;
        let missing = self.decls.missing_modules();
        for name in missing {
            ui::warn(&format!(
                "Module '{name}' is listed by host '{host}' but does not exist"
            ));
        }
        let invalid = self.decls.invalid_modules();
        for module in invalid {
            ui::warn(&format!(
                "Module '{}' could not be loaded: {}",
                module.name, module.reason
            ));
        }
        !missing.is_empty() || !invalid.is_empty()
    }
}

// ============================================================================
// Shared reporting
// ============================================================================

pub fn print_package_plan(plan: &PackagePlan, prune: bool) {
    ui::section("Packages");

    if !plan.to_install.is_empty() {
        println!("  {}", format!("To install ({})", plan.to_install.len()).bold());
        for pkg in &plan.to_install {
            ui::added(pkg);
        }
    }

    if prune {
        let removals = plan.removals(true);
        if !removals.is_empty() {
            println!("  {}", format!("To remove ({})", removals.len()).bold());
            for pkg in &removals {
                let note = if plan.orphans.contains(pkg) && !plan.undeclared.contains(pkg) {
                    format!("{pkg} {}", "(orphan)".dimmed())
                } else {
                    pkg.clone()
                };
                ui::removed(&note);
            }
        }
    } else {
        print_advisory("Undeclared (prune is off, not removed)", &plan.undeclared);
        print_advisory("Orphans (prune is off, not removed)", &plan.orphans);
    }

    if plan.is_in_sync(prune) {
        ui::dim("Packages are in sync");
    }
}

fn print_advisory(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("  {}", format!("{title} ({})", items.len()).yellow());
    for item in items {
        ui::item(item);
    }
}

pub fn print_service_plan(plan: &ServicePlan) {
    ui::section("Services");
    if plan.is_empty() {
        ui::dim("Services are in sync");
        return;
    }

    for key in &plan.to_enable {
        ui::added(&format!("enable {key}"));
    }
    for disable in &plan.to_disable {
        let note = match disable.reason {
            DisableReason::Declared => String::new(),
            DisableReason::Undeclared => format!(" {}", "(no longer declared)".dimmed()),
        };
        ui::removed(&format!("disable {}{note}", disable.key));
    }
}

pub fn print_link_change(change: &LinkChange, dry_run: bool) {
    let verb = if dry_run { "would link" } else { "link" };
    let line = format!(
        "{verb} {} -> {}",
        ui::tilde(&change.link.target),
        ui::tilde(&change.link.source)
    );
    match &change.action {
        LinkAction::Create => ui::added(&line),
        LinkAction::Replace { previous } => {
            ui::changed(&format!("{line} (was -> {})", previous.display()));
        }
        LinkAction::Backup { backup } => {
            ui::changed(&format!("{line} (backup: {})", ui::tilde(backup)));
        }
    }
}

pub fn print_hook_start(hook: &ResolvedHook) {
    let root = if hook.root { " as root" } else { "" };
    ui::info(&format!(
        "Running hook {}{root}: {}",
        hook.key,
        ui::tilde(&hook.script)
    ));
}

pub fn print_hook_outcome(key: &HookKey, outcome: HookOutcome) {
    match outcome {
        HookOutcome::Ran => ui::success(&format!("Hook {key} completed")),
        HookOutcome::WouldRun => ui::info(&format!("Would run hook {key}")),
        HookOutcome::AlreadyRun => log::info!("Hook {key} already run"),
        HookOutcome::NotConfigured => {}
    }
}

// ============================================================================
// Engine callbacks
// ============================================================================

/// Prints each step as the engine reaches it
pub struct UiProgress;

impl ProgressCallback for UiProgress {
    fn on_phase_start(&mut self, phase: SyncPhase) {
        match phase {
            SyncPhase::Dotfiles => ui::section("Dotfiles"),
            _ => log::debug!("Starting {phase}"),
        }
    }

    fn on_warning(&mut self, message: &str) {
        ui::warn(message);
    }

    fn on_conflict(&mut self, conflict: &Conflict) {
        ui::error(&format!("Conflict: {conflict}"));
    }

    fn on_package_plan(&mut self, plan: &PackagePlan, prune: bool) {
        print_package_plan(plan, prune);
    }

    fn on_service_plan(&mut self, plan: &ServicePlan) {
        print_service_plan(plan);
    }

    fn on_link_start(&mut self, change: &LinkChange, dry_run: bool) {
        print_link_change(change, dry_run);
    }

    fn on_links_complete(&mut self, report: &SyncReport) {
        if report.is_noop() {
            ui::dim("Dotfiles are in sync");
        }
    }

    fn on_hook_start(&mut self, hook: &ResolvedHook) {
        print_hook_start(hook);
    }

    fn on_hook_complete(&mut self, key: &HookKey, outcome: HookOutcome) {
        print_hook_outcome(key, outcome);
    }
}

/// Asks on the terminal; defaults to no
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> reconcile::Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| reconcile::Error::backend("confirm", e.to_string()))
    }
}

/// Acquires sudo on first request and holds it until dropped
#[derive(Default)]
pub struct LazySudo {
    /// `Some(None)` once acquired while already root
    held: Option<Option<SudoContext>>,
}

impl PrivilegeProvider for LazySudo {
    fn acquire(&mut self, reason: &str) -> reconcile::Result<()> {
        if self.held.is_none() {
            let sudo = SudoContext::acquire(reason)
                .map_err(|e| reconcile::Error::backend("acquire sudo", format!("{e:#}")))?;
            self.held = Some(sudo);
        }
        Ok(())
    }
}
