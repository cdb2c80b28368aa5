//! The sync pipeline
//!
//! Phases run in a fixed order and the first failure stops the run:
//!
//! 1. host `pre_sync` hook
//! 2. module `pre` hooks, in module order
//! 3. packages
//! 4. dotfiles
//! 5. services
//! 6. module `post` hooks, in module order
//! 7. host `post_sync` hook
//!
//! A host with missing or unloadable modules is refused before phase 1.
//! Failures come back as [`Error::Phase`] so the caller can tell the
//! operator how far the run got.

use std::fmt;
use std::path::Path;

use crate::context::{
    ConfirmCallback, HookInterpreter, PackageBackend, PrivilegeProvider, ProgressCallback,
    ServiceBackend,
};
use crate::dotfiles;
use crate::error::{Error, Result};
use crate::hooks::{HookPhase, HookRunner};
use crate::ledger::Ledger;
use crate::packages::PackagePlan;
use crate::resolver::Declarations;
use crate::services::ServicePlan;

/// One step of a sync, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    PreSync,
    PreHooks,
    Packages,
    Dotfiles,
    Services,
    PostHooks,
    PostSync,
}

impl SyncPhase {
    pub const ALL: [Self; 7] = [
        Self::PreSync,
        Self::PreHooks,
        Self::Packages,
        Self::Dotfiles,
        Self::Services,
        Self::PostHooks,
        Self::PostSync,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::PreSync => "pre_sync hook",
            Self::PreHooks => "module pre hooks",
            Self::Packages => "packages",
            Self::Dotfiles => "dotfiles",
            Self::Services => "services",
            Self::PostHooks => "module post hooks",
            Self::PostSync => "post_sync hook",
        }
    }

    /// What a failure in this phase leaves behind
    pub fn aftermath(&self) -> &'static str {
        match self {
            Self::PreSync | Self::PreHooks => "nothing was changed",
            Self::Packages | Self::Dotfiles | Self::Services => "later phases were skipped",
            Self::PostHooks | Self::PostSync => "earlier changes were applied",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Switches for one sync run
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Remove undeclared packages and orphans
    pub prune: bool,
    pub skip_hooks: bool,
    pub skip_dotfiles: bool,
    pub skip_services: bool,
}

/// Backends and callbacks a sync runs against
pub struct SyncContext<'a> {
    pub packages: &'a dyn PackageBackend,
    pub services: &'a dyn ServiceBackend,
    pub interpreter: &'a dyn HookInterpreter,
    pub progress: &'a mut dyn ProgressCallback,
    pub confirm: &'a mut dyn ConfirmCallback,
    pub privilege: &'a mut dyn PrivilegeProvider,
}

/// Converge the machine onto `decls`.
pub fn sync(
    decls: &Declarations,
    home: &Path,
    ledger: &mut Ledger,
    ctx: &mut SyncContext<'_>,
    opts: &SyncOptions,
) -> Result<()> {
    decls.ensure_complete()?;

    for phase in SyncPhase::ALL {
        let skipped = match phase {
            SyncPhase::PreSync
            | SyncPhase::PreHooks
            | SyncPhase::PostHooks
            | SyncPhase::PostSync => opts.skip_hooks,
            SyncPhase::Dotfiles => opts.skip_dotfiles,
            SyncPhase::Services => opts.skip_services,
            SyncPhase::Packages => false,
        };
        if skipped {
            log::info!("Skipping {phase}");
            continue;
        }

        ctx.progress.on_phase_start(phase);
        run_phase(phase, decls, home, ledger, ctx, opts)
            .map_err(|e| Error::in_phase(phase, e))?;
    }
    Ok(())
}

fn run_phase(
    phase: SyncPhase,
    decls: &Declarations,
    home: &Path,
    ledger: &mut Ledger,
    ctx: &mut SyncContext<'_>,
    opts: &SyncOptions,
) -> Result<()> {
    match phase {
        SyncPhase::PreSync => host_hook(decls, ledger, ctx, HookPhase::PreSync, opts.dry_run),
        SyncPhase::PreHooks => module_hooks(decls, ledger, ctx, HookPhase::Pre, opts.dry_run),
        SyncPhase::Packages => packages(decls, ctx, opts),
        SyncPhase::Dotfiles => links(decls, home, ctx, opts.dry_run),
        SyncPhase::Services => services(decls, ledger, ctx, opts.dry_run),
        SyncPhase::PostHooks => module_hooks(decls, ledger, ctx, HookPhase::Post, opts.dry_run),
        SyncPhase::PostSync => host_hook(decls, ledger, ctx, HookPhase::PostSync, opts.dry_run),
    }
}

fn host_hook(
    decls: &Declarations,
    ledger: &mut Ledger,
    ctx: &mut SyncContext<'_>,
    phase: HookPhase,
    dry_run: bool,
) -> Result<()> {
    HookRunner::new(ctx.interpreter, ledger, dry_run)
        .with_progress(&mut *ctx.progress)
        .run_host(&decls.host, phase)?;
    Ok(())
}

fn module_hooks(
    decls: &Declarations,
    ledger: &mut Ledger,
    ctx: &mut SyncContext<'_>,
    phase: HookPhase,
    dry_run: bool,
) -> Result<()> {
    let mut runner =
        HookRunner::new(ctx.interpreter, ledger, dry_run).with_progress(&mut *ctx.progress);
    for module in &decls.modules {
        runner.run_module(module, phase)?;
    }
    Ok(())
}

fn packages(decls: &Declarations, ctx: &mut SyncContext<'_>, opts: &SyncOptions) -> Result<()> {
    let plan = PackagePlan::observe(&decls.packages(), ctx.packages)?;
    ctx.progress.on_package_plan(&plan, opts.prune);
    if opts.dry_run || plan.is_in_sync(opts.prune) {
        return Ok(());
    }

    let privileged = ctx.packages.needs_privilege();
    if !plan.to_install.is_empty() {
        if privileged {
            ctx.privilege.acquire("install packages")?;
        }
        ctx.packages.install(&plan.to_install)?;
    }

    let removals = plan.removals(opts.prune);
    if removals.is_empty() {
        return Ok(());
    }
    let prompt = format!(
        "Remove {} package{}?",
        removals.len(),
        if removals.len() == 1 { "" } else { "s" }
    );
    if !ctx.confirm.confirm(&prompt)? {
        ctx.progress.on_warning("Skipping package removal");
        return Ok(());
    }
    if privileged {
        ctx.privilege.acquire("remove packages")?;
    }
    ctx.packages.remove(&removals)
}

fn links(
    decls: &Declarations,
    home: &Path,
    ctx: &mut SyncContext<'_>,
    dry_run: bool,
) -> Result<()> {
    let resolved = decls.dotfiles(home)?;
    for warning in &resolved.warnings {
        ctx.progress.on_warning(warning);
    }

    let report = dotfiles::sync(&resolved.links, dry_run, &mut *ctx.progress)?;
    ctx.progress.on_links_complete(&report);
    Ok(())
}

fn services(
    decls: &Declarations,
    ledger: &mut Ledger,
    ctx: &mut SyncContext<'_>,
    dry_run: bool,
) -> Result<()> {
    let plan = ServicePlan::reconcile(&decls.services(), ctx.services, ledger)?;
    ctx.progress.on_service_plan(&plan);
    if !dry_run && plan.touches_system() {
        ctx.privilege.acquire("change system services")?;
    }
    plan.apply(ctx.services, ledger, dry_run)
}
