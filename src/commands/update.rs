//! `hostform update` - full system upgrade between the host's update hooks

use anyhow::{Context as _, Result};
use reconcile::{HookPhase, HookRunner, PackageBackend};

use super::{Session, UiProgress};
use crate::Context;
use crate::backend::Pacman;
use crate::cli::UpdateArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &UpdateArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    let host = &session.decls.host;

    ui::header(&format!("Updating host: {}", host.name));
    session.warn_module_defects();
    if args.dry_run {
        ui::info("Dry run - no changes will be made");
    }

    let interpreter = session.interpreter();
    let mut ledger = session.open_ledger()?;

    if !args.no_hooks {
        HookRunner::new(&interpreter, &mut ledger, args.dry_run)
            .with_progress(&mut UiProgress)
            .run_host(host, HookPhase::PreUpdate)
            .context("pre_update hook failed, nothing was upgraded")?;
    }

    let pacman = Pacman::new(host.aur_helper.as_deref());
    if args.dry_run {
        ui::info(&format!("Would run {} -Syu", pacman.helper()));
    } else {
        ui::info(&format!("Running {} -Syu", pacman.helper()));
        pacman.upgrade().context("System upgrade failed")?;
        ui::success("System upgraded");
    }

    if !args.no_hooks {
        HookRunner::new(&interpreter, &mut ledger, args.dry_run)
            .with_progress(&mut UiProgress)
            .run_host(host, HookPhase::PostUpdate)
            .context("post_update hook failed after the upgrade")?;
    }

    Ok(())
}
