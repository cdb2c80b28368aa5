//! `hostform sync` - converge the system
//!
//! The phase sequence lives in [`reconcile::converge`]; this command wires it
//! to pacman, systemctl, the hook interpreter and the terminal.

use anyhow::{Context as _, Result};
use reconcile::converge::{self, SyncContext, SyncOptions};
use reconcile::{AutoConfirm, ConfirmCallback, resolve_prune_mode};

use super::{LazySudo, PromptConfirm, Session, UiProgress};
use crate::Context;
use crate::backend::{Pacman, Systemctl};
use crate::cli::SyncArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &SyncArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    let decls = &session.decls;
    let host = &decls.host;

    if session.warn_module_defects() {
        decls
            .ensure_complete()
            .context("Refusing to sync with missing or invalid modules")?;
    }

    ui::header(&format!("Syncing host: {}", host.name));
    if args.dry_run {
        ui::info("Dry run - no changes will be made");
    }

    let opts = SyncOptions {
        dry_run: args.dry_run,
        prune: resolve_prune_mode(host, args.prune.as_override()),
        skip_hooks: args.no_hooks,
        skip_dotfiles: args.no_dotfiles,
        skip_services: args.no_services,
    };

    let pacman = Pacman::new(host.aur_helper.as_deref());
    let interpreter = session.interpreter();
    let mut ledger = session.open_ledger()?;
    let mut sudo = LazySudo::default();
    let mut auto = AutoConfirm;
    let mut prompt = PromptConfirm;
    let confirm: &mut dyn ConfirmCallback = if args.yes { &mut auto } else { &mut prompt };

    let mut sync_ctx = SyncContext {
        packages: &pacman,
        services: &Systemctl,
        interpreter: &interpreter,
        progress: &mut UiProgress,
        confirm,
        privilege: &mut sudo,
    };
    converge::sync(decls, &session.home, &mut ledger, &mut sync_ctx, &opts)?;

    println!();
    if args.dry_run {
        ui::info("Dry run complete");
    } else {
        ui::success("Sync complete");
    }
    Ok(())
}
