//! `hostform status` - read-only report of what a sync would change

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use reconcile::dotfiles::{LinkState, check_conflicts, link_state};
use reconcile::{PackagePlan, ServicePlan, resolve_prune_mode};

use super::{Session, print_package_plan, print_service_plan};
use crate::Context;
use crate::backend::{Pacman, Systemctl};
use crate::cli::StatusArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &StatusArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    let decls = &session.decls;
    let host = &decls.host;

    ui::header(&format!("Host: {}", host.name));
    let defects = session.warn_module_defects();

    let prune = resolve_prune_mode(host, args.prune.as_override());
    let packages = decls.packages();
    let services = decls.services();
    ui::kv("Config", &ui::tilde(&session.root.dir));
    ui::kv("Modules", &decls.modules.len().to_string());
    ui::kv("Packages", &packages.len().to_string());
    ui::kv("Services", &services.len().to_string());
    ui::kv("Prune", if prune { "on" } else { "off" });

    let ledger = session.open_ledger()?;
    if let Some(at) = ledger.record().last_updated {
        ui::kv(
            "Last change",
            &at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        );
    }

    let pacman = Pacman::new(host.aur_helper.as_deref());
    let plan = PackagePlan::observe(&packages, &pacman)?;
    print_package_plan(&plan, prune);

    let dotfiles_in_sync = print_dotfiles(&session)?;

    let service_plan = ServicePlan::reconcile(&services, &Systemctl, &ledger)?;
    print_service_plan(&service_plan);

    println!();
    if !defects && plan.is_in_sync(prune) && dotfiles_in_sync && service_plan.is_empty() {
        ui::success("System is in sync");
    } else if defects {
        ui::warn("Sync is blocked until module errors are fixed");
    } else {
        ui::info(&format!("Run {} to apply", "hostform sync".bold()));
    }

    Ok(())
}

/// Report dotfile states and conflicts. Returns whether nothing would change.
fn print_dotfiles(session: &Session) -> Result<bool> {
    ui::section("Dotfiles");
    let resolved = session.decls.dotfiles(&session.home)?;
    for warning in &resolved.warnings {
        ui::warn(warning);
    }

    let conflicts = check_conflicts(&resolved.links);
    for conflict in &conflicts {
        ui::error(&format!("Conflict: {conflict}"));
    }

    let mut pending = 0;
    for link in &resolved.links {
        let target = ui::tilde(&link.target);
        match link_state(link) {
            LinkState::Linked => continue,
            LinkState::Missing => ui::added(&format!("{target} (missing)")),
            LinkState::Wrong { actual } => {
                ui::changed(&format!("{target} (points to {})", actual.display()));
            }
            LinkState::Blocked => ui::changed(&format!("{target} (exists, will be backed up)")),
        }
        pending += 1;
    }

    let linked = resolved.links.len() - pending;
    ui::dim(&format!(
        "{} linked, {} pending",
        ui::count(linked, "link"),
        pending
    ));

    Ok(pending == 0 && conflicts.is_empty())
}
