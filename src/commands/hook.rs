//! `hostform hook` - list, force-run and rearm lifecycle hooks

use anyhow::Result;
use colored::Colorize;
use reconcile::hooks::find_hook;
use reconcile::{HookKey, HookRunner, HookStatus};

use super::{Session, UiProgress};
use crate::Context;
use crate::cli::HookCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: &HookCommand) -> Result<()> {
    match cmd {
        HookCommand::List => list(ctx),
        HookCommand::Run { key } => run_hook(ctx, key),
        HookCommand::Reset { selector } => reset(ctx, selector),
    }
}

fn list(ctx: &Context) -> Result<()> {
    let session = Session::load(ctx)?;
    session.warn_module_defects();
    let ledger = session.open_ledger()?;
    let hooks = session.decls.hooks();

    ui::header(&format!("Hooks for {}", session.decls.host.name));
    if hooks.is_empty() {
        ui::dim("No hooks configured");
        return Ok(());
    }

    for hook in &hooks {
        let status = match HookStatus::of(hook, &ledger) {
            HookStatus::Pending => "never run".yellow(),
            HookStatus::Done => "done".green(),
            HookStatus::Always => "always".cyan(),
            HookStatus::Missing => "script missing".red(),
        };
        let mut flags = Vec::new();
        if hook.always {
            flags.push("always");
        }
        if hook.root {
            flags.push("root");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };

        println!("  {:<24} {}{}", hook.key.to_string().bold(), status, flags.dimmed());
        ui::dim(&ui::tilde(&hook.script));
    }
    Ok(())
}

fn run_hook(ctx: &Context, key: &str) -> Result<()> {
    let key: HookKey = key.parse()?;
    let session = Session::load(ctx)?;
    let hook = find_hook(&key, &session.decls.host, &session.decls.modules)
        .ok_or_else(|| reconcile::Error::HookNotConfigured(key.clone()))?;

    let interpreter = session.interpreter();
    let mut ledger = session.open_ledger()?;
    HookRunner::new(&interpreter, &mut ledger, false)
        .with_progress(&mut UiProgress)
        .force_run(&hook)?;
    Ok(())
}

fn reset(ctx: &Context, selector: &str) -> Result<()> {
    // `owner:phase` must be a real hook key; a bare owner matches by prefix
    if selector.contains(':') {
        selector.parse::<HookKey>()?;
    }

    let session = Session::load(ctx)?;
    let mut ledger = session.open_ledger()?;
    let removed = ledger.reset(selector)?;

    if removed.is_empty() {
        ui::info(&format!("No recorded runs for {selector}"));
    } else {
        for key in &removed {
            ui::success(&format!("Reset {key}"));
        }
    }
    Ok(())
}
