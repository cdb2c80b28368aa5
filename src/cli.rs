use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "hostform")]
#[command(version)]
#[command(about = "Declarative host configuration from composable modules", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Host to operate on (overrides `host:` in config.yaml)
    #[arg(long, global = true, env = "HOSTFORM_HOST")]
    pub host: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show how the system differs from its declaration
    Status(StatusArgs),

    /// Bring the system in line with its declaration
    Sync(SyncArgs),

    /// Upgrade the system, with host update hooks around it
    Update(UpdateArgs),

    /// Inspect, run or rearm lifecycle hooks
    #[command(subcommand)]
    Hook(HookCommand),

    /// Capture undeclared packages or enabled services into the `system` module
    Merge(MergeArgs),

    /// Inspect, create, activate and deactivate modules
    #[command(subcommand)]
    Module(ModuleCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// `--prune` / `--no-prune`, absent when neither is given
#[derive(Args, Clone, Copy)]
pub struct PruneArgs {
    /// Remove undeclared and orphaned packages
    #[arg(long, overrides_with = "no_prune")]
    pub prune: bool,

    /// Only report undeclared and orphaned packages
    #[arg(long, overrides_with = "prune")]
    pub no_prune: bool,
}

impl PruneArgs {
    pub fn as_override(self) -> Option<bool> {
        match (self.prune, self.no_prune) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub prune: PruneArgs,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Dry run - show what would be done
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub prune: PruneArgs,

    /// Do not ask before removing packages
    #[arg(short, long)]
    pub yes: bool,

    /// Skip all hooks
    #[arg(long)]
    pub no_hooks: bool,

    /// Skip dotfile linking
    #[arg(long)]
    pub no_dotfiles: bool,

    /// Skip service reconciliation
    #[arg(long)]
    pub no_services: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Dry run - show what would be done
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip pre_update and post_update hooks
    #[arg(long)]
    pub no_hooks: bool,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Capture enabled services instead of explicit packages
    #[arg(short, long)]
    pub services: bool,

    /// Dry run - show what would be captured
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum HookCommand {
    /// List every configured hook and whether it has run
    List,

    /// Run a hook now, regardless of whether it has run before
    Run {
        /// Hook key, e.g. `neovim:post` or `host:pre_sync`
        key: String,
    },

    /// Forget that hooks ran so they run again on the next sync
    Reset {
        /// `owner:phase` for one hook, or `owner` for all of its hooks
        selector: String,
    },
}

#[derive(Subcommand)]
pub enum ModuleCommand {
    /// List modules, marking the ones the host uses
    List,

    /// Show a module's declaration
    Show {
        /// Module name
        name: String,
    },

    /// Create empty modules
    New {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Add modules to the host's module list
    On {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Remove modules from the host's module list
    Off {
        #[arg(required = true)]
        names: Vec<String>,
    },
}
