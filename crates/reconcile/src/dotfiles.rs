//! Dotfile links
//!
//! Modules ship a `dotfiles/` payload directory. Each payload entry is linked
//! into the home directory: under `~/.config/<entry>` for `dotfiles: true`,
//! or at an explicit target for the mapping form. A target may only be
//! claimed once across all active modules; any double claim blocks the whole
//! dotfile step.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::types::{DotfilesDecl, Module};

/// A desired symlink: `target` should point at `source`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotfileLink {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Module that declared the link
    pub module: String,
}

/// Links resolved for one module, plus anything worth telling the operator
#[derive(Debug, Default)]
pub struct ModuleDotfiles {
    pub links: Vec<DotfileLink>,
    pub warnings: Vec<String>,
}

/// Resolve a module's dotfile declaration against its payload directory.
pub fn resolve_module_dotfiles(module: &Module, home: &Path) -> Result<ModuleDotfiles> {
    let payload = module.dotfiles_dir();
    let mut out = ModuleDotfiles::default();

    match &module.decl.dotfiles {
        DotfilesDecl::Off => {
            if payload.is_dir() {
                out.warnings.push(format!(
                    "{}: has a dotfiles/ directory but dotfiles are not enabled",
                    module.name
                ));
            }
        }
        DotfilesDecl::Invalid => {
            out.warnings.push(format!(
                "{}: dotfiles must be true, false or a mapping of entry to target",
                module.name
            ));
        }
        DotfilesDecl::All => {
            if !payload.is_dir() {
                out.warnings.push(format!(
                    "{}: dotfiles enabled but {} does not exist",
                    module.name,
                    payload.display()
                ));
                return Ok(out);
            }

            let config_home = home.join(".config");
            for name in payload_entries(&payload)? {
                out.links.push(DotfileLink {
                    source: payload.join(&name),
                    target: config_home.join(&name),
                    module: module.name.clone(),
                });
            }
        }
        DotfilesDecl::Explicit(map) => {
            if !payload.is_dir() {
                out.warnings.push(format!(
                    "{}: dotfiles mapped but {} does not exist",
                    module.name,
                    payload.display()
                ));
                return Ok(out);
            }

            for (key, raw_target) in map {
                let expect_dir = key.ends_with('/');
                let name = key.trim_end_matches('/');
                let source = payload.join(name);

                if fs::symlink_metadata(&source).is_err() {
                    out.warnings.push(format!(
                        "{}: dotfile '{name}' not found in {}",
                        module.name,
                        payload.display()
                    ));
                    continue;
                }
                if expect_dir && !source.is_dir() {
                    out.warnings.push(format!(
                        "{}: dotfile '{key}' is declared as a directory but is not one",
                        module.name
                    ));
                    continue;
                }

                out.links.push(DotfileLink {
                    source,
                    target: expand_target(raw_target, home),
                    module: module.name.clone(),
                });
            }
        }
    }

    Ok(out)
}

/// Entry names directly under `dir`, sorted
fn payload_entries(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::fs("read directory", dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::fs("read directory", dir, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Expand `~` against `home`; relative targets are taken relative to `home`.
/// The result is normalised so that spellings of one path compare equal.
pub fn expand_target(raw: &str, home: &Path) -> PathBuf {
    let expanded = shellexpand::tilde_with_context(raw, || home.to_str());
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        normalize_lexically(&path)
    } else {
        normalize_lexically(&home.join(path))
    }
}

/// Drop `.` components and fold `..` into its parent without touching the
/// filesystem. `..` at the root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// Conflicts
// ============================================================================

/// A target claimed by more than one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub target: PathBuf,
    /// Claiming modules, in claim order
    pub modules: Vec<String>,
    /// Every source that claims the target
    pub sources: Vec<PathBuf>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} claimed by {}",
            self.target.display(),
            self.modules.join(", ")
        )
    }
}

/// Every target with more than one claim, in order of first claim
pub fn check_conflicts(links: &[DotfileLink]) -> Vec<Conflict> {
    let mut order: Vec<&Path> = Vec::new();
    let mut claims: BTreeMap<&Path, Vec<&DotfileLink>> = BTreeMap::new();

    for link in links {
        let entry = claims.entry(link.target.as_path()).or_default();
        if entry.is_empty() {
            order.push(&link.target);
        }
        entry.push(link);
    }

    order
        .into_iter()
        .filter_map(|target| {
            let claimants = claims.get(target)?;
            if claimants.len() < 2 {
                return None;
            }
            let mut modules: Vec<String> = Vec::new();
            for link in claimants {
                if !modules.contains(&link.module) {
                    modules.push(link.module.clone());
                }
            }
            Some(Conflict {
                target: target.to_path_buf(),
                modules,
                sources: claimants.iter().map(|l| l.source.clone()).collect(),
            })
        })
        .collect()
}

// ============================================================================
// Convergence
// ============================================================================

/// Live state of a link target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Symlink resolving to the source
    Linked,
    /// Nothing at the target
    Missing,
    /// Symlink pointing somewhere else (or dangling)
    Wrong { actual: PathBuf },
    /// A real file or directory occupies the target
    Blocked,
}

pub fn link_state(link: &DotfileLink) -> LinkState {
    let target = &link.target;
    if !target.is_symlink() {
        return if target.exists() {
            LinkState::Blocked
        } else {
            LinkState::Missing
        };
    }

    let Ok(raw) = fs::read_link(target) else {
        return LinkState::Wrong {
            actual: PathBuf::new(),
        };
    };

    let expected = link
        .source
        .canonicalize()
        .unwrap_or_else(|_| link.source.clone());
    let joined = if raw.is_absolute() {
        raw.clone()
    } else {
        target.parent().map_or_else(|| raw.clone(), |p| p.join(&raw))
    };
    let actual = joined.canonicalize().unwrap_or(joined);

    if actual == expected {
        LinkState::Linked
    } else {
        LinkState::Wrong { actual }
    }
}

/// What convergence did (or would do) to one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Target was absent
    Create,
    /// Target was a symlink to `previous`; removed and relinked
    Replace { previous: PathBuf },
    /// Target was a real file or directory; moved to `backup`
    Backup { backup: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkChange {
    pub link: DotfileLink,
    pub action: LinkAction,
}

/// Outcome of a convergence pass
#[derive(Debug, Default)]
pub struct SyncReport {
    pub changes: Vec<LinkChange>,
    /// Links already correct
    pub unchanged: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Converge every link. Conflicts abort before anything is touched. Each
/// change is announced to `progress` before it is written; in dry run the
/// same changes are announced and reported but nothing is written.
pub fn sync(
    links: &[DotfileLink],
    dry_run: bool,
    progress: &mut dyn ProgressCallback,
) -> Result<SyncReport> {
    let conflicts = check_conflicts(links);
    if !conflicts.is_empty() {
        for conflict in &conflicts {
            progress.on_conflict(conflict);
        }
        return Err(Error::DotfileConflicts(conflicts));
    }

    let mut report = SyncReport::default();
    for link in links {
        let action = match link_state(link) {
            LinkState::Linked => {
                report.unchanged += 1;
                continue;
            }
            LinkState::Missing => LinkAction::Create,
            LinkState::Wrong { actual } => LinkAction::Replace { previous: actual },
            LinkState::Blocked => LinkAction::Backup {
                backup: backup_path(&link.target),
            },
        };

        let change = LinkChange {
            link: link.clone(),
            action,
        };
        progress.on_link_start(&change, dry_run);
        if !dry_run {
            apply(&change.link, &change.action)?;
        }
        report.changes.push(change);
    }

    Ok(report)
}

fn apply(link: &DotfileLink, action: &LinkAction) -> Result<()> {
    match action {
        LinkAction::Create => {}
        LinkAction::Replace { .. } => {
            fs::remove_file(&link.target)
                .map_err(|e| Error::fs("remove symlink", &link.target, e))?;
        }
        LinkAction::Backup { backup } => {
            log::info!(
                "Backing up {} to {}",
                link.target.display(),
                backup.display()
            );
            fs::rename(&link.target, backup)
                .map_err(|e| Error::fs("back up", &link.target, e))?;
        }
    }
    create_symlink(&link.source, &link.target)
}

/// Sibling backup path that does not exist yet: `<name>.bak`, then `.bak.1`, ...
fn backup_path(target: &Path) -> PathBuf {
    let base = {
        let mut name = target.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    };
    if fs::symlink_metadata(&base).is_err() {
        return base;
    }

    let mut n = 1;
    loop {
        let mut name = base.as_os_str().to_owned();
        name.push(format!(".{n}"));
        let candidate = PathBuf::from(name);
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}

fn create_symlink(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::fs("create directory", parent, e))?;
    }
    std::os::unix::fs::symlink(source, target)
        .map_err(|e| Error::fs("create symlink", target, e))?;
    log::debug!("Linked {} -> {}", target.display(), source.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::context::mock::RecordingProgress;
    use crate::types::ModuleDecl;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        home: PathBuf,
        modules: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let home = tmp.path().join("home");
            let modules = tmp.path().join("modules");
            fs::create_dir_all(&home).unwrap();
            fs::create_dir_all(&modules).unwrap();
            Self {
                _tmp: tmp,
                home,
                modules,
            }
        }

        /// Module with a payload of `dirs` (directories) and `files`
        fn module(&self, name: &str, dotfiles: DotfilesDecl, dirs: &[&str], files: &[&str]) -> Module {
            let dir = self.modules.join(name);
            let payload = dir.join("dotfiles");
            for d in dirs {
                fs::create_dir_all(payload.join(d)).unwrap();
            }
            for f in files {
                fs::create_dir_all(&payload).unwrap();
                fs::write(payload.join(f), format!("{name}:{f}")).unwrap();
            }
            let decl = ModuleDecl {
                dotfiles,
                ..ModuleDecl::default()
            };
            Module::new(name, dir, decl)
        }
    }

    fn explicit(pairs: &[(&str, &str)]) -> DotfilesDecl {
        DotfilesDecl::Explicit(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn all_maps_entries_into_config_home() {
        let fx = Fixture::new();
        let module = fx.module("editor", DotfilesDecl::All, &["nvim"], &[]);

        let resolved = resolve_module_dotfiles(&module, &fx.home).unwrap();

        assert_eq!(
            resolved.links,
            vec![DotfileLink {
                source: module.dir.join("dotfiles/nvim"),
                target: fx.home.join(".config/nvim"),
                module: "editor".into(),
            }]
        );
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn off_with_payload_warns() {
        let fx = Fixture::new();
        let module = fx.module("editor", DotfilesDecl::Off, &["nvim"], &[]);

        let resolved = resolve_module_dotfiles(&module, &fx.home).unwrap();
        assert!(resolved.links.is_empty());
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn explicit_targets_expand_and_validate() {
        let fx = Fixture::new();
        let module = fx.module(
            "shell",
            explicit(&[
                (".zshrc", "~/.zshrc"),
                ("starship.toml", ".config/starship.toml"),
                ("zsh/", "~/.zsh"),
                ("gone", "~/.gone"),
            ]),
            &[],
            &[".zshrc", "starship.toml", "zsh"],
        );

        let resolved = resolve_module_dotfiles(&module, &fx.home).unwrap();
        let targets: Vec<_> = resolved.links.iter().map(|l| l.target.clone()).collect();

        assert_eq!(
            targets,
            vec![
                fx.home.join(".zshrc"),
                fx.home.join(".config/starship.toml"),
            ]
        );
        // `zsh/` is a file, `gone` is absent
        assert_eq!(resolved.warnings.len(), 2);
    }

    #[test]
    fn mapping_without_payload_contributes_nothing() {
        let fx = Fixture::new();
        let module = fx.module("shell", explicit(&[(".zshrc", "~/.zshrc")]), &[], &[]);

        let resolved = resolve_module_dotfiles(&module, &fx.home).unwrap();
        assert!(resolved.links.is_empty());
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn cross_module_target_is_a_conflict() {
        let a = DotfileLink {
            source: "/m/a/dotfiles/git".into(),
            target: "/h/.config/git".into(),
            module: "a".into(),
        };
        let b = DotfileLink {
            source: "/m/b/dotfiles/git".into(),
            target: "/h/.config/git".into(),
            module: "b".into(),
        };
        let c = DotfileLink {
            source: "/m/b/dotfiles/fish".into(),
            target: "/h/.config/fish".into(),
            module: "b".into(),
        };

        let conflicts = check_conflicts(&[a, c, b]);

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].target, PathBuf::from("/h/.config/git"));
        assert_eq!(conflicts[0].modules, vec!["a", "b"]);
        assert_eq!(conflicts[0].to_string(), "/h/.config/git claimed by a, b");
    }

    #[test]
    fn conflicts_block_every_link() {
        let fx = Fixture::new();
        let a = fx.module("a", DotfilesDecl::All, &["git", "fish"], &[]);
        let b = fx.module("b", DotfilesDecl::All, &["git"], &[]);

        let mut links = resolve_module_dotfiles(&a, &fx.home).unwrap().links;
        links.extend(resolve_module_dotfiles(&b, &fx.home).unwrap().links);

        let mut progress = RecordingProgress::default();
        let err = sync(&links, false, &mut progress).unwrap_err();
        assert!(matches!(err, Error::DotfileConflicts(ref c) if c.len() == 1));
        assert_eq!(progress.events.len(), 1);
        assert!(progress.events[0].starts_with("conflict "));
        assert!(!fx.home.join(".config/fish").exists());
        assert!(!fx.home.join(".config").exists());
    }

    #[test]
    fn sync_creates_backs_up_and_is_idempotent() {
        let fx = Fixture::new();
        let module = fx.module("editor", DotfilesDecl::All, &["nvim", "helix"], &[]);
        let links = resolve_module_dotfiles(&module, &fx.home).unwrap().links;

        // A real directory already sits at one target
        fs::create_dir_all(fx.home.join(".config/nvim")).unwrap();
        fs::write(fx.home.join(".config/nvim/init.lua"), "old").unwrap();

        let first = sync(&links, false, &mut NoProgress).unwrap();
        assert_eq!(first.changes.len(), 2);
        assert!(first.changes.iter().any(|c| matches!(
            &c.action,
            LinkAction::Backup { backup } if backup == &fx.home.join(".config/nvim.bak")
        )));
        assert_eq!(
            fs::read_to_string(fx.home.join(".config/nvim.bak/init.lua")).unwrap(),
            "old"
        );
        for link in &links {
            assert_eq!(link_state(link), LinkState::Linked);
        }

        let second = sync(&links, false, &mut NoProgress).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn backup_never_overwrites() {
        let fx = Fixture::new();
        let module = fx.module("shell", explicit(&[(".zshrc", "~/.zshrc")]), &[], &[".zshrc"]);
        let links = resolve_module_dotfiles(&module, &fx.home).unwrap().links;
        fs::write(fx.home.join(".zshrc"), "mine").unwrap();
        fs::write(fx.home.join(".zshrc.bak"), "older").unwrap();

        sync(&links, false, &mut NoProgress).unwrap();

        assert_eq!(fs::read_to_string(fx.home.join(".zshrc.bak")).unwrap(), "older");
        assert_eq!(fs::read_to_string(fx.home.join(".zshrc.bak.1")).unwrap(), "mine");
        assert_eq!(fs::read_to_string(fx.home.join(".zshrc")).unwrap(), "shell:.zshrc");
    }

    #[test]
    fn wrong_symlink_is_replaced() {
        let fx = Fixture::new();
        let module = fx.module("shell", explicit(&[(".zshrc", "~/.zshrc")]), &[], &[".zshrc"]);
        let links = resolve_module_dotfiles(&module, &fx.home).unwrap().links;
        std::os::unix::fs::symlink("/nonexistent/zshrc", fx.home.join(".zshrc")).unwrap();

        let report = sync(&links, false, &mut NoProgress).unwrap();

        assert!(matches!(report.changes[0].action, LinkAction::Replace { .. }));
        assert_eq!(link_state(&links[0]), LinkState::Linked);
        assert!(!fx.home.join(".zshrc.bak").exists());
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let fx = Fixture::new();
        let module = fx.module("editor", DotfilesDecl::All, &["nvim"], &[]);
        let links = resolve_module_dotfiles(&module, &fx.home).unwrap().links;

        let dry = sync(&links, true, &mut NoProgress).unwrap();
        assert_eq!(dry.changes.len(), 1);
        assert_eq!(link_state(&links[0]), LinkState::Missing);

        let real = sync(&links, false, &mut NoProgress).unwrap();
        assert_eq!(dry.changes, real.changes);
    }

    #[test]
    fn each_link_is_announced_before_it_is_written() {
        let fx = Fixture::new();
        let module = fx.module("shell", DotfilesDecl::All, &["fish", "git"], &[]);
        let links = resolve_module_dotfiles(&module, &fx.home).unwrap().links;
        // `.config/git` cannot be created: its parent is a regular file
        let mut blocked = links.clone();
        blocked[1].target = fx.home.join(".zshenv/git");
        fs::write(fx.home.join(".zshenv"), "export A=1").unwrap();

        let mut progress = RecordingProgress::default();
        let err = sync(&blocked, false, &mut progress).unwrap_err();

        assert!(matches!(err, Error::Fs { .. }));
        assert_eq!(
            progress.events,
            vec![
                format!("link {}", fx.home.join(".config/fish").display()),
                format!("link {}", fx.home.join(".zshenv/git").display()),
            ]
        );
        assert_eq!(link_state(&blocked[0]), LinkState::Linked);
    }

    #[test]
    fn equivalent_target_spellings_conflict() {
        let home = Path::new("/home/me");
        assert_eq!(
            expand_target("~/.config/../.config/./nvim", home),
            PathBuf::from("/home/me/.config/nvim")
        );
        assert_eq!(expand_target("/../etc/x", home), PathBuf::from("/etc/x"));

        let a = DotfileLink {
            source: "/m/a/dotfiles/nvim".into(),
            target: expand_target("~/.config/nvim", home),
            module: "a".into(),
        };
        let b = DotfileLink {
            source: "/m/b/dotfiles/nvim".into(),
            target: expand_target(".config/../.config/nvim/", home),
            module: "b".into(),
        };

        let conflicts = check_conflicts(&[a, b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].target, PathBuf::from("/home/me/.config/nvim"));
    }
}
