//! Declaration types for hosts and modules
//!
//! Module and host files accept shorthand forms (a bare string for a service
//! or hook, `true` for "all dotfiles"). Every shorthand is normalized here,
//! during deserialization, so the rest of the engine only sees canonical
//! records.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::hooks::HookPhase;

/// Unit suffixes that are kept as-is when normalizing a service name
pub const UNIT_SUFFIXES: &[&str] = &[
    ".service", ".socket", ".timer", ".path", ".mount", ".target",
];

// ============================================================================
// Services
// ============================================================================

/// Which service manager instance a unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    /// System-wide unit (`systemctl`)
    System,
    /// Per-user unit (`systemctl --user`)
    User,
}

impl ServiceScope {
    /// Scope from the `user:` flag of a declaration
    pub fn from_user_flag(user: bool) -> Self {
        if user { Self::User } else { Self::System }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            other => Err(format!("unknown service scope '{other}'")),
        }
    }
}

/// Identity of a service: the same unit in system and user scope are
/// different services.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceKey {
    pub name: String,
    pub scope: ServiceScope,
}

impl ServiceKey {
    pub fn new(name: impl Into<String>, scope: ServiceScope) -> Self {
        Self {
            name: normalize_unit_name(&name.into()),
            scope,
        }
    }
}

/// Ledger form: `name|scope`
impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.scope)
    }
}

impl FromStr for ServiceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, scope) = s
            .rsplit_once('|')
            .ok_or_else(|| format!("service key '{s}' is missing a scope"))?;
        if name.is_empty() {
            return Err(format!("service key '{s}' has an empty name"));
        }
        Ok(Self::new(name, scope.parse()?))
    }
}

/// A declared service, normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Unit name, always carrying a unit-type suffix
    pub name: String,
    pub scope: ServiceScope,
    /// Desired state: enabled (and started) or disabled (and stopped)
    pub enabled: bool,
}

impl ServiceSpec {
    pub fn new(name: &str, scope: ServiceScope, enabled: bool) -> Self {
        Self {
            name: normalize_unit_name(name),
            scope,
            enabled,
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey {
            name: self.name.clone(),
            scope: self.scope,
        }
    }

    /// Normalize either declaration shorthand. Entries without a name are
    /// dropped.
    fn from_decl(decl: ServiceDecl) -> Option<Self> {
        match decl {
            ServiceDecl::Name(name) => {
                non_empty(&name).map(|n| Self::new(n, ServiceScope::System, true))
            }
            ServiceDecl::Full {
                name,
                user,
                enabled,
            } => name.as_deref().and_then(non_empty).map(|n| {
                Self::new(n, ServiceScope::from_user_flag(user), enabled.unwrap_or(true))
            }),
            ServiceDecl::Invalid(_) => None,
        }
    }
}

impl fmt::Display for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.scope.is_user() {
            f.write_str(" (user)")?;
        }
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Append `.service` unless the name already carries a known unit suffix.
pub fn normalize_unit_name(name: &str) -> String {
    if UNIT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        name.to_string()
    } else {
        format!("{name}.service")
    }
}

/// Raw service entry as written in a module file
#[derive(Deserialize)]
#[serde(untagged)]
enum ServiceDecl {
    Name(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        user: bool,
        #[serde(default)]
        enabled: Option<bool>,
    },
    Invalid(IgnoredAny),
}

fn deserialize_services<'de, D>(deserializer: D) -> Result<Vec<ServiceSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<ServiceDecl> = lenient(deserializer, "services")?;
    Ok(raw
        .into_iter()
        .filter_map(|decl| {
            let spec = ServiceSpec::from_decl(decl);
            if spec.is_none() {
                log::warn!("Ignoring malformed service entry");
            }
            spec
        })
        .collect())
}

fn deserialize_packages<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    names(deserializer, "packages")
}

fn deserialize_modules<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    names(deserializer, "modules")
}

/// A list of names. Blank and non-string entries are dropped.
fn names<'de, D>(deserializer: D, field: &str) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Lenient<String>> = lenient(deserializer, field)?;
    Ok(raw
        .into_iter()
        .filter_map(|entry| match entry {
            Lenient::Valid(name) => non_empty(&name).map(str::to_string),
            Lenient::Invalid(_) => {
                log::warn!("Ignoring non-string entry in `{field}`");
                None
            }
        })
        .collect())
}

// ============================================================================
// Lenient fields
// ============================================================================

/// A field value, or whatever was written in its place
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Valid(T),
    Invalid(IgnoredAny),
}

/// Deserialize an optional field. A value of the wrong shape is reported and
/// replaced by the default, so one bad field never rejects the whole file.
fn lenient<'de, D, T>(deserializer: D, field: &str) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    match Option::<Lenient<T>>::deserialize(deserializer)? {
        Some(Lenient::Valid(value)) => Ok(value),
        Some(Lenient::Invalid(_)) => {
            log::warn!("Ignoring malformed `{field}` declaration");
            Ok(T::default())
        }
        None => Ok(T::default()),
    }
}

fn deserialize_hook<'de, D>(deserializer: D) -> Result<Option<HookDecl>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, "hook")
}

fn deserialize_module_hooks<'de, D>(deserializer: D) -> Result<ModuleHooks, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, "hooks")
}

fn deserialize_host_hooks<'de, D>(deserializer: D) -> Result<HostHooks, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, "hooks")
}

fn deserialize_aur_helper<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, "aur_helper")
}

fn deserialize_auto_prune<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, "auto_prune")
}

// ============================================================================
// Hooks
// ============================================================================

/// A hook script reference with its modifiers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawHookDecl")]
pub struct HookDecl {
    /// Script path, relative to the owner's directory unless absolute
    pub script: PathBuf,
    /// Run on every invocation and never record in the ledger
    pub always: bool,
    /// Run with privilege elevation
    pub root: bool,
}

impl HookDecl {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            always: false,
            root: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHookDecl {
    Path(String),
    Full {
        #[serde(alias = "run", alias = "path")]
        script: String,
        #[serde(default)]
        always: bool,
        #[serde(default)]
        root: bool,
    },
}

impl From<RawHookDecl> for HookDecl {
    fn from(raw: RawHookDecl) -> Self {
        match raw {
            RawHookDecl::Path(script) => Self::new(script),
            RawHookDecl::Full {
                script,
                always,
                root,
            } => Self {
                script: PathBuf::from(script),
                always,
                root,
            },
        }
    }
}

/// Hooks a module may declare
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModuleHooks {
    #[serde(default, deserialize_with = "deserialize_hook")]
    pub pre: Option<HookDecl>,
    #[serde(default, deserialize_with = "deserialize_hook")]
    pub post: Option<HookDecl>,
}

impl ModuleHooks {
    pub fn get(&self, phase: HookPhase) -> Option<&HookDecl> {
        match phase {
            HookPhase::Pre => self.pre.as_ref(),
            HookPhase::Post => self.post.as_ref(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_none() && self.post.is_none()
    }
}

/// Hooks a host may declare
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostHooks {
    #[serde(default, deserialize_with = "deserialize_hook")]
    pub pre_sync: Option<HookDecl>,
    #[serde(default, deserialize_with = "deserialize_hook")]
    pub post_sync: Option<HookDecl>,
    #[serde(default, deserialize_with = "deserialize_hook")]
    pub pre_update: Option<HookDecl>,
    #[serde(default, deserialize_with = "deserialize_hook")]
    pub post_update: Option<HookDecl>,
}

impl HostHooks {
    pub fn get(&self, phase: HookPhase) -> Option<&HookDecl> {
        match phase {
            HookPhase::PreSync => self.pre_sync.as_ref(),
            HookPhase::PostSync => self.post_sync.as_ref(),
            HookPhase::PreUpdate => self.pre_update.as_ref(),
            HookPhase::PostUpdate => self.post_update.as_ref(),
            _ => None,
        }
    }
}

// ============================================================================
// Dotfiles
// ============================================================================

/// The `dotfiles:` declaration of a module
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawDotfilesDecl")]
pub enum DotfilesDecl {
    /// Absent or `false`
    #[default]
    Off,
    /// `true`: link every entry of `dotfiles/` into `~/.config`
    All,
    /// Entry name (optionally `name/` for a directory) to target path
    Explicit(BTreeMap<String, String>),
    /// Anything else; contributes nothing and is reported
    Invalid,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDotfilesDecl {
    Unset,
    Flag(bool),
    Map(BTreeMap<String, String>),
    Other(IgnoredAny),
}

impl From<RawDotfilesDecl> for DotfilesDecl {
    fn from(raw: RawDotfilesDecl) -> Self {
        match raw {
            RawDotfilesDecl::Unset | RawDotfilesDecl::Flag(false) => Self::Off,
            RawDotfilesDecl::Flag(true) => Self::All,
            RawDotfilesDecl::Map(map) => Self::Explicit(map),
            RawDotfilesDecl::Other(_) => Self::Invalid,
        }
    }
}

// ============================================================================
// Modules and hosts
// ============================================================================

/// Contents of a module file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModuleDecl {
    #[serde(default, deserialize_with = "deserialize_packages")]
    pub packages: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_services")]
    pub services: Vec<ServiceSpec>,

    #[serde(default)]
    pub dotfiles: DotfilesDecl,

    #[serde(default, deserialize_with = "deserialize_module_hooks")]
    pub hooks: ModuleHooks,
}

/// A module: its declaration plus where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    /// Module directory; holds `dotfiles/` and hook scripts
    pub dir: PathBuf,
    pub decl: ModuleDecl,
}

impl Module {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, decl: ModuleDecl) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            decl,
        }
    }

    /// Directory holding this module's dotfile payload
    pub fn dotfiles_dir(&self) -> PathBuf {
        self.dir.join("dotfiles")
    }
}

/// The active host's declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// Host name; set by the loader, not read from the file
    #[serde(skip)]
    pub name: String,

    /// Directory host hook scripts are resolved against
    #[serde(skip)]
    pub root: PathBuf,

    /// Active modules in application order
    #[serde(default, deserialize_with = "deserialize_modules")]
    pub modules: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_aur_helper")]
    pub aur_helper: Option<String>,

    #[serde(default, deserialize_with = "deserialize_auto_prune")]
    pub auto_prune: Option<bool>,

    #[serde(default, deserialize_with = "deserialize_host_hooks")]
    pub hooks: HostHooks,
}

impl HostConfig {
    /// Attach identity and hook root after parsing
    pub fn located(mut self, name: impl Into<String>, root: impl AsRef<Path>) -> Self {
        self.name = name.into();
        self.root = root.as_ref().to_path_buf();
        self
    }
}
