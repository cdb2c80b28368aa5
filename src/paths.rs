//! Path resolution for hostform
//!
//! # Environment Variables
//!
//! - `HOSTFORM_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/hostform`)
//! - `HOSTFORM_STATE_DIR` - Override state directory
//!
//! # Layout
//!
//! ```text
//! <config>/config.yaml              host selection, interpreter
//! <config>/hosts/<host>.yaml        host declaration
//! <config>/modules/<name>/module.yaml
//! <state>/ledger.toml               hook runs and tracked services
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "HOSTFORM_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "HOSTFORM_STATE_DIR";

const APP: &str = "hostform";

/// Get the hostform config directory path
///
/// Priority:
/// 1. `HOSTFORM_CONFIG_DIR` env var
/// 2. `XDG_CONFIG_HOME/hostform`
/// 3. `~/.config/hostform`
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let path = home_dir()?.join(".config").join(APP);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the hostform state directory path
///
/// Priority:
/// 1. `HOSTFORM_STATE_DIR` env var
/// 2. `XDG_STATE_HOME/hostform`
/// 3. `~/.local/state/hostform`
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {ENV_STATE_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let path = home_dir()?.join(".local").join("state").join(APP);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("Could not determine home directory")
}

/// `<config>/config.yaml`
pub fn app_config_file(config_dir: &Path) -> PathBuf {
    config_dir.join("config.yaml")
}

/// `<config>/hosts/<host>.yaml`
pub fn host_file(config_dir: &Path, host: &str) -> PathBuf {
    config_dir.join("hosts").join(format!("{host}.yaml"))
}

/// `<config>/modules`
pub fn modules_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("modules")
}

/// `<state>/ledger.toml`
pub fn ledger_file() -> Result<PathBuf> {
    Ok(state_dir()?.join("ledger.toml"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring it afterwards.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test touches its own variables
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: see above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test touches its own variables
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: see above
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/hostform", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/hostform"));
        });
    }

    #[test]
    fn test_config_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_CONFIG_DIR, "~/dotfiles/hostform-tilde-test", || {
            assert_eq!(
                config_dir().unwrap(),
                home.join("dotfiles").join("hostform-tilde-test")
            );
        });
    }

    #[test]
    fn test_state_dir_env_override() {
        with_env_var(ENV_STATE_DIR, "/custom/state", || {
            assert_eq!(state_dir().unwrap(), PathBuf::from("/custom/state"));
            assert_eq!(
                ledger_file().unwrap(),
                PathBuf::from("/custom/state/ledger.toml")
            );
        });
    }

    #[test]
    fn test_xdg_state_home() {
        without_env_var(ENV_STATE_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-state-test", || {
                assert_eq!(
                    state_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-state-test/hostform")
                );
            });
        });
    }

    #[test]
    fn test_layout_paths() {
        let root = Path::new("/cfg");
        assert_eq!(app_config_file(root), PathBuf::from("/cfg/config.yaml"));
        assert_eq!(
            host_file(root, "laptop"),
            PathBuf::from("/cfg/hosts/laptop.yaml")
        );
        assert_eq!(modules_dir(root), PathBuf::from("/cfg/modules"));
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/test/path"), home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        assert_eq!(
            expand("/path/$HOSTFORM_NONEXISTENT_12345/file"),
            PathBuf::from("/path/$HOSTFORM_NONEXISTENT_12345/file")
        );
    }
}
