// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::{env, path::PathBuf};

/// Environment variable that overrides the location of the settings file.
pub const CONFIG_ENV: &str = "SDF_CONFIG";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the configuration store.
///
/// The store is a bare repository placed at `$HOME/.config/sdf`, whose work
/// tree alias is the home directory itself. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_store_dir() -> Result<PathBuf> {
    home_dir().map(|path| path.join(".config").join("sdf"))
}

/// Determine absolute path to the settings file.
///
/// Uses `$SDF_CONFIG` when set. Otherwise falls back to
/// `$XDG_CONFIG_HOME/sdf.toml`. The settings file cannot live inside the
/// store directory, because the store directory is the bare repository.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn settings_file() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|path| !path.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|path| path.join("sdf.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/alice")])]
    fn default_store_dir_lives_under_home_config() -> anyhow::Result<()> {
        assert_eq!(default_store_dir()?, PathBuf::from("/home/alice/.config/sdf"));
        Ok(())
    }

    #[sealed_test(env = [("SDF_CONFIG", "/tmp/elsewhere.toml")])]
    fn settings_file_honours_override() -> anyhow::Result<()> {
        assert_eq!(settings_file()?, PathBuf::from("/tmp/elsewhere.toml"));
        Ok(())
    }

    #[sealed_test(env = [("SDF_CONFIG", ""), ("HOME", "/home/alice"), ("XDG_CONFIG_HOME", "/home/alice/.xdg")])]
    fn settings_file_ignores_empty_override() -> anyhow::Result<()> {
        assert_eq!(settings_file()?, PathBuf::from("/home/alice/.xdg/sdf.toml"));
        Ok(())
    }
}
