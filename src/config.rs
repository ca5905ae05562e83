// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the settings file that sdf uses to simplify the
//! process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! Every field is optional. An empty settings file, or no settings file at
//! all, yields the same behaviour as the classic hard-coded layout: a bare
//! repository at `$HOME/.config/sdf` whose work tree alias is `$HOME`, and a
//! tracer that runs `strace -f -e trace=openat`.

use crate::trace::{DEFAULT_FILTER, DEFAULT_TRACER};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

/// Settings file layout.
///
/// # General Layout
///
/// The settings file is composed of two tables: `store` and `trace`. The store
/// table locates the bare repository and its work tree alias. The trace table
/// selects the tracing facility used by `sdf trace`.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Location of configuration store.
    pub store: StoreSettings,

    /// File access tracer settings.
    pub trace: TraceSettings,
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        settings.store.git_dir = settings.store.git_dir.map(expand).transpose()?;
        settings.store.work_tree = settings.store.work_tree.map(expand).transpose()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration store location.
///
/// Unset fields fall back to [`default_store_dir`] and [`home_dir`].
///
/// [`default_store_dir`]: crate::path::default_store_dir
/// [`home_dir`]: crate::path::home_dir
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to bare repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_dir: Option<PathBuf>,

    /// Path to work tree alias, which is also the home directory that traced
    /// paths are made relative to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_tree: Option<PathBuf>,
}

/// Tracer settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Tracing facility to look up on `$PATH`.
    pub tracer: String,

    /// Call filter arguments handed to the tracing facility.
    pub filter: Vec<String>,

    /// Optional deadline in seconds before the traced program is killed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl TraceSettings {
    /// Deadline as a [`Duration`], if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            tracer: DEFAULT_TRACER.into(),
            filter: DEFAULT_FILTER.iter().map(ToString::to_string).collect(),
            timeout: None,
        }
    }
}

fn expand(path: PathBuf) -> Result<PathBuf> {
    shellexpand::full(path.to_string_lossy().as_ref())
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(ConfigError::ShellExpansion)
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
