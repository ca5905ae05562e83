// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration store management.
//!
//! The __store__ is a bare-alias repository that keeps track of the user's
//! configuration files.
//!
//! # Bare-Alias Repositories
//!
//! Although bare repositories lack a working tree by definition, Git allows
//! users to force a working tree by designating a directory as an alias for a
//! working tree using the "--work-tree" argument. The store keeps its Git
//! directory at `$HOME/.config/sdf`, and uses the home directory itself as the
//! work tree alias. This lets us treat the entire home directory as a Git
//! repository without needing to initialize it as one.
//!
//! Untracked files are hidden from status output, since almost everything in
//! a home directory is untracked.
//!
//! # See Also
//!
//! 1. [ArchWiki - dotfiles](https://wiki.archlinux.org/title/Dotfiles#Tracking_dotfiles_directly_with_Git)

use auth_git2::GitAuthenticator;
use git2::{build::RepoBuilder, Config, FetchOptions, Index, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::{OsStr, OsString},
    fs::{remove_dir_all, write},
    path::{Path, PathBuf},
    process::Command,
    time,
};
use tracing::{debug, info, instrument, warn};

/// Name of remote that [`Store::init_new`] registers.
pub const REMOTE_NAME: &str = "origin";

/// Bare-alias repository holding tracked configuration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    git_dir: PathBuf,
    work_tree: PathBuf,
}

impl Store {
    /// Construct new store handle.
    ///
    /// Does not touch the file system.
    pub fn new(git_dir: impl Into<PathBuf>, work_tree: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            work_tree: work_tree.into(),
        }
    }

    /// Path to bare repository.
    pub fn git_dir(&self) -> &Path {
        self.git_dir.as_path()
    }

    /// Path to work tree alias.
    pub fn work_tree(&self) -> &Path {
        self.work_tree.as_path()
    }

    /// Check if store has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.git_dir.exists()
    }

    /// Initialize new empty store.
    ///
    /// Creates a bare repository and registers `url` as [`REMOTE_NAME`].
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::AlreadyInitialized`] if store exists, and
    ///   `force` is not set.
    /// - Return [`StoreError::Git2`] if libgit2 operations fail.
    #[instrument(skip(self, url), level = "debug")]
    pub fn init_new(&self, url: impl AsRef<str>, force: bool) -> Result<Repository> {
        self.prepare(force)?;

        info!("initialize new store: {:?}", self.git_dir.display());
        let repository = Repository::init_bare(&self.git_dir)?;
        repository.remote(REMOTE_NAME, url.as_ref())?;
        configure(&repository)?;

        Ok(repository)
    }

    /// Initialize store from existing remote configuration.
    ///
    /// Clones remote as a bare repository, and stages the tree of HEAD so that
    /// the index matches the cloned history. Tracked files are not deployed
    /// to the work tree alias; the caller decides when to check them out,
    /// e.g., through `checkout .`. The only exception is `.gitmodules`, which
    /// is written to the work tree alias right away so that submodules
    /// resolve. The progress of the clone is displayed through a progress
    /// bar.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::AlreadyInitialized`] if store exists, and
    ///   `force` is not set.
    /// - Return [`StoreError::Git2`] if libgit2 operations fail.
    /// - Return [`StoreError::IndicatifStyleTemplate`] if progress bar style
    ///   is invalid.
    /// - Return [`StoreError::WriteGitmodules`] if `.gitmodules` cannot be
    ///   written to the work tree alias.
    #[instrument(skip(self, url, bar), level = "debug")]
    pub fn init_from_remote(
        &self,
        url: impl AsRef<str>,
        force: bool,
        bar: ProgressBar,
    ) -> Result<Repository> {
        self.prepare(force)?;

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.as_ref().to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let authenticator = GitAuthenticator::default();
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                bar.set_length(stats.total_objects() as u64);
                bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let repository = RepoBuilder::new()
            .bare(true)
            .fetch_options(fo)
            .clone(url.as_ref(), &self.git_dir)?;
        bar.finish_and_clear();

        configure(&repository)?;
        self.stage_head(&repository)?;
        info!("cloned {} into {:?}", url.as_ref(), self.git_dir.display());

        Ok(repository)
    }

    /// Show status of tracked files.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Syscall`] if Git fails.
    pub fn status(&self) -> Result<()> {
        self.gitcall_interactive(["status"])
    }

    /// Start tracking files.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NoPaths`] if no paths are given.
    /// - Return [`StoreError::Syscall`] if Git fails.
    pub fn add(&self, paths: impl IntoIterator<Item = impl Into<OsString>>) -> Result<()> {
        self.gitcall_with_paths("add", paths)
    }

    /// Stop tracking files.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NoPaths`] if no paths are given.
    /// - Return [`StoreError::Syscall`] if Git fails.
    pub fn remove(&self, paths: impl IntoIterator<Item = impl Into<OsString>>) -> Result<()> {
        self.gitcall_with_paths("rm", paths)
    }

    /// Interact with store directly through Git via current process.
    ///
    /// Standard input, output, and error stay attached to the terminal.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Syscall`] if Git cannot be run or fails.
    pub fn gitcall_interactive(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Result<()> {
        syscall_interactive("git", self.expand_bin_args(args))
    }

    /// Interact with store directly through Git via external process.
    ///
    /// Standard output is captured and returned with trailing newlines
    /// chomped. Standard error is only reported when Git fails.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Syscall`] if Git cannot be run or fails.
    pub fn gitcall_non_interactive(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Result<String> {
        syscall_non_interactive("git", self.expand_bin_args(args))
    }

    fn gitcall_with_paths(
        &self,
        subcommand: &str,
        paths: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Result<()> {
        let mut args = vec![OsString::from(subcommand)];
        args.extend(paths.into_iter().map(Into::into));
        if args.len() == 1 {
            return Err(StoreError::NoPaths);
        }

        self.gitcall_interactive(args)
    }

    fn expand_bin_args(&self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Vec<OsString> {
        let mut bin_args: Vec<OsString> = vec![
            "--git-dir".into(),
            self.git_dir.clone().into_os_string(),
            "--work-tree".into(),
            self.work_tree.clone().into_os_string(),
        ];
        bin_args.extend(args.into_iter().map(Into::into));

        bin_args
    }

    fn stage_head(&self, repository: &Repository) -> Result<()> {
        // INVARIANT: Empty remotes have no HEAD to stage.
        let Ok(head) = repository.head() else {
            warn!("cloned store {:?} is empty", self.git_dir.display());
            return Ok(());
        };
        let tree = head.peel_to_tree()?;

        // INVARIANT: Bare clones leave no index behind, Git expects one at
        //   `$GIT_DIR/index` once a work tree alias is given.
        let mut index = Index::open(&repository.path().join("index"))?;
        index.read_tree(&tree)?;
        index.write()?;
        debug!("staged {} entries from HEAD", index.len());

        if let Some(entry) = tree.get_name(".gitmodules") {
            let blob = entry.to_object(repository)?.peel_to_blob()?;
            let gitmodules = self.work_tree.join(".gitmodules");
            info!("restore submodule listing at {:?}", gitmodules.display());
            write(&gitmodules, blob.content()).map_err(|source| {
                StoreError::WriteGitmodules {
                    source,
                    path: gitmodules.clone(),
                }
            })?;
        }

        Ok(())
    }

    fn prepare(&self, force: bool) -> Result<()> {
        if self.is_initialized() {
            if !force {
                return Err(StoreError::AlreadyInitialized {
                    git_dir: self.git_dir.clone(),
                });
            }

            warn!("remove previous store at {:?}", self.git_dir.display());
            remove_dir_all(&self.git_dir).map_err(|source| StoreError::RemoveStore {
                source,
                git_dir: self.git_dir.clone(),
            })?;
        }

        // INVARIANT: Parent of store must exist before libgit2 touches it.
        if let Some(parent) = self.git_dir.parent() {
            mkdirp::mkdirp(parent).map_err(|source| StoreError::CreateParent {
                source,
                parent: parent.to_path_buf(),
            })?;
        }

        Ok(())
    }
}

fn configure(repository: &Repository) -> Result<()> {
    debug!("hide untracked files of {:?}", repository.path().display());
    repository
        .config()?
        .set_str("status.showUntrackedFiles", "no")?;

    Ok(())
}

fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let status = Command::new(cmd.as_ref()).args(args).spawn()?.wait()?;
    if !status.success() {
        return Err(StoreError::Syscall(std::io::Error::other(format!(
            "command {:?} failed",
            cmd.as_ref()
        ))));
    }

    Ok(())
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StoreError::Syscall(std::io::Error::other(format!(
            "command {:?} failed:\n{}",
            cmd.as_ref(),
            stderr.trim_end()
        ))));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.trim_end_matches(['\r', '\n']).to_owned())
}

/// All possible error types for store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store already exists, and was not forcefully replaced.
    #[error("store already initialized at {:?}, use --force to replace it", git_dir.display())]
    AlreadyInitialized { git_dir: PathBuf },

    /// Previous store cannot be removed.
    #[error("failed to remove store at {:?}", git_dir.display())]
    RemoveStore {
        #[source]
        source: std::io::Error,
        git_dir: PathBuf,
    },

    /// Parent directory of store cannot be created.
    #[error("failed to create directory {:?}", parent.display())]
    CreateParent {
        #[source]
        source: std::io::Error,
        parent: PathBuf,
    },

    /// Submodule listing cannot be written to work tree alias.
    #[error("failed to write submodule listing to {:?}", path.display())]
    WriteGitmodules {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// No paths given to a command that needs at least one.
    #[error("at least 1 file path is required")]
    NoPaths,

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// External Git process fails.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expand_bin_args_prefixes_bare_alias_flags() {
        let store = Store::new("/home/alice/.config/sdf", "/home/alice");
        let result = store.expand_bin_args(["add", ".bashrc"]);
        let expect: Vec<OsString> = vec![
            "--git-dir".into(),
            "/home/alice/.config/sdf".into(),
            "--work-tree".into(),
            "/home/alice".into(),
            "add".into(),
            ".bashrc".into(),
        ];
        assert_eq!(result, expect);
    }

    #[test]
    fn add_requires_paths() {
        let store = Store::new("/nonexistent/sdf", "/nonexistent");
        let result = store.add(Vec::<OsString>::new());
        assert!(matches!(result, Err(StoreError::NoPaths)));

        let result = store.remove(Vec::<OsString>::new());
        assert!(matches!(result, Err(StoreError::NoPaths)));
    }
}
