// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use sdf::store::{Store, StoreError, REMOTE_NAME};

use anyhow::Result;
use git2::{Commit, IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use std::{fs::read_to_string, path::Path};
use tempfile::TempDir;

pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        opts.bare(true);
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        self.stage(filename.as_ref(), contents)?;
        self.commit(format!("chore: add {:?}", filename.as_ref()))
    }

    pub(crate) fn stage(&self, filename: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename
                .as_ref()
                .to_string_lossy()
                .into_owned()
                .into_bytes(),
        };

        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;

        Ok(())
    }

    pub(crate) fn commit(&self, message: impl AsRef<str>) -> Result<()> {
        let mut index = self.repo.index()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&Commit<'_>> = parent.iter().collect();

        let signature = self.repo.signature()?;
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message.as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }
}

fn store_in(dir: &TempDir) -> Store {
    Store::new(dir.path().join(".config").join("sdf"), dir.path())
}

fn untracked_setting(repo: &Repository) -> Result<String> {
    Ok(repo.config()?.get_string("status.showUntrackedFiles")?)
}

#[test]
fn init_new_creates_bare_store_with_remote() -> Result<()> {
    let home = tempfile::tempdir()?;
    let store = store_in(&home);
    assert!(!store.is_initialized());

    let repo = store.init_new("https://example.org/dotfiles.git", false)?;
    assert!(repo.is_bare());
    assert!(store.is_initialized());
    assert_eq!(
        repo.find_remote(REMOTE_NAME)?.url(),
        Some("https://example.org/dotfiles.git")
    );
    assert_eq!(untracked_setting(&repo)?, "no");

    Ok(())
}

#[test]
fn init_new_refuses_existing_store_without_force() -> Result<()> {
    let home = tempfile::tempdir()?;
    let store = store_in(&home);
    store.init_new("https://example.org/first.git", false)?;

    let result = store.init_new("https://example.org/second.git", false);
    assert!(matches!(result, Err(StoreError::AlreadyInitialized { .. })));

    let repo = store.init_new("https://example.org/second.git", true)?;
    assert_eq!(
        repo.find_remote(REMOTE_NAME)?.url(),
        Some("https://example.org/second.git")
    );

    Ok(())
}

#[test]
fn init_from_remote_clones_bare() -> Result<()> {
    let remote_dir = tempfile::tempdir()?;
    let remote = RepoFixture::new(remote_dir.path())?;
    remote.stage_and_commit(".bashrc", "export EDITOR=vim\n")?;

    let home = tempfile::tempdir()?;
    let store = store_in(&home);
    let url = remote_dir.path().to_string_lossy().into_owned();
    let repo = store.init_from_remote(&url, false, ProgressBar::hidden())?;

    assert!(repo.is_bare());
    assert_eq!(untracked_setting(&repo)?, "no");
    let tree = repo.head()?.peel_to_tree()?;
    assert!(tree.get_name(".bashrc").is_some());

    // INVARIANT: Tracked files are not deployed by cloning.
    assert!(!home.path().join(".bashrc").exists());

    Ok(())
}

#[test]
fn init_from_remote_stages_head_for_checkout() -> Result<()> {
    let remote_dir = tempfile::tempdir()?;
    let remote = RepoFixture::new(remote_dir.path())?;
    remote.stage_and_commit(".bashrc", "export EDITOR=vim\n")?;
    remote.stage_and_commit(".vimrc", "set number\n")?;

    let home = tempfile::tempdir()?;
    let store = store_in(&home);
    let url = remote_dir.path().to_string_lossy().into_owned();
    let repo = store.init_from_remote(&url, false, ProgressBar::hidden())?;
    assert_eq!(repo.index()?.len(), 2);

    // INVARIANT: Nothing is staged for deletion right after cloning.
    let status = store.gitcall_non_interactive(["status", "--porcelain"])?;
    assert_eq!(status, " D .bashrc\n D .vimrc");

    store.gitcall_non_interactive(["checkout", "."])?;
    assert_eq!(read_to_string(home.path().join(".bashrc"))?, "export EDITOR=vim\n");
    assert_eq!(read_to_string(home.path().join(".vimrc"))?, "set number\n");
    assert_eq!(store.gitcall_non_interactive(["status", "--porcelain"])?, "");

    Ok(())
}

#[test]
fn init_from_remote_restores_gitmodules() -> Result<()> {
    let gitmodules = "[submodule \".vim/pack/plugins\"]\n\tpath = .vim/pack/plugins\n";
    let remote_dir = tempfile::tempdir()?;
    let remote = RepoFixture::new(remote_dir.path())?;
    remote.stage(".bashrc", "export EDITOR=vim\n")?;
    remote.stage(".gitmodules", gitmodules)?;
    remote.commit("chore: add shell and submodules")?;

    let home = tempfile::tempdir()?;
    let store = store_in(&home);
    let url = remote_dir.path().to_string_lossy().into_owned();
    store.init_from_remote(&url, false, ProgressBar::hidden())?;

    assert_eq!(read_to_string(home.path().join(".gitmodules"))?, gitmodules);
    assert!(!home.path().join(".bashrc").exists());

    Ok(())
}

#[test]
fn gitcall_non_interactive_reports_git_failure() -> Result<()> {
    let home = tempfile::tempdir()?;
    let store = store_in(&home);
    store.init_new("https://example.org/dotfiles.git", false)?;

    let result = store.gitcall_non_interactive(["rev-parse", "--verify", "no-such-ref"]);
    assert!(matches!(result, Err(StoreError::Syscall(..))));

    let url = store.gitcall_non_interactive(["remote", "get-url", REMOTE_NAME])?;
    assert_eq!(url, "https://example.org/dotfiles.git");

    Ok(())
}
