// src/task/place.rs

//! Package placement task.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::repository::{PackageRepo, RepoDir, RepoFile, RepoFileKind, RepoTier};
use crate::task::{ActionState, Task};

/// Copies package or signature files into a repository tier.
///
/// Each file lands in the shared pool and is exposed through a relative
/// symlink in the package repository directory.
pub struct FilesToRepoDirTask {
    state: ActionState,
    paths: Vec<PathBuf>,
    kind: RepoFileKind,
    repo: PackageRepo,
    tier: RepoTier,
    /// Successfully placed files, in placement order
    pub repo_files: Vec<RepoFile>,
}

impl FilesToRepoDirTask {
    pub fn new(
        paths: Vec<PathBuf>,
        kind: RepoFileKind,
        repo: PackageRepo,
        tier: RepoTier,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::Config("No files to place in the repository".to_string()));
        }
        for path in &paths {
            if !path.is_absolute() {
                return Err(Error::InvalidPath(format!(
                    "File path {} is not absolute",
                    path.display()
                )));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            paths,
            kind,
            repo,
            tier,
            repo_files: Vec::new(),
        })
    }

    /// Pool paths of the placed files, for archival
    pub fn files(&self) -> Vec<PathBuf> {
        self.repo_files
            .iter()
            .map(|repo_file| repo_file.file_path.clone())
            .collect()
    }

    fn place(&mut self) -> Result<()> {
        let pool_dir = self.repo.repo_path(RepoDir::Pool, self.tier)?;
        let package_dir = self.repo.repo_path(RepoDir::Package, self.tier)?;

        for path in self.paths.clone() {
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| {
                    Error::InvalidPath(format!("{} has no file name", path.display()))
                })?;

            let repo_file = RepoFile::new(
                self.kind,
                pool_dir.join(filename),
                package_dir.join(filename),
            )?;
            repo_file.copy_from(&path)?;
            repo_file.link()?;
            self.repo_files.push(repo_file);
        }
        Ok(())
    }
}

impl Task for FilesToRepoDirTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }
        info!(
            "Placing {} {} files in repository {}",
            self.paths.len(),
            self.kind,
            self.repo.name
        );

        self.state = match self.place() {
            Ok(()) => ActionState::SuccessTask,
            Err(e) => {
                debug!("Placing files failed: {e}");
                ActionState::FailedTask
            }
        };
        self.state
    }

    fn undo(&mut self) -> ActionState {
        for repo_file in &self.repo_files {
            if let Err(e) = repo_file.remove() {
                debug!(
                    "Removing {} failed: {e}",
                    repo_file.file_path.display()
                );
                self.state = ActionState::FailedUndoTask;
                return self.state;
            }
        }
        self.repo_files.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}
