// src/task/group.rs

//! Grouping and barrier tasks.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::packages::OutputPackageBase;
use crate::repository::{PackageRepo, RepoDir, RepoTier};
use crate::task::build::CreateOutputPackageBasesTask;
use crate::task::{ActionState, InputSource, Task};

/// Maps pkgbases onto target repositories.
///
/// Produces the union of pkgbase names and package names of the run plus the
/// management directory of every target repository, for later stages to
/// consume.
pub struct RepoGroupTask {
    state: ActionState,
    repos: Vec<(PackageRepo, RepoTier)>,
    input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    pub pkgbase_names: Vec<String>,
    pub package_names: Vec<String>,
    pub management_dirs: Vec<PathBuf>,
}

impl RepoGroupTask {
    pub fn new(
        repos: Vec<(PackageRepo, RepoTier)>,
        input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    ) -> Result<Self> {
        if repos.is_empty() {
            return Err(Error::Config("No target repositories to group for".to_string()));
        }
        if let InputSource::Direct(pkgbases) = &input {
            if pkgbases.is_empty() {
                return Err(Error::Config(
                    "Nothing to group: no pkgbases and no task to pull them from".to_string(),
                ));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            repos,
            input,
            pkgbase_names: Vec::new(),
            package_names: Vec::new(),
            management_dirs: Vec::new(),
        })
    }

    fn group(&mut self, pkgbases: &[OutputPackageBase]) -> Result<()> {
        for pkgbase in pkgbases {
            if !self.pkgbase_names.contains(&pkgbase.base) {
                self.pkgbase_names.push(pkgbase.base.clone());
            }
            for name in pkgbase.package_names() {
                if !self.package_names.contains(&name) {
                    self.package_names.push(name);
                }
            }
        }

        for (repo, tier) in &self.repos {
            let dir = repo.repo_path(RepoDir::Management, *tier)?;
            if !self.management_dirs.contains(&dir) {
                self.management_dirs.push(dir);
            }
        }
        Ok(())
    }
}

impl Task for RepoGroupTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }

        let Some(pkgbases) = self.input.resolve(|task| task.pkgbases.clone()) else {
            self.state = ActionState::FailedDependency;
            return self.state;
        };
        info!(
            "Grouping {} pkgbases onto {} repositories",
            pkgbases.len(),
            self.repos.len()
        );

        self.state = match self.group(&pkgbases) {
            Ok(()) => ActionState::SuccessTask,
            Err(e) => {
                debug!("Grouping failed: {e}");
                ActionState::FailedTask
            }
        };
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.pkgbase_names.clear();
        self.package_names.clear();
        self.management_dirs.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}

/// Synchronization point marking the start of a repository update.
///
/// Carries no state beyond its [`ActionState`]; other tooling attaches to it
/// in the dependency graph.
#[derive(Debug, Default)]
pub struct AddToRepoTask {
    state: ActionState,
}

impl AddToRepoTask {
    pub fn new() -> Self {
        Self {
            state: ActionState::NotStarted,
        }
    }
}

impl Task for AddToRepoTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.state = ActionState::NotStarted;
        self.state
    }
}

/// Synchronization point marking the cleanup phase of a repository update
#[derive(Debug, Default)]
pub struct CleanupRepoTask {
    state: ActionState,
}

impl CleanupRepoTask {
    pub fn new() -> Self {
        Self {
            state: ActionState::NotStarted,
        }
    }
}

impl Task for CleanupRepoTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.state = ActionState::NotStarted;
        self.state
    }
}
