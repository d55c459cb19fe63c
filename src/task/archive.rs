// src/task/archive.rs

//! Archival task.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::repository::PackageArchive;
use crate::task::place::FilesToRepoDirTask;
use crate::task::{ActionState, Task, TaskHandle};

/// Where the archival task takes its files from
pub enum ArchiveInput {
    Direct(Vec<PathBuf>),
    FromPlacement(TaskHandle<FilesToRepoDirTask>),
}

/// Copies published files into the long-term package archive
pub struct AddToArchiveTask {
    state: ActionState,
    archive: PackageArchive,
    input: ArchiveInput,
    /// Source files, cached when pulled from the placement task
    pub files: Vec<PathBuf>,
    /// Files created inside the archive tree
    pub archived: Vec<PathBuf>,
}

impl AddToArchiveTask {
    pub fn new(archive: PackageArchive, input: ArchiveInput) -> Result<Self> {
        if !archive.root().is_dir() {
            return Err(Error::Config(format!(
                "Archive directory {} does not exist",
                archive.root().display()
            )));
        }
        if let ArchiveInput::Direct(files) = &input {
            if files.is_empty() {
                return Err(Error::Config(
                    "Nothing to archive: no files and no task to pull them from".to_string(),
                ));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            archive,
            input,
            files: Vec::new(),
            archived: Vec::new(),
        })
    }
}

impl Task for AddToArchiveTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }

        let files = match &self.input {
            ArchiveInput::Direct(files) => files.clone(),
            ArchiveInput::FromPlacement(task) => {
                let task = task.borrow();
                if !task.state().is_success() {
                    self.state = ActionState::FailedDependency;
                    return self.state;
                }
                task.files()
            }
        };
        info!("Archiving {} files", files.len());

        for file in &files {
            match self.archive.add(file) {
                Ok(archived) => self.archived.push(archived),
                Err(e) => {
                    debug!("Archiving {} failed: {e}", file.display());
                    self.state = ActionState::FailedTask;
                    return self.state;
                }
            }
        }

        self.files = files;
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        for path in &self.archived {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!("Removing archived file {} failed: {e}", path.display());
                    self.state = ActionState::FailedUndoTask;
                    return self.state;
                }
            }
        }
        self.archived.clear();
        self.files.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}
