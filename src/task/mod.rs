// src/task/mod.rs

//! Transactional task pipeline.
//!
//! A pipeline run is a graph of [`Task`] nodes executed in dependency order
//! by the caller. Every task tracks an [`ActionState`], does its work in
//! [`Task::run`] and reverses it in [`Task::undo`]. Tasks that consume the
//! output of an upstream task hold a [`TaskHandle`] to it and short-circuit
//! to [`ActionState::FailedDependency`] when the upstream did not succeed.

pub mod archive;
pub mod build;
pub mod consolidate;
pub mod group;
pub mod place;
pub mod promote;
pub mod requirements;
pub mod serialize;
pub mod syncdb;

use std::cell::RefCell;
use std::rc::Rc;

use strum_macros::Display;

pub use archive::{AddToArchiveTask, ArchiveInput};
pub use build::CreateOutputPackageBasesTask;
pub use consolidate::{
    ConsolidateOutputPackageBasesTask, RemoveManagementRepoSymlinksTask,
    RemovePackageRepoSymlinksTask, StabilityLayers,
};
pub use group::{AddToRepoTask, CleanupRepoTask, RepoGroupTask};
pub use place::FilesToRepoDirTask;
pub use promote::{
    BKP_SUFFIX, MoveInput, MoveTmpFilesTask, RemoveBackupFilesTask, RemoveBackupInput,
    SourceDestination, TMP_SUFFIX,
};
pub use requirements::ReproducibleBuildEnvironmentTask;
pub use serialize::{PrintOutputPackageBasesTask, WriteOutputPackageBasesToTmpFilesTask};
pub use syncdb::WriteSyncDbsToTmpFilesTask;

/// Execution state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ActionState {
    /// Initial state, also the terminal state after a clean undo
    #[default]
    NotStarted,
    /// Terminal success without real work (barriers, trivial tasks)
    Success,
    /// Terminal success after doing real work
    SuccessTask,
    /// Generic failure
    Failed,
    /// The task's own work failed
    FailedTask,
    /// An upstream dependency did not succeed; no work was attempted
    FailedDependency,
    /// Rollback itself failed; requires operator attention
    FailedUndoTask,
}

impl ActionState {
    /// Whether this state counts as success for downstream gating
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessTask)
    }
}

/// Shared handle to a task, letting downstream tasks read upstream output
pub type TaskHandle<T> = Rc<RefCell<T>>;

/// Wrap a task in a [`TaskHandle`]
pub fn handle<T>(task: T) -> TaskHandle<T> {
    Rc::new(RefCell::new(task))
}

/// A unit of work with do/undo semantics.
///
/// `run` is idempotent: calling it on a task already in a success state
/// returns that state without repeating the work. `undo` on a task that
/// never ran returns [`ActionState::NotStarted`] and touches nothing.
pub trait Task {
    fn state(&self) -> ActionState;
    fn run(&mut self) -> ActionState;
    fn undo(&mut self) -> ActionState;
}

/// Where a task's input values come from.
///
/// Either the caller supplies them directly at construction time, or the
/// task pulls them from an upstream task's output once that task succeeded.
#[derive(Debug)]
pub enum InputSource<S, T> {
    Direct(Vec<T>),
    FromTask(TaskHandle<S>),
}

impl<S: Task, T: Clone> InputSource<S, T> {
    /// Resolve the input values.
    ///
    /// Returns `None` when the upstream task is not in a success state; the
    /// caller reports [`ActionState::FailedDependency`] in that case.
    pub fn resolve(&self, select: impl FnOnce(&S) -> Vec<T>) -> Option<Vec<T>> {
        match self {
            Self::Direct(values) => Some(values.clone()),
            Self::FromTask(task) => {
                let task = task.borrow();
                if task.state().is_success() {
                    Some(select(&task))
                } else {
                    None
                }
            }
        }
    }

    /// Whether the input is pulled from an upstream task
    pub fn is_from_task(&self) -> bool {
        matches!(self, Self::FromTask(_))
    }
}
