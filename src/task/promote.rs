// src/task/promote.rs

//! Atomic file promotion.
//!
//! Staged `.tmp` files become live by a two-phase protocol: an existing
//! destination is first copied aside to a `.bkp` file, then the staged file
//! is renamed over the destination. Rename is atomic within one filesystem,
//! so the only window where the destination is read is the backup copy.
//! Backups are the recovery mechanism; [`RemoveBackupFilesTask`] discards
//! them only once the whole transaction is known good.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::task::serialize::WriteOutputPackageBasesToTmpFilesTask;
use crate::task::syncdb::WriteSyncDbsToTmpFilesTask;
use crate::task::{ActionState, Task, TaskHandle};

/// Staging suffix of not-yet-published files
pub const TMP_SUFFIX: &str = ".tmp";
/// Suffix of pre-overwrite backup files
pub const BKP_SUFFIX: &str = ".bkp";

/// One staged file and its live location.
///
/// Invariants hold by construction: `source` is absolute and ends in `.tmp`,
/// `destination` is absolute and ends in neither `.tmp` nor `.bkp`,
/// `destination_backup` is absolute and ends in `.bkp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDestination {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub destination_backup: PathBuf,
    /// Whether a backup copy of the destination was actually made
    pub backup_done: bool,
}

impl SourceDestination {
    pub fn new(source: PathBuf, destination: PathBuf, destination_backup: PathBuf) -> Result<Self> {
        for (path, name) in [
            (&source, "source"),
            (&destination, "destination"),
            (&destination_backup, "backup"),
        ] {
            if !path.is_absolute() {
                return Err(Error::InvalidPath(format!(
                    "The {name} path {} is not absolute",
                    path.display()
                )));
            }
        }
        if !source.to_string_lossy().ends_with(TMP_SUFFIX) {
            return Err(Error::InvalidPath(format!(
                "Source {} does not end in {TMP_SUFFIX}",
                source.display()
            )));
        }
        let destination_str = destination.to_string_lossy();
        if destination_str.ends_with(TMP_SUFFIX) || destination_str.ends_with(BKP_SUFFIX) {
            return Err(Error::InvalidPath(format!(
                "Destination {} must end in neither {TMP_SUFFIX} nor {BKP_SUFFIX}",
                destination.display()
            )));
        }
        if !destination_backup.to_string_lossy().ends_with(BKP_SUFFIX) {
            return Err(Error::InvalidPath(format!(
                "Backup {} does not end in {BKP_SUFFIX}",
                destination_backup.display()
            )));
        }

        Ok(Self {
            source,
            destination,
            destination_backup,
            backup_done: false,
        })
    }

    /// Derive a pair from a staged path: the destination drops the `.tmp`
    /// suffix, the backup adds `.bkp` to the destination
    pub fn from_tmp_file(source: &Path) -> Result<Self> {
        let source_str = source.to_string_lossy();
        let destination = source_str.strip_suffix(TMP_SUFFIX).ok_or_else(|| {
            Error::InvalidPath(format!(
                "Staged file {} does not end in {TMP_SUFFIX}",
                source.display()
            ))
        })?;
        Self::new(
            source.to_path_buf(),
            PathBuf::from(destination),
            PathBuf::from(format!("{destination}{BKP_SUFFIX}")),
        )
    }
}

/// Where the move task takes its pairs from
pub enum MoveInput {
    Direct(Vec<SourceDestination>),
    FromPkgbaseWrite(TaskHandle<WriteOutputPackageBasesToTmpFilesTask>),
    FromSyncDbWrite(TaskHandle<WriteSyncDbsToTmpFilesTask>),
}

/// Promotes staged files to their live locations.
///
/// Atomicity is per pair: a failure stops the task, but pairs already
/// promoted in the same invocation stay promoted, covered by their backups.
pub struct MoveTmpFilesTask {
    state: ActionState,
    input: MoveInput,
    /// Resolved pairs with their achieved `backup_done` flags
    pub paths: Vec<SourceDestination>,
}

impl MoveTmpFilesTask {
    pub fn new(input: MoveInput) -> Result<Self> {
        if let MoveInput::Direct(pairs) = &input {
            if pairs.is_empty() {
                return Err(Error::Config(
                    "Nothing to move: no pairs and no task to pull them from".to_string(),
                ));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            input,
            paths: Vec::new(),
        })
    }

    fn resolve_pairs(&self) -> std::result::Result<Vec<SourceDestination>, ActionState> {
        let staged = match &self.input {
            MoveInput::Direct(pairs) => return Ok(pairs.clone()),
            MoveInput::FromPkgbaseWrite(task) => {
                let task = task.borrow();
                if !task.state().is_success() {
                    return Err(ActionState::FailedDependency);
                }
                task.tmp_paths()
            }
            MoveInput::FromSyncDbWrite(task) => {
                let task = task.borrow();
                if !task.state().is_success() {
                    return Err(ActionState::FailedDependency);
                }
                task.tmp_paths()
            }
        };
        staged
            .iter()
            .map(|path| SourceDestination::from_tmp_file(path))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                debug!("Resolving staged paths failed: {e}");
                ActionState::FailedTask
            })
    }

    /// Promote one pair, recording `backup_done` as soon as the copy landed
    fn promote(pair: &mut SourceDestination) -> Result<()> {
        if pair.destination.exists() {
            debug!(
                "Backing up {} to {}",
                pair.destination.display(),
                pair.destination_backup.display()
            );
            fs::copy(&pair.destination, &pair.destination_backup)?;
            pair.backup_done = true;
        }

        debug!(
            "Promoting {} to {}",
            pair.source.display(),
            pair.destination.display()
        );
        fs::rename(&pair.source, &pair.destination)?;
        Ok(())
    }
}

impl Task for MoveTmpFilesTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }

        let mut pairs = match self.resolve_pairs() {
            Ok(pairs) => pairs,
            Err(state) => {
                self.state = state;
                return self.state;
            }
        };
        info!("Promoting {} staged files", pairs.len());

        for index in 0..pairs.len() {
            if let Err(e) = Self::promote(&mut pairs[index]) {
                debug!("Promoting {} failed: {e}", pairs[index].source.display());
                self.paths = pairs;
                self.state = ActionState::FailedTask;
                return self.state;
            }
        }

        self.paths = pairs;
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        if self.state == ActionState::NotStarted {
            return self.state;
        }

        for pair in &mut self.paths {
            if pair.backup_done {
                if !pair.destination_backup.is_file() {
                    // The recorded backup vanished; restoring would guess
                    debug!(
                        "Backup {} is missing, not touching {}",
                        pair.destination_backup.display(),
                        pair.destination.display()
                    );
                    self.state = ActionState::FailedUndoTask;
                    return self.state;
                }
                let restore = fs::copy(&pair.destination_backup, &pair.destination)
                    .and_then(|_| fs::remove_file(&pair.destination_backup));
                if let Err(e) = restore {
                    debug!("Restoring {} failed: {e}", pair.destination.display());
                    self.state = ActionState::FailedUndoTask;
                    return self.state;
                }
                pair.backup_done = false;
            } else if pair.destination.exists() && !pair.source.exists() {
                // Promoted over a previously absent destination, move it back
                if let Err(e) = fs::rename(&pair.destination, &pair.source) {
                    debug!("Unpromoting {} failed: {e}", pair.destination.display());
                    self.state = ActionState::FailedUndoTask;
                    return self.state;
                }
            }
        }

        self.paths.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}

/// Where the backup-removal task takes its paths from
pub enum RemoveBackupInput {
    Direct(Vec<PathBuf>),
    FromMove(TaskHandle<MoveTmpFilesTask>),
}

/// Discards `.bkp` files once the transaction is confirmed good.
///
/// When the move task did not succeed, its backups are deliberately kept
/// for manual recovery and the task still reports success. Undo is an
/// explicit no-op: a discarded backup is gone.
pub struct RemoveBackupFilesTask {
    state: ActionState,
    input: RemoveBackupInput,
    pub paths: Vec<PathBuf>,
}

impl RemoveBackupFilesTask {
    pub fn new(input: RemoveBackupInput) -> Result<Self> {
        if let RemoveBackupInput::Direct(paths) = &input {
            for path in paths {
                if !path.is_absolute() || !path.to_string_lossy().ends_with(BKP_SUFFIX) {
                    return Err(Error::InvalidPath(format!(
                        "{} is not an absolute {BKP_SUFFIX} path",
                        path.display()
                    )));
                }
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            input,
            paths: Vec::new(),
        })
    }
}

impl Task for RemoveBackupFilesTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }

        let paths = match &self.input {
            RemoveBackupInput::Direct(paths) => paths.clone(),
            RemoveBackupInput::FromMove(task) => {
                let task = task.borrow();
                if !task.state().is_success() {
                    info!("Move did not succeed, keeping backup files for recovery");
                    drop(task);
                    self.state = ActionState::Success;
                    return self.state;
                }
                task.paths
                    .iter()
                    .filter(|pair| pair.backup_done)
                    .map(|pair| pair.destination_backup.clone())
                    .collect()
            }
        };

        for path in &paths {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed backup {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!("Removing backup {} failed: {e}", path.display());
                    self.state = ActionState::FailedTask;
                    return self.state;
                }
            }
        }

        self.paths = paths;
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        // Discarded backups cannot be restored
        self.paths.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}
