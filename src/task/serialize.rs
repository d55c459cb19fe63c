// src/task/serialize.rs

//! Pkgbase serializer tasks.
//!
//! [`PrintOutputPackageBasesTask`] renders descriptors to stdout for
//! inspection; [`WriteOutputPackageBasesToTmpFilesTask`] stages them as
//! `.tmp` files in a management directory for the promotion protocol to
//! publish.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::packages::OutputPackageBase;
use crate::repository::repofile::relative_path;
use crate::task::build::CreateOutputPackageBasesTask;
use crate::task::promote::TMP_SUFFIX;
use crate::task::{ActionState, InputSource, Task};

/// Prints pkgbase descriptors as JSON to stdout
pub struct PrintOutputPackageBasesTask {
    state: ActionState,
    input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    pub pkgbases: Vec<OutputPackageBase>,
}

impl PrintOutputPackageBasesTask {
    pub fn new(
        input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    ) -> Result<Self> {
        if let InputSource::Direct(pkgbases) = &input {
            if pkgbases.is_empty() {
                return Err(Error::Config(
                    "Nothing to print: no pkgbases and no task to pull them from".to_string(),
                ));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            input,
            pkgbases: Vec::new(),
        })
    }
}

impl Task for PrintOutputPackageBasesTask {
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

        for pkgbase in &pkgbases {
            match pkgbase.to_json_vec() {
                Ok(json) => println!("{}", String::from_utf8_lossy(&json)),
                Err(e) => {
                    debug!("Serializing pkgbase {} failed: {e}", pkgbase.base);
                    self.state = ActionState::FailedTask;
                    return self.state;
                }
            }
        }

        self.pkgbases = pkgbases;
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.pkgbases.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}

/// Stages pkgbase descriptors as `.tmp` files in a management directory.
///
/// Writes one `<pkgbase>.json.tmp` per pkgbase plus a relative
/// `pkgnames/<package>.json.tmp` symlink per package, so every package name
/// resolves to its pkgbase descriptor once promoted. The symlinks point at
/// the published descriptor name and dangle until the move task runs.
pub struct WriteOutputPackageBasesToTmpFilesTask {
    state: ActionState,
    dir: PathBuf,
    input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    pub pkgbases: Vec<OutputPackageBase>,
    /// Staged descriptor files, recorded for the promotion protocol
    pub filenames: Vec<PathBuf>,
    /// Staged per-package symlinks, promoted alongside the descriptors
    pub symlink_filenames: Vec<PathBuf>,
}

impl WriteOutputPackageBasesToTmpFilesTask {
    pub fn new(
        dir: PathBuf,
        input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    ) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Management directory {} does not exist",
                dir.display()
            )));
        }
        if let InputSource::Direct(pkgbases) = &input {
            if pkgbases.is_empty() {
                return Err(Error::Config(
                    "Nothing to write: no pkgbases and no task to pull them from".to_string(),
                ));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            dir,
            input,
            pkgbases: Vec::new(),
            filenames: Vec::new(),
            symlink_filenames: Vec::new(),
        })
    }

    /// Every staged path, descriptors first
    pub fn tmp_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.filenames.clone();
        paths.extend(self.symlink_filenames.iter().cloned());
        paths
    }

    fn write(&mut self, pkgbases: &[OutputPackageBase]) -> Result<()> {
        let pkgnames_dir = self.dir.join("pkgnames");
        fs::create_dir_all(&pkgnames_dir)?;

        for pkgbase in pkgbases {
            let descriptor = pkgbase.descriptor_filename();
            let path = self.dir.join(format!("{descriptor}{TMP_SUFFIX}"));
            debug!("Staging pkgbase descriptor {}", path.display());
            fs::write(&path, pkgbase.to_json_vec()?)?;
            self.filenames.push(path);

            let target = relative_path(&self.dir.join(&descriptor), &pkgnames_dir);
            for name in pkgbase.package_names() {
                let link = pkgnames_dir.join(format!("{name}.json{TMP_SUFFIX}"));
                if fs::symlink_metadata(&link).is_ok() {
                    fs::remove_file(&link)?;
                }
                std::os::unix::fs::symlink(&target, &link)?;
                self.symlink_filenames.push(link);
            }
        }
        Ok(())
    }
}

impl Task for WriteOutputPackageBasesToTmpFilesTask {
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
            "Staging {} pkgbase descriptors in {}",
            pkgbases.len(),
            self.dir.display()
        );

        self.state = match self.write(&pkgbases) {
            Ok(()) => {
                self.pkgbases = pkgbases;
                ActionState::SuccessTask
            }
            Err(e) => {
                debug!("Staging pkgbase descriptors failed: {e}");
                ActionState::FailedTask
            }
        };
        self.state
    }

    fn undo(&mut self) -> ActionState {
        for path in self.filenames.iter().chain(&self.symlink_filenames) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!("Removing staged file {} failed: {e}", path.display());
                    self.state = ActionState::FailedUndoTask;
                    return self.state;
                }
            }
        }
        self.filenames.clear();
        self.symlink_filenames.clear();
        self.pkgbases.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}
