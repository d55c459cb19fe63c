// src/task/syncdb.rs

//! Sync database staging task.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::compression::CompressionType;
use crate::error::{Error, Result};
use crate::packages::OutputPackageBase;
use crate::repository::syncdb::{FilesVersion, PackageDescVersion, SyncDatabase};
use crate::task::promote::TMP_SUFFIX;
use crate::task::{ActionState, Task};

/// Compiles a repository's sync databases into staged `.tmp` files.
///
/// Reads every JSON descriptor in the management directory and writes
/// `<name>.db.tar.<ext>.tmp` and `<name>.files.tar.<ext>.tmp` into the
/// package repository directory, each with a staged extensionless symlink
/// (`<name>.db.tmp`) pointing at the published database name.
pub struct WriteSyncDbsToTmpFilesTask {
    state: ActionState,
    name: String,
    compression: CompressionType,
    /// Raw version values, validated against the known enum members at run
    desc_version: u8,
    files_version: u8,
    management_dir: PathBuf,
    package_repo_dir: PathBuf,
    /// Staged database and symlink files, recorded for the promotion protocol
    pub filenames: Vec<PathBuf>,
}

impl WriteSyncDbsToTmpFilesTask {
    pub fn new(
        name: &str,
        compression: CompressionType,
        desc_version: u8,
        files_version: u8,
        management_dir: PathBuf,
        package_repo_dir: PathBuf,
    ) -> Result<Self> {
        for dir in [&management_dir, &package_repo_dir] {
            if !dir.is_absolute() {
                return Err(Error::InvalidPath(format!(
                    "Directory {} is not absolute",
                    dir.display()
                )));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            name: name.to_string(),
            compression,
            desc_version,
            files_version,
            management_dir,
            package_repo_dir,
            filenames: Vec::new(),
        })
    }

    /// Every staged path, databases before symlinks
    pub fn tmp_paths(&self) -> Vec<PathBuf> {
        self.filenames.clone()
    }

    fn load_pkgbases(&self) -> Result<Vec<OutputPackageBase>> {
        if !self.management_dir.is_dir() {
            return Err(Error::Config(format!(
                "Management directory {} does not exist",
                self.management_dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.management_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .iter()
            .map(|path| OutputPackageBase::from_file(path))
            .collect()
    }

    fn write(&mut self) -> Result<()> {
        let desc_version = PackageDescVersion::try_from(self.desc_version)?;
        let files_version = FilesVersion::try_from(self.files_version)?;
        let pkgbases = self.load_pkgbases()?;

        let db = SyncDatabase::new(&self.name, self.compression, desc_version, files_version);

        for files in [false, true] {
            let published = db.syncdb_path(&self.package_repo_dir, files);
            let staged = PathBuf::from(format!("{}{TMP_SUFFIX}", published.display()));
            if staged.is_dir() {
                return Err(Error::InvalidPath(format!(
                    "{} is occupied by a directory",
                    staged.display()
                )));
            }

            db.write(&pkgbases, &staged, files)?;
            self.filenames.push(staged);

            // The symlink targets the published name and dangles until promotion
            let target = published
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| {
                    Error::InvalidPath(format!("{} has no file name", published.display()))
                })?;
            let link = PathBuf::from(format!(
                "{}{TMP_SUFFIX}",
                db.symlink_path(&self.package_repo_dir, files).display()
            ));
            if fs::symlink_metadata(&link).is_ok() {
                fs::remove_file(&link)?;
            }
            std::os::unix::fs::symlink(&target, &link)?;
            self.filenames.push(link);
        }
        Ok(())
    }
}

impl Task for WriteSyncDbsToTmpFilesTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }
        info!(
            "Staging sync databases for {} in {}",
            self.name,
            self.package_repo_dir.display()
        );

        self.state = match self.write() {
            Ok(()) => ActionState::SuccessTask,
            Err(e) => {
                debug!("Staging sync databases failed: {e}");
                ActionState::FailedTask
            }
        };
        self.state
    }

    fn undo(&mut self) -> ActionState {
        for path in &self.filenames {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!("Removing staged database {} failed: {e}", path.display());
                    self.state = ActionState::FailedUndoTask;
                    return self.state;
                }
            }
        }
        self.filenames.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::packages::{BuildInfo, OutputPackage};

    fn write_descriptor(dir: &Path) {
        let pkgbase = OutputPackageBase {
            base: "acl".to_string(),
            version: "2.3.2-1".to_string(),
            source_url: None,
            buildinfo: BuildInfo::default(),
            packages: vec![OutputPackage {
                name: "acl".to_string(),
                arch: "x86_64".to_string(),
                filename: "acl-2.3.2-1-x86_64.pkg.tar.zst".to_string(),
                desc: None,
                url: None,
                compressed_size: 1,
                installed_size: 2,
                depends: Vec::new(),
                licenses: Vec::new(),
                files: vec!["usr/bin/getfacl".to_string()],
            }],
            schema_version: 1,
        };
        fs::write(dir.join("acl.json"), pkgbase.to_json_vec().unwrap()).unwrap();
    }

    fn task_in(dir: &Path, desc_version: u8) -> WriteSyncDbsToTmpFilesTask {
        WriteSyncDbsToTmpFilesTask::new(
            "core",
            CompressionType::Zstd,
            desc_version,
            1,
            dir.join("mgmt"),
            dir.join("repo"),
        )
        .unwrap()
    }

    #[test]
    fn test_stages_databases_and_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mgmt")).unwrap();
        fs::create_dir_all(dir.path().join("repo")).unwrap();
        write_descriptor(&dir.path().join("mgmt"));

        let mut task = task_in(dir.path(), 2);
        assert_eq!(task.run(), ActionState::SuccessTask);

        let repo = dir.path().join("repo");
        assert!(repo.join("core.db.tar.zst.tmp").is_file());
        assert!(repo.join("core.files.tar.zst.tmp").is_file());
        assert_eq!(
            fs::read_link(repo.join("core.db.tmp")).unwrap(),
            PathBuf::from("core.db.tar.zst")
        );
        assert_eq!(
            fs::read_link(repo.join("core.files.tmp")).unwrap(),
            PathBuf::from("core.files.tar.zst")
        );
        assert_eq!(task.tmp_paths().len(), 4);

        assert_eq!(task.undo(), ActionState::NotStarted);
        assert!(!repo.join("core.db.tar.zst.tmp").exists());
        assert!(fs::symlink_metadata(repo.join("core.db.tmp")).is_err());
    }

    #[test]
    fn test_unknown_version_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mgmt")).unwrap();
        fs::create_dir_all(dir.path().join("repo")).unwrap();

        let mut task = task_in(dir.path(), 9);
        assert_eq!(task.run(), ActionState::FailedTask);
    }

    #[test]
    fn test_missing_management_dir_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("repo")).unwrap();

        let mut task = task_in(dir.path(), 1);
        assert_eq!(task.run(), ActionState::FailedTask);
    }

    #[test]
    fn test_directory_at_staged_path_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mgmt")).unwrap();
        fs::create_dir_all(dir.path().join("repo/core.db.tar.zst.tmp")).unwrap();
        write_descriptor(&dir.path().join("mgmt"));

        let mut task = task_in(dir.path(), 1);
        assert_eq!(task.run(), ActionState::FailedTask);
    }

    #[test]
    fn test_broken_descriptor_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mgmt")).unwrap();
        fs::create_dir_all(dir.path().join("repo")).unwrap();
        fs::write(dir.path().join("mgmt/acl.json"), b"{ not json").unwrap();

        let mut task = task_in(dir.path(), 1);
        assert_eq!(task.run(), ActionState::FailedTask);
    }
}
