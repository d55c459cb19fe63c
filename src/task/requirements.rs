// src/task/requirements.rs

//! Build-requirement resolution and the reproducibility check.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Result, TaskError};
use crate::packages::{Nvr, OutputPackageBase};
use crate::repository::PackageArchive;
use crate::task::build::CreateOutputPackageBasesTask;
use crate::task::{ActionState, InputSource, Task};

/// Collect the required NVRs satisfiable from the package archive.
///
/// A missing archive tree satisfies nothing and is not an error; an OS-level
/// failure while traversing an existing subdirectory is.
pub fn read_build_requirements_from_archive_dir(
    archive: &PackageArchive,
    requirements: &BTreeSet<String>,
    satisfied: &mut BTreeSet<String>,
) -> Result<()> {
    for requirement in requirements {
        let Ok(nvr) = Nvr::parse(requirement) else {
            return Err(TaskError::InvalidFileName(requirement.clone()).into());
        };

        // The archive shards by first letter, so only one directory matters
        let dir = archive
            .path_for(&format!("{nvr}.pkg.tar.zst"))
            .map_err(|_| TaskError::InvalidFileName(requirement.clone()))?
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(TaskError::ArchiveDir {
                    path: dir,
                    source: e,
                }
                .into());
            }
        };

        let prefix = format!("{nvr}.pkg.tar.");
        for entry in entries {
            let entry = entry.map_err(|e| TaskError::ArchiveDir {
                path: dir.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && !name.ends_with(".sig") {
                satisfied.insert(requirement.clone());
                break;
            }
        }
    }
    Ok(())
}

/// Collect the required NVRs provided by descriptors in management dirs.
///
/// Management directories are structurally reliable: a missing directory or
/// an unparseable descriptor aborts instead of being skipped.
pub fn read_build_requirements_from_management_dirs(
    dirs: &[PathBuf],
    requirements: &BTreeSet<String>,
    satisfied: &mut BTreeSet<String>,
) -> Result<()> {
    for dir in dirs {
        let entries = fs::read_dir(dir).map_err(|e| TaskError::ArchiveDir {
            path: dir.clone(),
            source: e,
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| TaskError::ArchiveDir {
                path: dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let pkgbase = OutputPackageBase::from_file(&path).map_err(|e| {
                TaskError::Descriptor {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            for nvr in pkgbase.provided_nvrs() {
                if requirements.contains(&nvr) {
                    satisfied.insert(nvr);
                }
            }
        }
    }
    Ok(())
}

/// Classifies every build-time dependency of the incoming pkgbases.
///
/// Each required NVR lands in exactly one set, with precedence repository,
/// then archive, then transaction (another pkgbase of the same run provides
/// it); what remains is unsatisfied.
pub struct ReproducibleBuildEnvironmentTask {
    state: ActionState,
    archive: PackageArchive,
    management_dirs: Vec<PathBuf>,
    input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    pub pkgbases: Vec<OutputPackageBase>,
    pub repo_deps: BTreeSet<String>,
    pub archive_deps: BTreeSet<String>,
    pub transaction_deps: BTreeSet<String>,
    pub unsatisfied: BTreeSet<String>,
}

impl ReproducibleBuildEnvironmentTask {
    pub fn new(
        archive: PackageArchive,
        management_dirs: Vec<PathBuf>,
        input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    ) -> Self {
        Self {
            state: ActionState::NotStarted,
            archive,
            management_dirs,
            input,
            pkgbases: Vec::new(),
            repo_deps: BTreeSet::new(),
            archive_deps: BTreeSet::new(),
            transaction_deps: BTreeSet::new(),
            unsatisfied: BTreeSet::new(),
        }
    }

    fn classify(&mut self, pkgbases: &[OutputPackageBase]) -> Result<()> {
        let mut remaining: BTreeSet<String> = pkgbases
            .iter()
            .flat_map(|pkgbase| pkgbase.buildinfo.installed.iter().cloned())
            .collect();

        read_build_requirements_from_management_dirs(
            &self.management_dirs,
            &remaining,
            &mut self.repo_deps,
        )?;
        remaining.retain(|nvr| !self.repo_deps.contains(nvr));

        read_build_requirements_from_archive_dir(
            &self.archive,
            &remaining,
            &mut self.archive_deps,
        )?;
        remaining.retain(|nvr| !self.archive_deps.contains(nvr));

        let provided: BTreeSet<String> = pkgbases
            .iter()
            .flat_map(|pkgbase| pkgbase.provided_nvrs())
            .collect();
        for nvr in &remaining {
            if provided.contains(nvr) {
                self.transaction_deps.insert(nvr.clone());
            }
        }
        remaining.retain(|nvr| !self.transaction_deps.contains(nvr));

        self.unsatisfied = remaining;
        Ok(())
    }
}

impl Task for ReproducibleBuildEnvironmentTask {
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
            "Checking build reproducibility of {} pkgbases",
            pkgbases.len()
        );

        self.state = match self.classify(&pkgbases) {
            Ok(()) => {
                self.pkgbases = pkgbases;
                ActionState::SuccessTask
            }
            Err(e) => {
                debug!("Reproducibility check failed: {e}");
                ActionState::FailedTask
            }
        };
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.pkgbases.clear();
        self.repo_deps.clear();
        self.archive_deps.clear();
        self.transaction_deps.clear();
        self.unsatisfied.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::packages::{BuildInfo, OutputPackage};

    fn pkgbase(base: &str, version: &str, installed: &[&str]) -> OutputPackageBase {
        OutputPackageBase {
            base: base.to_string(),
            version: version.to_string(),
            source_url: None,
            buildinfo: BuildInfo {
                installed: installed.iter().map(|s| s.to_string()).collect(),
            },
            packages: vec![OutputPackage {
                name: base.to_string(),
                arch: "x86_64".to_string(),
                filename: format!("{base}-{version}-x86_64.pkg.tar.zst"),
                desc: None,
                url: None,
                compressed_size: 1,
                installed_size: 2,
                depends: Vec::new(),
                licenses: Vec::new(),
                files: Vec::new(),
            }],
            schema_version: 1,
        }
    }

    fn requirements(nvrs: &[&str]) -> BTreeSet<String> {
        nvrs.iter().map(|s| s.to_string()).collect()
    }

    fn write_descriptor(dir: &Path, pkgbase: &OutputPackageBase) {
        fs::write(
            dir.join(pkgbase.descriptor_filename()),
            pkgbase.to_json_vec().unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_archive_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let archive = PackageArchive::new(dir.path().join("archive")).unwrap();
        let pkg = dir.path().join("glibc-2.39-1-x86_64.pkg.tar.zst");
        fs::write(&pkg, b"x").unwrap();
        archive.add(&pkg).unwrap();

        let mut satisfied = BTreeSet::new();
        read_build_requirements_from_archive_dir(
            &archive,
            &requirements(&["glibc-2.39-1-x86_64", "attr-2.5.2-1-x86_64"]),
            &mut satisfied,
        )
        .unwrap();

        assert_eq!(satisfied, requirements(&["glibc-2.39-1-x86_64"]));
    }

    #[test]
    fn test_missing_archive_satisfies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = PackageArchive::new(dir.path().join("missing")).unwrap();

        let mut satisfied = BTreeSet::new();
        read_build_requirements_from_archive_dir(
            &archive,
            &requirements(&["glibc-2.39-1-x86_64"]),
            &mut satisfied,
        )
        .unwrap();
        assert!(satisfied.is_empty());
    }

    #[test]
    fn test_management_dir_requirements() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), &pkgbase("attr", "2.5.2-1", &[]));

        let mut satisfied = BTreeSet::new();
        read_build_requirements_from_management_dirs(
            &[dir.path().to_path_buf()],
            &requirements(&["attr-2.5.2-1-x86_64", "glibc-2.39-1-x86_64"]),
            &mut satisfied,
        )
        .unwrap();
        assert_eq!(satisfied, requirements(&["attr-2.5.2-1-x86_64"]));
    }

    #[test]
    fn test_broken_descriptor_aborts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), b"{ not json").unwrap();

        let mut satisfied = BTreeSet::new();
        assert!(
            read_build_requirements_from_management_dirs(
                &[dir.path().to_path_buf()],
                &requirements(&["attr-2.5.2-1-x86_64"]),
                &mut satisfied,
            )
            .is_err()
        );
    }

    #[test]
    fn test_classification_precedence_is_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let mgmt = dir.path().join("mgmt");
        fs::create_dir_all(&mgmt).unwrap();
        // attr is satisfied by both the repo and the archive; repo wins
        write_descriptor(&mgmt, &pkgbase("attr", "2.5.2-1", &[]));

        let archive = PackageArchive::new(dir.path().join("archive")).unwrap();
        for name in [
            "attr-2.5.2-1-x86_64.pkg.tar.zst",
            "glibc-2.39-1-x86_64.pkg.tar.zst",
        ] {
            let pkg = dir.path().join(name);
            fs::write(&pkg, b"x").unwrap();
            archive.add(&pkg).unwrap();
        }

        let incoming = vec![
            pkgbase(
                "acl",
                "2.3.2-1",
                &[
                    "attr-2.5.2-1-x86_64",
                    "glibc-2.39-1-x86_64",
                    "tool-1.0-1-x86_64",
                    "lost-9.9-1-x86_64",
                ],
            ),
            pkgbase("tool", "1.0-1", &[]),
        ];

        let mut task = ReproducibleBuildEnvironmentTask::new(
            archive,
            vec![mgmt],
            InputSource::Direct(incoming),
        );
        assert_eq!(task.run(), ActionState::SuccessTask);

        assert_eq!(task.repo_deps, requirements(&["attr-2.5.2-1-x86_64"]));
        assert_eq!(task.archive_deps, requirements(&["glibc-2.39-1-x86_64"]));
        assert_eq!(task.transaction_deps, requirements(&["tool-1.0-1-x86_64"]));
        assert_eq!(task.unsatisfied, requirements(&["lost-9.9-1-x86_64"]));

        assert_eq!(task.undo(), ActionState::NotStarted);
        assert!(task.repo_deps.is_empty());
        assert!(task.unsatisfied.is_empty());
    }

    #[test]
    fn test_missing_management_dir_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let archive = PackageArchive::new(dir.path().join("archive")).unwrap();

        let mut task = ReproducibleBuildEnvironmentTask::new(
            archive,
            vec![dir.path().join("missing")],
            InputSource::Direct(vec![pkgbase("acl", "2.3.2-1", &["attr-2.5.2-1-x86_64"])]),
        );
        assert_eq!(task.run(), ActionState::FailedTask);
    }
}
