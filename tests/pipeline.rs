// tests/pipeline.rs

//! End-to-end pipeline runs against a real repository tree.

mod common;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use repoforge::compression::CompressionType;
use repoforge::repository::{PackageArchive, PackageRepo, RepoDir, RepoFileKind, RepoTier};
use repoforge::task::{
    ActionState, AddToArchiveTask, ArchiveInput, ConsolidateOutputPackageBasesTask,
    CreateOutputPackageBasesTask, FilesToRepoDirTask, InputSource, MoveInput, MoveTmpFilesTask,
    RemoveBackupFilesTask, RemoveBackupInput, RemoveManagementRepoSymlinksTask,
    RemovePackageRepoSymlinksTask, ReproducibleBuildEnvironmentTask, StabilityLayers, Task,
    TaskHandle, WriteOutputPackageBasesToTmpFilesTask, WriteSyncDbsToTmpFilesTask, handle,
};

use common::{entries_with_suffix, write_package};

struct Fixture {
    _tmp: tempfile::TempDir,
    build_dir: PathBuf,
    repo: PackageRepo,
    mgmt_dir: PathBuf,
    repo_dir: PathBuf,
    pool_dir: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let build_dir = tmp.path().join("build");
    fs::create_dir_all(&build_dir).unwrap();

    let repo = PackageRepo::new("core", "x86_64", tmp.path()).unwrap();
    repo.create_dirs().unwrap();
    let mgmt_dir = repo.repo_path(RepoDir::Management, RepoTier::Stable).unwrap();
    let repo_dir = repo.repo_path(RepoDir::Package, RepoTier::Stable).unwrap();
    let pool_dir = repo.repo_path(RepoDir::Pool, RepoTier::Stable).unwrap();

    Fixture {
        _tmp: tmp,
        build_dir,
        repo,
        mgmt_dir,
        repo_dir,
        pool_dir,
    }
}

/// Run the standard publish pipeline for the given package files.
///
/// Returns the consolidation task so callers can inspect the resolved state.
fn publish(
    fx: &Fixture,
    packages: Vec<PathBuf>,
) -> TaskHandle<ConsolidateOutputPackageBasesTask> {
    let builder = handle(
        CreateOutputPackageBasesTask::new(packages.clone(), "x86_64", false, None, HashMap::new())
            .unwrap(),
    );
    assert_eq!(builder.borrow_mut().run(), ActionState::SuccessTask);

    // Consolidation resolves current/stale state against the pre-update tree
    let consolidation = handle(
        ConsolidateOutputPackageBasesTask::new(
            fx.mgmt_dir.clone(),
            StabilityLayers::default(),
            InputSource::FromTask(builder.clone()),
        )
        .unwrap(),
    );
    assert_eq!(consolidation.borrow_mut().run(), ActionState::SuccessTask);

    let mut placement = FilesToRepoDirTask::new(
        packages,
        RepoFileKind::Package,
        fx.repo.clone(),
        RepoTier::Stable,
    )
    .unwrap();
    assert_eq!(placement.run(), ActionState::SuccessTask);

    let writer = handle(
        WriteOutputPackageBasesToTmpFilesTask::new(
            fx.mgmt_dir.clone(),
            InputSource::FromTask(builder),
        )
        .unwrap(),
    );
    assert_eq!(writer.borrow_mut().run(), ActionState::SuccessTask);

    let descriptor_mover = handle(
        MoveTmpFilesTask::new(MoveInput::FromPkgbaseWrite(writer)).unwrap(),
    );
    assert_eq!(descriptor_mover.borrow_mut().run(), ActionState::SuccessTask);

    let mut names_pruner = RemoveManagementRepoSymlinksTask::new(
        fx.mgmt_dir.clone(),
        InputSource::FromTask(consolidation.clone()),
    )
    .unwrap();
    assert_eq!(names_pruner.run(), ActionState::SuccessTask);

    let mut files_pruner = RemovePackageRepoSymlinksTask::new(
        fx.repo_dir.clone(),
        InputSource::FromTask(consolidation.clone()),
    )
    .unwrap();
    assert_eq!(files_pruner.run(), ActionState::SuccessTask);

    let db_writer = handle(
        WriteSyncDbsToTmpFilesTask::new(
            "core",
            CompressionType::Zstd,
            2,
            1,
            fx.mgmt_dir.clone(),
            fx.repo_dir.clone(),
        )
        .unwrap(),
    );
    assert_eq!(db_writer.borrow_mut().run(), ActionState::SuccessTask);

    let db_mover = handle(
        MoveTmpFilesTask::new(MoveInput::FromSyncDbWrite(db_writer)).unwrap(),
    );
    assert_eq!(db_mover.borrow_mut().run(), ActionState::SuccessTask);

    for mover in [descriptor_mover, db_mover] {
        let mut cleaner = RemoveBackupFilesTask::new(RemoveBackupInput::FromMove(mover)).unwrap();
        assert!(cleaner.run().is_success());
    }

    consolidation
}

#[test]
fn test_publish_two_pkgbases_leaves_a_clean_tree() {
    let fx = fixture();
    let packages = vec![
        write_package(&fx.build_dir, "acl", "acl", "2.3.2-1", &[]),
        write_package(&fx.build_dir, "attr", "attr", "2.5.2-1", &[]),
    ];

    publish(&fx, packages);

    assert!(fx.mgmt_dir.join("acl.json").is_file());
    assert!(fx.mgmt_dir.join("attr.json").is_file());
    assert_eq!(
        fs::read(fx.mgmt_dir.join("pkgnames/acl.json")).unwrap(),
        fs::read(fx.mgmt_dir.join("acl.json")).unwrap()
    );

    // Pool files exist and the repo symlinks resolve to them
    assert!(fx.pool_dir.join("acl-2.3.2-1-x86_64.pkg.tar.zst").is_file());
    assert!(
        fs::read(fx.repo_dir.join("attr-2.5.2-1-x86_64.pkg.tar.zst"))
            .unwrap()
            .len()
            > 0
    );

    // Promoted sync databases with resolving extensionless symlinks
    assert!(fx.repo_dir.join("core.db.tar.zst").is_file());
    assert!(fx.repo_dir.join("core.files.tar.zst").is_file());
    assert_eq!(
        fs::read_link(fx.repo_dir.join("core.db")).unwrap(),
        PathBuf::from("core.db.tar.zst")
    );
    assert!(fs::read(fx.repo_dir.join("core.files")).unwrap().len() > 0);

    // No staging or backup residue anywhere
    for dir in [&fx.mgmt_dir, &fx.repo_dir] {
        assert!(entries_with_suffix(dir, ".tmp").is_empty());
        assert!(entries_with_suffix(dir, ".bkp").is_empty());
    }
}

#[test]
fn test_second_publish_prunes_stale_packages() {
    let fx = fixture();

    let v1 = vec![
        write_package(&fx.build_dir, "gcc", "gcc", "13.1-1", &[]),
        write_package(&fx.build_dir, "gcc", "gcc-libs", "13.1-1", &[]),
    ];
    publish(&fx, v1);
    assert!(fx.repo_dir.join("gcc-libs-13.1-1-x86_64.pkg.tar.zst").exists());

    // The split package is dropped in the new version
    let v2 = vec![write_package(&fx.build_dir, "gcc", "gcc", "13.2-1", &[])];
    let consolidation = publish(&fx, v2);

    assert_eq!(
        consolidation.borrow().stale_package_names,
        vec!["gcc-libs".to_string()]
    );
    assert!(!fx.repo_dir.join("gcc-13.1-1-x86_64.pkg.tar.zst").exists());
    assert!(!fx.repo_dir.join("gcc-libs-13.1-1-x86_64.pkg.tar.zst").exists());
    assert!(fx.repo_dir.join("gcc-13.2-1-x86_64.pkg.tar.zst").exists());
    assert!(fs::symlink_metadata(fx.mgmt_dir.join("pkgnames/gcc-libs.json")).is_err());

    let descriptor = fs::read_to_string(fx.mgmt_dir.join("gcc.json")).unwrap();
    assert!(descriptor.contains("13.2-1"));
    assert!(entries_with_suffix(&fx.mgmt_dir, ".bkp").is_empty());
}

#[test]
fn test_failed_build_gates_the_whole_pipeline() {
    let fx = fixture();

    // The package file does not exist, parsing fails
    let builder = handle(
        CreateOutputPackageBasesTask::new(
            vec![fx.build_dir.join("ghost-1.0-1-x86_64.pkg.tar.zst")],
            "x86_64",
            false,
            None,
            HashMap::new(),
        )
        .unwrap(),
    );
    assert_eq!(builder.borrow_mut().run(), ActionState::FailedTask);

    let writer = handle(
        WriteOutputPackageBasesToTmpFilesTask::new(
            fx.mgmt_dir.clone(),
            InputSource::FromTask(builder.clone()),
        )
        .unwrap(),
    );
    assert_eq!(writer.borrow_mut().run(), ActionState::FailedDependency);

    let mut mover = MoveTmpFilesTask::new(MoveInput::FromPkgbaseWrite(writer)).unwrap();
    assert_eq!(mover.run(), ActionState::FailedDependency);

    let mut consolidation = ConsolidateOutputPackageBasesTask::new(
        fx.mgmt_dir.clone(),
        StabilityLayers::default(),
        InputSource::FromTask(builder),
    )
    .unwrap();
    assert_eq!(consolidation.run(), ActionState::FailedDependency);

    assert!(entries_with_suffix(&fx.mgmt_dir, ".json").is_empty());
    assert!(entries_with_suffix(&fx.mgmt_dir, ".tmp").is_empty());
}

#[test]
fn test_undo_rolls_a_staged_publish_back() {
    let fx = fixture();

    // Publish version 1, then stage and promote version 2
    publish(
        &fx,
        vec![write_package(&fx.build_dir, "acl", "acl", "2.3.1-1", &[])],
    );
    let old_descriptor = fs::read(fx.mgmt_dir.join("acl.json")).unwrap();

    let builder = handle(
        CreateOutputPackageBasesTask::new(
            vec![write_package(&fx.build_dir, "acl", "acl", "2.3.2-1", &[])],
            "x86_64",
            false,
            None,
            HashMap::new(),
        )
        .unwrap(),
    );
    builder.borrow_mut().run();

    let writer = handle(
        WriteOutputPackageBasesToTmpFilesTask::new(
            fx.mgmt_dir.clone(),
            InputSource::FromTask(builder),
        )
        .unwrap(),
    );
    writer.borrow_mut().run();

    let mover = handle(MoveTmpFilesTask::new(MoveInput::FromPkgbaseWrite(writer.clone())).unwrap());
    assert_eq!(mover.borrow_mut().run(), ActionState::SuccessTask);
    assert_ne!(fs::read(fx.mgmt_dir.join("acl.json")).unwrap(), old_descriptor);

    // Roll back in reverse order
    assert_eq!(mover.borrow_mut().undo(), ActionState::NotStarted);
    assert_eq!(fs::read(fx.mgmt_dir.join("acl.json")).unwrap(), old_descriptor);
    assert_eq!(writer.borrow_mut().undo(), ActionState::NotStarted);

    assert!(entries_with_suffix(&fx.mgmt_dir, ".tmp").is_empty());
    assert!(entries_with_suffix(&fx.mgmt_dir, ".bkp").is_empty());
}

#[test]
fn test_archive_and_reproducibility_across_runs() {
    let fx = fixture();
    let archive_root = fx._tmp.path().join("archive");
    fs::create_dir_all(&archive_root).unwrap();

    // First run publishes and archives the dependency
    let glibc = write_package(&fx.build_dir, "glibc", "glibc", "2.39-1", &[]);
    publish(&fx, vec![glibc.clone()]);

    let mut placement = FilesToRepoDirTask::new(
        vec![glibc],
        RepoFileKind::Package,
        fx.repo.clone(),
        RepoTier::Stable,
    )
    .unwrap();
    placement.run();
    let placement = handle(placement);

    let mut archiver = AddToArchiveTask::new(
        PackageArchive::new(archive_root.clone()).unwrap(),
        ArchiveInput::FromPlacement(placement),
    )
    .unwrap();
    assert_eq!(archiver.run(), ActionState::SuccessTask);

    // Second run records glibc as a build requirement
    let acl = write_package(
        &fx.build_dir,
        "acl",
        "acl",
        "2.3.2-1",
        &["glibc-2.39-1-x86_64", "attr-2.5.2-1-x86_64"],
    );
    let builder = handle(
        CreateOutputPackageBasesTask::new(vec![acl], "x86_64", false, None, HashMap::new())
            .unwrap(),
    );
    builder.borrow_mut().run();

    let mut check = ReproducibleBuildEnvironmentTask::new(
        PackageArchive::new(archive_root).unwrap(),
        vec![fx.mgmt_dir.clone()],
        InputSource::FromTask(builder),
    );
    assert_eq!(check.run(), ActionState::SuccessTask);

    // glibc is in the management repo (precedence over its archive copy)
    assert!(check.repo_deps.contains("glibc-2.39-1-x86_64"));
    assert!(check.archive_deps.is_empty());
    assert!(check.unsatisfied.contains("attr-2.5.2-1-x86_64"));
}
