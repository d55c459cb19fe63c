// src/lib.rs

//! repoforge - transactional builder for binary package repositories
//!
//! repoforge turns freshly built package files into a consistent,
//! queryable Arch-style repository tree: pkgbase descriptors in a
//! management directory, packages in a pool with symlink farms per
//! stability tier, and compiled sync databases. Every mutation runs as a
//! task with do/undo semantics; files are published through an atomic
//! temp-file/backup/rename protocol, so a crash at any step leaves each
//! artifact either fully updated or fully recoverable from its backup.

pub mod compression;
pub mod error;
pub mod packages;
pub mod repository;
pub mod task;
pub mod verify;

pub use compression::CompressionType;
pub use error::{Error, Result, TaskError};
pub use packages::{BuildInfo, Nvr, OutputPackage, OutputPackageBase, Package, PkgInfo, vercmp};
pub use repository::{
    FilesVersion, PackageArchive, PackageDescVersion, PackageRepo, RepoDir, RepoFile,
    RepoFileKind, RepoTier, SyncDatabase,
};
pub use task::{ActionState, InputSource, Task, TaskHandle, handle};
pub use verify::{PacmanKeyVerifier, SignatureVerifier};
