// src/repository/mod.rs

//! Repository layout, file placement, sync databases and the package archive.

pub mod archive;
pub mod layout;
pub mod repofile;
pub mod syncdb;

pub use archive::PackageArchive;
pub use layout::{PackageRepo, RepoDir, RepoTier};
pub use repofile::{RepoFile, RepoFileKind};
pub use syncdb::{FilesVersion, PackageDescVersion, SyncDatabase};
