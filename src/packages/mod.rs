// src/packages/mod.rs

//! Package file parsing and pkgbase descriptors.

pub mod package;
pub mod pkgbase;
pub mod version;

pub use package::{Package, PkgInfo};
pub use pkgbase::{BuildInfo, Nvr, OutputPackage, OutputPackageBase};
pub use version::vercmp;
