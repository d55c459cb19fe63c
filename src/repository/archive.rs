// src/repository/archive.rs

//! Package archive tree.
//!
//! The archive keeps every package version ever published, laid out as
//! `<first-letter>/<pkgname>/<filename>` so single directories stay small.
//! Reproducible-build lookups scan it for the exact NVRs a build recorded.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result, TaskError};
use crate::packages::Nvr;

/// An archive directory holding historic package files
#[derive(Debug, Clone)]
pub struct PackageArchive {
    root: PathBuf,
}

impl PackageArchive {
    /// Create an archive rooted at the absolute path `root`
    pub fn new(root: PathBuf) -> Result<Self> {
        if !root.is_absolute() {
            return Err(Error::InvalidPath(format!(
                "Archive root {} is not absolute",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive location for a package (or signature) file name
    pub fn path_for(&self, filename: &str) -> Result<PathBuf> {
        let nvr = Nvr::from_package_filename(filename)
            .map_err(|_| TaskError::InvalidFileName(filename.to_string()))?;
        // Package names are ASCII by convention; the first byte is the shard
        let first = nvr
            .name
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase().to_string())
            .ok_or_else(|| TaskError::InvalidFileName(filename.to_string()))?;
        Ok(self.root.join(first).join(&nvr.name).join(filename))
    }

    /// Copy a package file into the archive, returning the archive path.
    ///
    /// An existing file of the same name is overwritten; archived package
    /// files are immutable by name, so the content is identical.
    pub fn add(&self, source: &Path) -> Result<PathBuf> {
        let filename = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidPath(format!("{} has no file name", source.display()))
            })?;
        let destination = self.path_for(filename)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("Archiving {} to {}", source.display(), destination.display());
        fs::copy(source, &destination)?;
        Ok(destination)
    }

    /// Every package NVR present in the archive tree
    pub fn nvrs(&self) -> Result<BTreeSet<String>> {
        let mut nvrs = BTreeSet::new();
        if !self.root.is_dir() {
            return Ok(nvrs);
        }

        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| TaskError::ArchiveDir {
                path: self.root.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(filename) = entry.file_name().to_str() else {
                continue;
            };
            if filename.ends_with(".sig") {
                continue;
            }
            if let Ok(nvr) = Nvr::from_package_filename(filename) {
                nvrs.insert(nvr.to_string());
            }
        }
        Ok(nvrs)
    }
}
