// src/repository/repofile.rs

//! Package files inside a repository tree.
//!
//! A [`RepoFile`] pairs the location of a package (or signature) file in the
//! shared pool with the symlink location inside a package repository
//! directory. Symlinks are always created relative, so the tree stays valid
//! when the repository root is bind-mounted or served from a different prefix.

use std::fs;
use std::path::{Component, Path, PathBuf};

use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::error::{Error, Result};
use crate::packages::Nvr;

/// Kind of file tracked in a repository tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RepoFileKind {
    Package,
    Signature,
}

impl RepoFileKind {
    /// Whether `filename` is a valid file name for this kind
    pub fn matches(&self, filename: &str) -> bool {
        if Nvr::from_package_filename(filename).is_err() {
            return false;
        }
        match self {
            Self::Package => !filename.ends_with(".sig"),
            Self::Signature => filename.ends_with(".sig"),
        }
    }
}

/// A pool file and its repository symlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub kind: RepoFileKind,
    /// Absolute path of the file in the package pool
    pub file_path: PathBuf,
    /// Absolute path of the symlink in the package repository directory
    pub symlink_path: PathBuf,
}

impl RepoFile {
    /// Create a repository file, validating both paths.
    ///
    /// Both paths must be absolute, carry the same file name, and that file
    /// name must match `kind`.
    pub fn new(kind: RepoFileKind, file_path: PathBuf, symlink_path: PathBuf) -> Result<Self> {
        for path in [&file_path, &symlink_path] {
            if !path.is_absolute() {
                return Err(Error::InvalidPath(format!(
                    "Repository file path {} is not absolute",
                    path.display()
                )));
            }
        }
        let filename = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidPath(format!("{} has no file name", file_path.display()))
            })?;
        if symlink_path.file_name().and_then(|name| name.to_str()) != Some(filename) {
            return Err(Error::InvalidPath(format!(
                "File {} and symlink {} carry different file names",
                file_path.display(),
                symlink_path.display()
            )));
        }
        if !kind.matches(filename) {
            return Err(Error::InvalidPath(format!(
                "{filename} is not a valid {kind} file name"
            )));
        }

        Ok(Self {
            kind,
            file_path,
            symlink_path,
        })
    }

    /// Copy `source` into the pool location
    pub fn copy_from(&self, source: &Path) -> Result<()> {
        debug!(
            "Copying {} to {}",
            source.display(),
            self.file_path.display()
        );
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &self.file_path)?;
        Ok(())
    }

    /// Create the repository symlink pointing at the pool file.
    ///
    /// An existing symlink at the target location is replaced.
    pub fn link(&self) -> Result<()> {
        let parent = self.symlink_path.parent().ok_or_else(|| {
            Error::InvalidPath(format!(
                "Symlink {} has no parent directory",
                self.symlink_path.display()
            ))
        })?;
        fs::create_dir_all(parent)?;

        let target = relative_path(&self.file_path, parent);
        debug!(
            "Linking {} -> {}",
            self.symlink_path.display(),
            target.display()
        );

        if fs::symlink_metadata(&self.symlink_path).is_ok() {
            fs::remove_file(&self.symlink_path)?;
        }
        std::os::unix::fs::symlink(&target, &self.symlink_path)?;
        Ok(())
    }

    /// Remove both the symlink and the pool file; missing files are ignored
    pub fn remove(&self) -> Result<()> {
        for path in [&self.symlink_path, &self.file_path] {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Compute the relative path from `from_dir` to `target`.
///
/// Both paths must be absolute and free of `..` components.
pub fn relative_path(target: &Path, from_dir: &Path) -> PathBuf {
    let target_parts: Vec<Component<'_>> = target.components().collect();
    let from_parts: Vec<Component<'_>> = from_dir.components().collect();

    let common = target_parts
        .iter()
        .zip(from_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part);
    }
    relative
}
