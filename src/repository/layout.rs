// src/repository/layout.rs

//! Repository directory layout.
//!
//! A [`PackageRepo`] resolves a stability tier and architecture to the three
//! directory roles the pipeline works with: the package repository directory
//! (symlink farm served to clients), the shared package pool, and the
//! management repository directory holding the JSON descriptors.

use std::fs;
use std::path::{Path, PathBuf};

use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};

/// Stability tier of a repository, least stable last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RepoTier {
    Stable,
    Testing,
    Staging,
}

impl RepoTier {
    /// Repository name component for this tier (`core`, `core-testing`, ...)
    fn dir_name(&self, name: &str) -> String {
        match self {
            Self::Stable => name.to_string(),
            Self::Testing => format!("{name}-testing"),
            Self::Staging => format!("{name}-staging"),
        }
    }
}

/// Directory role inside a repository tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoDir {
    /// Package repository directory (symlinks served to clients)
    Package,
    /// Shared package pool (file content, tier-independent)
    Pool,
    /// Management repository directory (JSON descriptors)
    Management,
}

/// Settings object resolving repository paths for one named repository
#[derive(Debug, Clone)]
pub struct PackageRepo {
    pub name: String,
    pub architecture: String,
    package_repo_base: PathBuf,
    package_pool_base: PathBuf,
    management_repo_base: PathBuf,
    tiers: Vec<RepoTier>,
}

impl PackageRepo {
    /// Create a repository rooted below `base` with only a stable tier
    pub fn new(name: &str, architecture: &str, base: &Path) -> Result<Self> {
        Self::with_tiers(name, architecture, base, vec![RepoTier::Stable])
    }

    /// Create a repository with an explicit set of stability tiers.
    ///
    /// The stable tier is always present; `base` must be absolute.
    pub fn with_tiers(
        name: &str,
        architecture: &str,
        base: &Path,
        mut tiers: Vec<RepoTier>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::Config("Repository name must not be empty".to_string()));
        }
        if !base.is_absolute() {
            return Err(Error::Config(format!(
                "Repository base must be an absolute path, but {} is not",
                base.display()
            )));
        }
        if !tiers.contains(&RepoTier::Stable) {
            tiers.push(RepoTier::Stable);
        }
        tiers.sort();
        tiers.dedup();

        Ok(Self {
            name: name.to_string(),
            architecture: architecture.to_string(),
            package_repo_base: base.join("packages"),
            package_pool_base: base.join("pool"),
            management_repo_base: base.join("management"),
            tiers,
        })
    }

    /// Configured stability tiers, most stable first
    pub fn tiers(&self) -> &[RepoTier] {
        &self.tiers
    }

    /// Resolve the absolute path of a repository directory.
    ///
    /// Fails when the requested tier is not configured for this repository.
    pub fn repo_path(&self, dir: RepoDir, tier: RepoTier) -> Result<PathBuf> {
        if !self.tiers.contains(&tier) {
            return Err(Error::Config(format!(
                "The repository {} does not have a {tier} tier",
                self.name
            )));
        }

        let tier_name = tier.dir_name(&self.name);
        Ok(match dir {
            RepoDir::Package => self
                .package_repo_base
                .join(tier_name)
                .join("os")
                .join(&self.architecture),
            RepoDir::Pool => self.package_pool_base.join(&self.name),
            RepoDir::Management => self.management_repo_base.join(tier_name).join(&self.architecture),
        })
    }

    /// Management repository directories of every configured tier
    pub fn management_dirs(&self) -> Vec<PathBuf> {
        self.tiers
            .iter()
            .filter_map(|tier| self.repo_path(RepoDir::Management, *tier).ok())
            .collect()
    }

    /// Management directories of the stability layers above (less stable than)
    /// and below (more stable than) the given tier
    pub fn stability_layers(&self, tier: RepoTier) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let above = self
            .tiers
            .iter()
            .filter(|t| **t > tier)
            .filter_map(|t| self.repo_path(RepoDir::Management, *t).ok())
            .collect();
        let below = self
            .tiers
            .iter()
            .filter(|t| **t < tier)
            .filter_map(|t| self.repo_path(RepoDir::Management, *t).ok())
            .collect();
        (above, below)
    }

    /// Create every configured directory of this repository
    pub fn create_dirs(&self) -> Result<()> {
        for tier in &self.tiers {
            for dir in [RepoDir::Package, RepoDir::Pool, RepoDir::Management] {
                fs::create_dir_all(self.repo_path(dir, *tier)?)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_paths() {
        let repo = PackageRepo::new("core", "x86_64", Path::new("/srv/repo")).unwrap();

        assert_eq!(
            repo.repo_path(RepoDir::Package, RepoTier::Stable).unwrap(),
            PathBuf::from("/srv/repo/packages/core/os/x86_64")
        );
        assert_eq!(
            repo.repo_path(RepoDir::Pool, RepoTier::Stable).unwrap(),
            PathBuf::from("/srv/repo/pool/core")
        );
        assert_eq!(
            repo.repo_path(RepoDir::Management, RepoTier::Stable).unwrap(),
            PathBuf::from("/srv/repo/management/core/x86_64")
        );
    }

    #[test]
    fn test_unconfigured_tier_is_an_error() {
        let repo = PackageRepo::new("core", "x86_64", Path::new("/srv/repo")).unwrap();
        assert!(repo.repo_path(RepoDir::Package, RepoTier::Staging).is_err());
    }

    #[test]
    fn test_relative_base_rejected() {
        assert!(PackageRepo::new("core", "x86_64", Path::new("srv/repo")).is_err());
    }

    #[test]
    fn test_tier_dir_names() {
        let repo = PackageRepo::with_tiers(
            "extra",
            "x86_64",
            Path::new("/srv/repo"),
            vec![RepoTier::Staging, RepoTier::Testing],
        )
        .unwrap();

        assert_eq!(
            repo.repo_path(RepoDir::Package, RepoTier::Testing).unwrap(),
            PathBuf::from("/srv/repo/packages/extra-testing/os/x86_64")
        );
        assert_eq!(
            repo.repo_path(RepoDir::Management, RepoTier::Staging).unwrap(),
            PathBuf::from("/srv/repo/management/extra-staging/x86_64")
        );
    }

    #[test]
    fn test_stability_layers() {
        let repo = PackageRepo::with_tiers(
            "extra",
            "x86_64",
            Path::new("/srv/repo"),
            vec![RepoTier::Stable, RepoTier::Testing, RepoTier::Staging],
        )
        .unwrap();

        let (above, below) = repo.stability_layers(RepoTier::Testing);
        assert_eq!(above.len(), 1);
        assert!(above[0].ends_with("extra-staging/x86_64"));
        assert_eq!(below.len(), 1);
        assert!(below[0].ends_with("extra/x86_64"));

        let (above, below) = repo.stability_layers(RepoTier::Stable);
        assert_eq!(above.len(), 2);
        assert!(below.is_empty());
    }
}
