// src/packages/pkgbase.rs

//! Pkgbase descriptors.
//!
//! An [`OutputPackageBase`] aggregates the packages produced by one build unit
//! together with its build metadata. It is serialized as the
//! `<pkgbase>.json` descriptor inside a management repository directory and is
//! the source of truth for sync database compilation and consolidation.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::packages::package::Package;

/// A `name-version-arch` package build identifier.
///
/// The version part is `pkgver-pkgrel` (optionally with a leading epoch), so
/// the string form carries at least three dashes; the name itself may contain
/// dashes, which is why parsing proceeds from the right.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Nvr {
    pub name: String,
    pub version: String,
    pub architecture: String,
}

impl Nvr {
    /// Parse an NVR string such as `gtk-doc-1.33.2-1-any`
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.rsplitn(4, '-');
        let architecture = parts.next().unwrap_or_default();
        let pkgrel = parts.next().unwrap_or_default();
        let pkgver = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();

        if name.is_empty() || pkgver.is_empty() || pkgrel.is_empty() || architecture.is_empty() {
            return Err(Error::Package(format!("Malformed NVR string: {s}")));
        }
        if !pkgrel.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::Package(format!(
                "Malformed NVR string (pkgrel must be numeric): {s}"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            version: format!("{pkgver}-{pkgrel}"),
            architecture: architecture.to_string(),
        })
    }

    /// Parse the NVR encoded in a package file name.
    ///
    /// Accepts `<nvr>.pkg.tar.<ext>` and its `.sig` companion.
    pub fn from_package_filename(filename: &str) -> Result<Self> {
        let stem = filename.strip_suffix(".sig").unwrap_or(filename);
        let stem = stem
            .rsplit_once(".pkg.tar.")
            .map(|(stem, _ext)| stem)
            .ok_or_else(|| {
                Error::Package(format!("Not a package file name: {filename}"))
            })?;
        Self::parse(stem)
    }
}

impl fmt::Display for Nvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.version, self.architecture)
    }
}

/// Build metadata carried by a pkgbase descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Exact build-time dependency NVRs recorded at build time
    #[serde(default)]
    pub installed: Vec<String>,
}

/// One package entry inside a pkgbase descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPackage {
    pub name: String,
    pub arch: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "csize")]
    pub compressed_size: u64,
    #[serde(rename = "isize")]
    pub installed_size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    /// Paths shipped by the package, directories with a trailing slash
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

fn default_schema_version() -> u32 {
    1
}

/// Descriptor of one build unit: its packages plus build metadata.
///
/// Read-only to every consumer once built; tasks clone what they need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPackageBase {
    pub base: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub buildinfo: BuildInfo,
    pub packages: Vec<OutputPackage>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl OutputPackageBase {
    /// Load a descriptor from a `<pkgbase>.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Package(format!("Failed opening descriptor {}: {e}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::Package(format!("Failed parsing descriptor {}: {e}", path.display()))
        })
    }

    /// Build a descriptor from one pkgbase's parsed package files.
    ///
    /// All packages must share the same pkgbase and version; the build
    /// dependency list is the deduplicated union of their `.BUILDINFO`
    /// entries.
    pub fn from_packages(packages: &[Package]) -> Result<Self> {
        let first = packages.first().ok_or_else(|| {
            Error::Package("Cannot build a pkgbase from zero packages".to_string())
        })?;

        let base = first.pkginfo.base.clone();
        let version = first.pkginfo.version.clone();

        for package in packages {
            if package.pkginfo.base != base || package.pkginfo.version != version {
                return Err(Error::Package(format!(
                    "Package {} ({}-{}) does not belong to pkgbase {}-{}",
                    package.pkginfo.name,
                    package.pkginfo.base,
                    package.pkginfo.version,
                    base,
                    version
                )));
            }
        }

        let mut installed = Vec::new();
        for package in packages {
            for nvr in &package.installed {
                if !installed.contains(nvr) {
                    installed.push(nvr.clone());
                }
            }
        }

        let packages = packages
            .iter()
            .map(|package| OutputPackage {
                name: package.pkginfo.name.clone(),
                arch: package.pkginfo.architecture.clone(),
                filename: package.filename(),
                desc: package.pkginfo.description.clone(),
                url: package.pkginfo.url.clone(),
                compressed_size: package.compressed_size,
                installed_size: package.pkginfo.installed_size,
                depends: package.pkginfo.depends.clone(),
                licenses: package.pkginfo.licenses.clone(),
                files: package.files.clone(),
            })
            .collect();

        Ok(Self {
            base,
            version,
            source_url: None,
            buildinfo: BuildInfo { installed },
            packages,
            schema_version: default_schema_version(),
        })
    }

    /// Group parsed packages by pkgbase (first-seen order) into descriptors
    pub fn group_packages(packages: &[Package]) -> Result<Vec<Self>> {
        let mut groups: Vec<(String, Vec<&Package>)> = Vec::new();
        for package in packages {
            match groups
                .iter_mut()
                .find(|(base, _)| *base == package.pkginfo.base)
            {
                Some((_, group)) => group.push(package),
                None => groups.push((package.pkginfo.base.clone(), vec![package])),
            }
        }

        groups
            .into_iter()
            .map(|(_, group)| {
                let owned: Vec<Package> = group.into_iter().cloned().collect();
                Self::from_packages(&owned)
            })
            .collect()
    }

    /// File name of this descriptor inside a management directory
    pub fn descriptor_filename(&self) -> String {
        format!("{}.json", self.base)
    }

    /// Serialize to the descriptor JSON representation
    pub fn to_json_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Package file names of every package entry
    pub fn package_filenames(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.filename.clone()).collect()
    }

    /// Names of every package entry
    pub fn package_names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }

    /// NVRs of the packages this pkgbase provides within a transaction
    pub fn provided_nvrs(&self) -> Vec<String> {
        self.packages
            .iter()
            .map(|p| format!("{}-{}-{}", p.name, self.version, p.arch))
            .collect()
    }
}
