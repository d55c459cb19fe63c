// src/packages/package.rs

//! Built package file parser.
//!
//! Parses `.pkg.tar.zst`, `.pkg.tar.xz` and `.pkg.tar.gz` files, extracting
//! metadata from the `.PKGINFO` and `.BUILDINFO` archive entries. A package
//! may be paired with a detached signature file (`<filename>.sig`), which must
//! exist when requested.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tar::Archive;
use tracing::debug;

use crate::compression::CompressionType;
use crate::error::{Error, Result};

/// Metadata parsed from a `.PKGINFO` entry
#[derive(Debug, Clone, Default)]
pub struct PkgInfo {
    pub base: String,
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub packager: Option<String>,
    pub build_date: Option<i64>,
    pub installed_size: u64,
    pub licenses: Vec<String>,
    pub depends: Vec<String>,
    pub make_depends: Vec<String>,
}

/// A parsed package file plus its optional detached signature
#[derive(Debug, Clone)]
pub struct Package {
    pub path: PathBuf,
    pub signature_path: Option<PathBuf>,
    pub pkginfo: PkgInfo,
    /// Exact build-time dependency NVRs recorded in `.BUILDINFO`
    pub installed: Vec<String>,
    /// Paths shipped by the package, directories with a trailing slash
    pub files: Vec<String>,
    /// Size of the compressed package file on disk
    pub compressed_size: u64,
}

impl Package {
    /// Parse a package file, optionally pairing it with a detached signature.
    ///
    /// The signature file must exist when provided; its cryptographic
    /// verification is a separate concern (see [`crate::verify`]).
    pub fn from_file(path: &Path, signature: Option<&Path>) -> Result<Self> {
        debug!("Parsing package file {}", path.display());

        if let Some(sig) = signature {
            if !sig.is_file() {
                return Err(Error::Package(format!(
                    "Missing signature file {} for package {}",
                    sig.display(),
                    path.display()
                )));
            }
        }

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidPath(format!("{} has no file name", path.display())))?;
        let compression = CompressionType::from_package_filename(filename)?;

        let (pkginfo_raw, buildinfo_raw, files) = read_archive_entries(path, compression)?;

        let pkginfo_raw = pkginfo_raw.ok_or_else(|| {
            Error::Package(format!("No .PKGINFO entry in {}", path.display()))
        })?;
        let pkginfo = parse_pkginfo(&pkginfo_raw)
            .map_err(|e| Error::Package(format!("{}: {e}", path.display())))?;

        let installed = buildinfo_raw
            .map(|raw| parse_buildinfo_installed(&raw))
            .unwrap_or_default();

        let compressed_size = fs::metadata(path)?.len();

        Ok(Self {
            path: path.to_path_buf(),
            signature_path: signature.map(Path::to_path_buf),
            pkginfo,
            installed,
            files,
            compressed_size,
        })
    }

    /// The package file name (always valid UTF-8 after parsing)
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Read metadata entries and the payload file list from the package archive
fn read_archive_entries(
    path: &Path,
    compression: CompressionType,
) -> Result<(Option<String>, Option<String>, Vec<String>)> {
    let file = File::open(path)?;
    let reader = compression.create_decoder(file)?;
    let mut archive = Archive::new(reader);

    let mut pkginfo = None;
    let mut buildinfo = None;
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_string_lossy().into_owned();

        match entry_path.as_str() {
            ".PKGINFO" => {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                pkginfo = Some(content);
            }
            ".BUILDINFO" => {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                buildinfo = Some(content);
            }
            // Metadata entries (.MTREE, .INSTALL, ...) stay out of the file list
            _ if entry_path.starts_with('.') => {}
            _ => {
                let is_dir = entry.header().entry_type().is_dir();
                let mut name = entry_path.trim_end_matches('/').to_string();
                if is_dir {
                    name.push('/');
                }
                files.push(name);
            }
        }
    }

    Ok((pkginfo, buildinfo, files))
}

/// Parse `.PKGINFO` content (`key = value` lines, `#` comments)
fn parse_pkginfo(content: &str) -> std::result::Result<PkgInfo, String> {
    let mut info = PkgInfo::default();
    let mut base = None;
    let mut name = None;
    let mut version = None;
    let mut architecture = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();

            match key {
                "pkgbase" => base = Some(value.to_string()),
                "pkgname" => name = Some(value.to_string()),
                "pkgver" => version = Some(value.to_string()),
                "pkgdesc" => info.description = Some(value.to_string()),
                "url" => info.url = Some(value.to_string()),
                "packager" => info.packager = Some(value.to_string()),
                "builddate" => info.build_date = value.parse().ok(),
                "size" => info.installed_size = value.parse().unwrap_or(0),
                "arch" => architecture = Some(value.to_string()),
                "license" => info.licenses.push(value.to_string()),
                "depend" => info.depends.push(value.to_string()),
                "makedepend" => info.make_depends.push(value.to_string()),
                _ => {}
            }
        }
    }

    let name = name.ok_or("pkgname not found in .PKGINFO")?;
    // Single (non-split) packages carry no explicit pkgbase
    info.base = base.unwrap_or_else(|| name.clone());
    info.name = name;
    info.version = version.ok_or("pkgver not found in .PKGINFO")?;
    info.architecture = architecture.ok_or("arch not found in .PKGINFO")?;

    Ok(info)
}

/// Collect the `installed = <nvr>` entries from `.BUILDINFO` content
fn parse_buildinfo_installed(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            if key.trim() == "installed" {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
        .collect()
}
