// src/repository/syncdb.rs

//! Sync database compilation.
//!
//! Compiles pkgbase descriptors into the `<name>.db.tar.<ext>` and
//! `<name>.files.tar.<ext>` archives pacman consumes. Each package becomes a
//! `<pkgname>-<version>/` directory holding a `desc` entry (and a `files`
//! entry in the files database), matching the layout `repo-add` produces.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tar::{Builder, EntryType, Header};
use tracing::debug;

use crate::compression::CompressionType;
use crate::error::{Error, Result};
use crate::packages::{OutputPackage, OutputPackageBase};

/// Schema version of the `desc` entries in a sync database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageDescVersion {
    /// Classic desc layout without a `%BASE%` section
    V1,
    /// Adds the `%BASE%` section
    V2,
}

impl TryFrom<u8> for PackageDescVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            _ => Err(Error::Config(format!(
                "Unknown package desc version: {value}"
            ))),
        }
    }
}

/// Schema version of the `files` entries in a files database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesVersion {
    V1,
}

impl TryFrom<u8> for FilesVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            _ => Err(Error::Config(format!("Unknown files version: {value}"))),
        }
    }
}

/// Writer for one repository's sync databases
#[derive(Debug, Clone)]
pub struct SyncDatabase {
    pub name: String,
    pub compression: CompressionType,
    pub desc_version: PackageDescVersion,
    pub files_version: FilesVersion,
}

impl SyncDatabase {
    pub fn new(
        name: &str,
        compression: CompressionType,
        desc_version: PackageDescVersion,
        files_version: FilesVersion,
    ) -> Self {
        Self {
            name: name.to_string(),
            compression,
            desc_version,
            files_version,
        }
    }

    /// Path of the compressed sync database below `dir`
    pub fn syncdb_path(&self, dir: &Path, files: bool) -> PathBuf {
        dir.join(format!(
            "{}{}",
            self.name,
            self.compression.db_tar_suffix(files)
        ))
    }

    /// Path of the extensionless symlink (`<name>.db` / `<name>.files`)
    pub fn symlink_path(&self, dir: &Path, files: bool) -> PathBuf {
        let suffix = if files { "files" } else { "db" };
        dir.join(format!("{}.{}", self.name, suffix))
    }

    /// Write a sync database for the given pkgbases to `path`.
    ///
    /// With `files` set, the files database (including per-package file
    /// lists) is written instead of the default database.
    pub fn write(&self, pkgbases: &[OutputPackageBase], path: &Path, files: bool) -> Result<()> {
        debug!(
            "Writing {} database for {} pkgbases to {}",
            if files { "files" } else { "sync" },
            pkgbases.len(),
            path.display()
        );

        let file = File::create(path)?;
        let encoder = self.compression.create_encoder(file)?;
        let mut builder = Builder::new(encoder);

        for pkgbase in pkgbases {
            for package in &pkgbase.packages {
                let dir = format!("{}-{}/", package.name, pkgbase.version);
                append_dir(&mut builder, &dir)?;

                let desc = self.render_desc(pkgbase, package);
                append_file(&mut builder, &format!("{dir}desc"), desc.as_bytes())?;

                if files {
                    let list = render_files(package);
                    append_file(&mut builder, &format!("{dir}files"), list.as_bytes())?;
                }
            }
        }

        builder.into_inner()?.flush()?;
        Ok(())
    }

    fn render_desc(&self, pkgbase: &OutputPackageBase, package: &OutputPackage) -> String {
        let mut out = String::new();
        section(&mut out, "FILENAME", &[&package.filename]);
        section(&mut out, "NAME", &[&package.name]);
        if self.desc_version == PackageDescVersion::V2 {
            section(&mut out, "BASE", &[&pkgbase.base]);
        }
        section(&mut out, "VERSION", &[&pkgbase.version]);
        if let Some(desc) = &package.desc {
            section(&mut out, "DESC", &[desc]);
        }
        section(&mut out, "CSIZE", &[&package.compressed_size.to_string()]);
        section(&mut out, "ISIZE", &[&package.installed_size.to_string()]);
        if let Some(url) = &package.url {
            section(&mut out, "URL", &[url]);
        }
        if !package.licenses.is_empty() {
            let licenses: Vec<&str> = package.licenses.iter().map(String::as_str).collect();
            section(&mut out, "LICENSE", &licenses);
        }
        section(&mut out, "ARCH", &[&package.arch]);
        if !package.depends.is_empty() {
            let depends: Vec<&str> = package.depends.iter().map(String::as_str).collect();
            section(&mut out, "DEPENDS", &depends);
        }
        out
    }
}

fn render_files(package: &OutputPackage) -> String {
    let mut out = String::from("%FILES%\n");
    for file in &package.files {
        out.push_str(file);
        out.push('\n');
    }
    out
}

fn section(out: &mut String, key: &str, values: &[&str]) {
    out.push('%');
    out.push_str(key);
    out.push_str("%\n");
    for value in values {
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
}

fn append_dir<W: Write>(builder: &mut Builder<W>, path: &str) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_mode(0o755);
    header.set_size(0);
    header.set_mtime(0);
    builder.append_data(&mut header, path, std::io::empty())?;
    Ok(())
}

fn append_file<W: Write>(builder: &mut Builder<W>, path: &str, content: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(content.len() as u64);
    header.set_mtime(0);
    builder.append_data(&mut header, path, content)?;
    Ok(())
}
