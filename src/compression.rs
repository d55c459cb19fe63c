// src/compression.rs

//! Compression formats for package files and sync databases.
//!
//! Package files arrive as `.pkg.tar.zst`, `.pkg.tar.xz` or `.pkg.tar.gz`;
//! sync databases are written as `.db.tar.<ext>` / `.files.tar.<ext>` with the
//! extension derived from the configured [`CompressionType`].

use std::io::{Read, Write};

use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CompressionType {
    /// Zstandard compression (.zst)
    Zstd,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Gzip compression (.gz)
    Gzip,
}

impl CompressionType {
    /// Detect the compression of a package file from its name.
    ///
    /// Only the canonical package suffixes are accepted; anything else is a
    /// construction error, not a fallback to "no compression".
    pub fn from_package_filename(name: &str) -> Result<Self> {
        if name.ends_with(".pkg.tar.zst") {
            Ok(Self::Zstd)
        } else if name.ends_with(".pkg.tar.xz") {
            Ok(Self::Xz)
        } else if name.ends_with(".pkg.tar.gz") {
            Ok(Self::Gzip)
        } else {
            Err(Error::Package(format!(
                "Unsupported package format: {name}. \
                 Expected .pkg.tar.zst, .pkg.tar.xz, or .pkg.tar.gz"
            )))
        }
    }

    /// File extension for this format, without leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zstd => "zst",
            Self::Xz => "xz",
            Self::Gzip => "gz",
        }
    }

    /// Suffix of a compressed sync database file, e.g. `.db.tar.zst`.
    ///
    /// With `files` set, the files database suffix (`.files.tar.zst`) is
    /// returned instead.
    pub fn db_tar_suffix(&self, files: bool) -> String {
        let db = if files { "files" } else { "db" };
        format!(".{}.tar.{}", db, self.extension())
    }

    /// Create a compressing writer for this format.
    ///
    /// The returned writer finalizes its stream when dropped.
    pub fn create_encoder<'a, W: Write + 'a>(&self, writer: W) -> Result<Box<dyn Write + 'a>> {
        match self {
            Self::Zstd => {
                let encoder = zstd::Encoder::new(writer, 0)?;
                Ok(Box::new(encoder.auto_finish()))
            }
            Self::Xz => Ok(Box::new(xz2::write::XzEncoder::new(writer, 6))),
            Self::Gzip => Ok(Box::new(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            ))),
        }
    }

    /// Create a decompressing reader for this format
    pub fn create_decoder<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        match self {
            Self::Zstd => Ok(Box::new(zstd::Decoder::new(reader)?)),
            Self::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
            Self::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        }
    }
}
