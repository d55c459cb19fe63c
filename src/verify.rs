// src/verify.rs

//! Detached signature verification.
//!
//! Verification is a seam: the pipeline only needs a yes/no answer for a
//! package/signature pair, so callers inject a [`SignatureVerifier`]. The
//! default implementation shells out to `pacman-key`, which owns the keyring
//! on the systems this runs on.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Verifies a detached signature against a package file
pub trait SignatureVerifier {
    fn verify(&self, package: &Path, signature: &Path) -> Result<()>;
}

/// Verifier backed by `pacman-key --verify`
#[derive(Debug, Default)]
pub struct PacmanKeyVerifier;

impl SignatureVerifier for PacmanKeyVerifier {
    fn verify(&self, package: &Path, signature: &Path) -> Result<()> {
        debug!(
            "Verifying signature {} for {}",
            signature.display(),
            package.display()
        );

        let output = Command::new("pacman-key")
            .arg("--verify")
            .arg(signature)
            .arg(package)
            .output()
            .map_err(|e| Error::Verification(format!("Failed running pacman-key: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Verification(format!(
                "Signature verification failed for {}: {}",
                package.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
