// src/task/build.rs

//! Pkgbase builder task.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::packages::{OutputPackageBase, Package};
use crate::task::{ActionState, Task};
use crate::verify::SignatureVerifier;

/// Parses package files into pkgbase descriptors.
///
/// All-or-nothing: a single parse or verification failure discards the whole
/// run, a partially built pkgbase list is never exposed downstream.
pub struct CreateOutputPackageBasesTask {
    state: ActionState,
    paths: Vec<PathBuf>,
    architecture: String,
    with_signature: bool,
    verifier: Option<Box<dyn SignatureVerifier>>,
    /// Upstream source URL per pkgbase name
    source_urls: HashMap<String, String>,
    /// Built descriptors, populated on success
    pub pkgbases: Vec<OutputPackageBase>,
}

impl CreateOutputPackageBasesTask {
    pub fn new(
        paths: Vec<PathBuf>,
        architecture: &str,
        with_signature: bool,
        verifier: Option<Box<dyn SignatureVerifier>>,
        source_urls: HashMap<String, String>,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::Config(
                "Cannot create pkgbases from an empty package list".to_string(),
            ));
        }
        for path in &paths {
            if !path.is_absolute() {
                return Err(Error::InvalidPath(format!(
                    "Package path {} is not absolute",
                    path.display()
                )));
            }
        }

        Ok(Self {
            state: ActionState::NotStarted,
            paths,
            architecture: architecture.to_string(),
            with_signature,
            verifier,
            source_urls,
            pkgbases: Vec::new(),
        })
    }

    fn build(&self) -> Result<Vec<OutputPackageBase>> {
        let mut packages = Vec::new();

        for path in &self.paths {
            let signature = self
                .with_signature
                .then(|| PathBuf::from(format!("{}.sig", path.display())));

            if let (Some(verifier), Some(sig)) = (&self.verifier, &signature) {
                verifier.verify(path, sig)?;
            }

            let package = Package::from_file(path, signature.as_deref())?;
            if package.pkginfo.architecture != self.architecture
                && package.pkginfo.architecture != "any"
            {
                return Err(Error::Package(format!(
                    "Package {} is built for {}, not {}",
                    package.filename(),
                    package.pkginfo.architecture,
                    self.architecture
                )));
            }
            packages.push(package);
        }

        let mut pkgbases = OutputPackageBase::group_packages(&packages)?;
        for pkgbase in &mut pkgbases {
            pkgbase.source_url = self.source_urls.get(&pkgbase.base).cloned();
        }
        Ok(pkgbases)
    }
}

impl Task for CreateOutputPackageBasesTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }
        info!("Creating pkgbases from {} package files", self.paths.len());

        self.state = match self.build() {
            Ok(pkgbases) => {
                self.pkgbases = pkgbases;
                ActionState::SuccessTask
            }
            Err(e) => {
                debug!("Creating pkgbases failed: {e}");
                ActionState::FailedTask
            }
        };
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.pkgbases.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}
