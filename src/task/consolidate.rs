// src/task/consolidate.rs

//! Consolidation and pruning tasks.
//!
//! Consolidation reconciles the incoming pkgbases with what a management
//! directory already contains and resolves which packages are current,
//! consulting the stability layers above and below the target tier. The two
//! pruning tasks then delete symlinks that no longer belong to the current
//! state; pruning is non-reversible cleanup, like backup removal.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::packages::{OutputPackageBase, vercmp};
use crate::task::build::CreateOutputPackageBasesTask;
use crate::task::{ActionState, InputSource, Task};

/// Directories of the stability layers around a target tier
#[derive(Debug, Clone, Default)]
pub struct StabilityLayers {
    /// Less stable tiers (e.g. staging when targeting testing)
    pub above: Vec<PathBuf>,
    /// More stable tiers
    pub below: Vec<PathBuf>,
}

/// Resolves the current state of a management directory.
///
/// The `current_*` collections reflect the post-update repository state: the
/// union of the incoming pkgbases and the on-disk descriptors they do not
/// replace. The `stale_*` collections hold what the incoming pkgbases
/// obsolete, feeding the pruning tasks.
pub struct ConsolidateOutputPackageBasesTask {
    state: ActionState,
    dir: PathBuf,
    layers: StabilityLayers,
    input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    pub pkgbases: Vec<OutputPackageBase>,
    pub current_pkgbases: Vec<String>,
    pub current_filenames: Vec<String>,
    pub current_package_names: Vec<String>,
    pub stale_filenames: Vec<String>,
    pub stale_package_names: Vec<String>,
}

impl ConsolidateOutputPackageBasesTask {
    pub fn new(
        dir: PathBuf,
        layers: StabilityLayers,
        input: InputSource<CreateOutputPackageBasesTask, OutputPackageBase>,
    ) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Management directory {} does not exist",
                dir.display()
            )));
        }
        if let InputSource::Direct(pkgbases) = &input {
            if pkgbases.is_empty() {
                return Err(Error::Config(
                    "Nothing to consolidate: no pkgbases and no task to pull them from"
                        .to_string(),
                ));
            }
        }
        Ok(Self {
            state: ActionState::NotStarted,
            dir,
            layers,
            input,
            pkgbases: Vec::new(),
            current_pkgbases: Vec::new(),
            current_filenames: Vec::new(),
            current_package_names: Vec::new(),
            stale_filenames: Vec::new(),
            stale_package_names: Vec::new(),
        })
    }

    /// A same-named pkgbase in a surrounding layer decides authority: a layer
    /// above with a same-or-newer version owns the pkgbase, a layer below
    /// must never be ahead of this tier
    fn check_stability_layers(&self, incoming: &[OutputPackageBase]) -> Result<()> {
        for pkgbase in incoming {
            let descriptor = pkgbase.descriptor_filename();

            for dir in &self.layers.above {
                let path = dir.join(&descriptor);
                if !path.is_file() {
                    continue;
                }
                let layered = OutputPackageBase::from_file(&path)?;
                if vercmp(&layered.version, &pkgbase.version).is_ge() {
                    return Err(Error::Package(format!(
                        "Pkgbase {} {} is owned by a layer above ({} in {})",
                        pkgbase.base,
                        pkgbase.version,
                        layered.version,
                        dir.display()
                    )));
                }
            }

            for dir in &self.layers.below {
                let path = dir.join(&descriptor);
                if !path.is_file() {
                    continue;
                }
                let layered = OutputPackageBase::from_file(&path)?;
                if vercmp(&layered.version, &pkgbase.version).is_gt() {
                    return Err(Error::Package(format!(
                        "Pkgbase {} {} is older than the more stable layer ({} in {})",
                        pkgbase.base,
                        pkgbase.version,
                        layered.version,
                        dir.display()
                    )));
                }
            }
        }
        Ok(())
    }

    fn on_disk_pkgbases(&self) -> Result<Vec<OutputPackageBase>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .iter()
            .map(|path| OutputPackageBase::from_file(path))
            .collect()
    }

    fn consolidate(&mut self, incoming: Vec<OutputPackageBase>) -> Result<()> {
        self.check_stability_layers(&incoming)?;

        let on_disk = self.on_disk_pkgbases()?;
        let mut current = incoming.clone();
        for pkgbase in &on_disk {
            let replaced = incoming.iter().any(|new| new.base == pkgbase.base);
            if replaced {
                // What the incoming pkgbase no longer provides is stale
                let new = incoming
                    .iter()
                    .find(|new| new.base == pkgbase.base)
                    .map(|new| (new.package_filenames(), new.package_names()))
                    .unwrap_or_default();
                for filename in pkgbase.package_filenames() {
                    if !new.0.contains(&filename) && !self.stale_filenames.contains(&filename) {
                        self.stale_filenames.push(filename);
                    }
                }
                for name in pkgbase.package_names() {
                    if !new.1.contains(&name) && !self.stale_package_names.contains(&name) {
                        self.stale_package_names.push(name);
                    }
                }
            } else {
                current.push(pkgbase.clone());
            }
        }

        for pkgbase in &current {
            if !self.current_pkgbases.contains(&pkgbase.base) {
                self.current_pkgbases.push(pkgbase.base.clone());
            }
            for filename in pkgbase.package_filenames() {
                if !self.current_filenames.contains(&filename) {
                    self.current_filenames.push(filename);
                }
            }
            for name in pkgbase.package_names() {
                if !self.current_package_names.contains(&name) {
                    self.current_package_names.push(name);
                }
            }
        }

        self.pkgbases = incoming;
        Ok(())
    }
}

impl Task for ConsolidateOutputPackageBasesTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }

        let Some(incoming) = self.input.resolve(|task| task.pkgbases.clone()) else {
            self.state = ActionState::FailedDependency;
            return self.state;
        };
        info!(
            "Consolidating {} pkgbases against {}",
            incoming.len(),
            self.dir.display()
        );

        self.state = match self.consolidate(incoming) {
            Ok(()) => ActionState::SuccessTask,
            Err(e) => {
                debug!("Consolidation failed: {e}");
                ActionState::FailedTask
            }
        };
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.pkgbases.clear();
        self.current_pkgbases.clear();
        self.current_filenames.clear();
        self.current_package_names.clear();
        self.stale_filenames.clear();
        self.stale_package_names.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}

/// Deletes `pkgnames/<name>.json` symlinks of packages no longer current
pub struct RemoveManagementRepoSymlinksTask {
    state: ActionState,
    dir: PathBuf,
    input: InputSource<ConsolidateOutputPackageBasesTask, String>,
    pub names: Vec<String>,
}

impl RemoveManagementRepoSymlinksTask {
    pub fn new(
        dir: PathBuf,
        input: InputSource<ConsolidateOutputPackageBasesTask, String>,
    ) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Management directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            state: ActionState::NotStarted,
            dir,
            input,
            names: Vec::new(),
        })
    }
}

impl Task for RemoveManagementRepoSymlinksTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }

        let Some(names) = self.input.resolve(|task| task.stale_package_names.clone()) else {
            self.state = ActionState::FailedDependency;
            return self.state;
        };

        for name in &names {
            let link = self.dir.join("pkgnames").join(format!("{name}.json"));
            match fs::remove_file(&link) {
                Ok(()) => debug!("Removed stale symlink {}", link.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!("Removing symlink {} failed: {e}", link.display());
                    self.state = ActionState::FailedTask;
                    return self.state;
                }
            }
        }

        self.names = names;
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        // Pruned symlinks are not recreated
        self.names.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}

/// Deletes package and signature symlinks of files no longer current
pub struct RemovePackageRepoSymlinksTask {
    state: ActionState,
    dir: PathBuf,
    input: InputSource<ConsolidateOutputPackageBasesTask, String>,
    pub filenames: Vec<String>,
}

impl RemovePackageRepoSymlinksTask {
    pub fn new(
        dir: PathBuf,
        input: InputSource<ConsolidateOutputPackageBasesTask, String>,
    ) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Package repository directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            state: ActionState::NotStarted,
            dir,
            input,
            filenames: Vec::new(),
        })
    }
}

impl Task for RemovePackageRepoSymlinksTask {
    fn state(&self) -> ActionState {
        self.state
    }

    fn run(&mut self) -> ActionState {
        if self.state.is_success() {
            return self.state;
        }

        let Some(filenames) = self.input.resolve(|task| task.stale_filenames.clone()) else {
            self.state = ActionState::FailedDependency;
            return self.state;
        };

        for filename in &filenames {
            for link in [
                self.dir.join(filename),
                self.dir.join(format!("{filename}.sig")),
            ] {
                match fs::remove_file(&link) {
                    Ok(()) => debug!("Removed stale symlink {}", link.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        debug!("Removing symlink {} failed: {e}", link.display());
                        self.state = ActionState::FailedTask;
                        return self.state;
                    }
                }
            }
        }

        self.filenames = filenames;
        self.state = ActionState::SuccessTask;
        self.state
    }

    fn undo(&mut self) -> ActionState {
        self.filenames.clear();
        self.state = ActionState::NotStarted;
        self.state
    }
}
