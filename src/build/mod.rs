//! Image build pipelines.
//!
//! Both variants run as a strict forward sequence of [`Stage`]s. A stage
//! starts only after the previous one succeeded; the first error aborts
//! the build. Nothing before [`Stage::Allocate`] writes to the output
//! path, so input and tool problems never leave a partial image.
//!
//! - `efi`: single FAT32 volume filling the whole file (UEFI only)
//! - `usb`: MBR + FAT32 partition + Limine BIOS stage (hybrid BIOS/UEFI)

pub mod boot_config;
pub mod efi;
pub mod loader;
pub mod usb;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::FailurePolicy;
use crate::error::BuildError;
use crate::timing::Timer;

pub use efi::{build_efi_image, efi_artifacts, EfiOptions, EfiOutcome};
pub use usb::{build_usb_image, compute_usb_layout, usb_artifacts, UsbOptions, UsbOutcome};

/// Pipeline states. The USB build runs them in declaration order; the EFI
/// build compresses last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    BuildLoader,
    Validate,
    SizeCompute,
    Compress,
    Allocate,
    PartitionWrite,
    FormatAndPopulate,
    InstallBootSector,
    Done,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildLoader => "build loader",
            Self::Validate => "validate",
            Self::SizeCompute => "size compute",
            Self::Compress => "compress",
            Self::Allocate => "allocate",
            Self::PartitionWrite => "partition write",
            Self::FormatAndPopulate => "format and populate",
            Self::InstallBootSector => "install boot sector",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A build aborted in `stage`.
#[derive(Debug, Error)]
#[error("{stage}: {error}")]
pub struct StageError {
    pub stage: Stage,
    pub error: BuildError,
}

/// Drives stages in order and applies the failure policy.
pub(crate) struct Pipeline {
    output: PathBuf,
    on_failure: FailurePolicy,
    image_created: bool,
    completed: Vec<Stage>,
}

impl Pipeline {
    pub fn new(output: &Path, on_failure: FailurePolicy) -> Self {
        Self {
            output: output.to_path_buf(),
            on_failure,
            image_created: false,
            completed: Vec::new(),
        }
    }

    /// Run one stage; an error aborts the build.
    pub fn stage<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> Result<T, BuildError>,
    ) -> Result<T, StageError> {
        info!(stage = %stage, "entering stage");
        let timer = Timer::start(stage.name());

        match f() {
            Ok(value) => {
                timer.finish();
                if stage == Stage::Allocate {
                    self.image_created = true;
                }
                self.completed.push(stage);
                Ok(value)
            }
            Err(error) => {
                // Allocation may have created the file before failing.
                if stage >= Stage::Allocate {
                    self.image_created = true;
                }
                self.abort();
                Err(StageError { stage, error })
            }
        }
    }

    #[cfg(test)]
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    pub fn finish(mut self) -> Vec<Stage> {
        self.completed.push(Stage::Done);
        self.completed
    }

    fn abort(&self) {
        if !self.image_created {
            return;
        }
        let path = self.output.display();
        match self.on_failure {
            FailurePolicy::Keep => info!(%path, "partial image left for inspection"),
            FailurePolicy::Remove => match fs::remove_file(&self.output) {
                Ok(()) => info!(%path, "removed partial image"),
                Err(e) => warn!(%path, error = %e, "failed to remove partial image"),
            },
        }
    }
}
