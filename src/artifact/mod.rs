//! Build inputs and their existence rules.
//!
//! An [`ArtifactSet`] names every input a build variant consumes. The
//! [`validate`] pass runs before the output image is created or
//! truncated, so a missing input never leaves a partial image behind.

mod validate;

pub use validate::{validate, ResolvedArtifact, ValidatedArtifacts};

use std::fmt;
use std::path::PathBuf;

/// The role an input file plays in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Limine UEFI binary, lands at `/EFI/BOOT/BOOTX64.EFI`.
    LoaderEfi,
    /// Limine BIOS stage file (`limine-bios.sys`).
    LoaderBiosStage,
    /// Host-side `limine` executable used for `bios-install`.
    LoaderInstaller,
    Kernel,
    KernelSymbols,
    BootConfig,
    /// Uncompressed root filesystem payload.
    RootImage,
    /// Optional directory of kernel modules.
    Modules,
    /// Optional directory of extra EFI payloads.
    ExtraEfi,
}

impl ArtifactKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::LoaderEfi => "Limine UEFI loader (BOOTX64.EFI)",
            Self::LoaderBiosStage => "Limine BIOS stage (limine-bios.sys)",
            Self::LoaderInstaller => "Limine installer",
            Self::Kernel => "kernel",
            Self::KernelSymbols => "kernel symbols",
            Self::BootConfig => "boot configuration",
            Self::RootImage => "root filesystem image",
            Self::Modules => "modules directory",
            Self::ExtraEfi => "extra EFI payload directory",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// What must exist at an artifact's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    File,
    /// Regular file with an execute bit set.
    Executable,
    Dir,
}

/// One declared input.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Locations to try, in order. The first that exists wins.
    pub candidates: Vec<PathBuf>,
    pub shape: Shape,
    pub required: bool,
}

/// Inputs for one build invocation.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mandatory regular file.
    pub fn file(self, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        self.push(kind, vec![path.into()], Shape::File, true)
    }

    /// A mandatory file found at the first existing candidate.
    pub fn file_from(self, kind: ArtifactKind, candidates: Vec<PathBuf>) -> Self {
        self.push(kind, candidates, Shape::File, true)
    }

    /// A mandatory executable.
    pub fn executable(self, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        self.push(kind, vec![path.into()], Shape::Executable, true)
    }

    /// A file that is used if present.
    pub fn optional_file(self, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        self.push(kind, vec![path.into()], Shape::File, false)
    }

    /// A directory that is used if present.
    pub fn optional_dir(self, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        self.push(kind, vec![path.into()], Shape::Dir, false)
    }

    fn push(
        mut self,
        kind: ArtifactKind,
        candidates: Vec<PathBuf>,
        shape: Shape,
        required: bool,
    ) -> Self {
        self.artifacts.push(Artifact {
            kind,
            candidates,
            shape,
            required,
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
