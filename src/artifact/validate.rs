//! Existence checks for an [`ArtifactSet`].

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Artifact, ArtifactKind, ArtifactSet, Shape};
use crate::error::{BuildError, IoContext, Result};

/// An artifact whose location has been confirmed.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl ResolvedArtifact {
    /// Byte size, read on demand.
    pub fn size(&self) -> Result<u64> {
        let meta = fs::metadata(&self.path)
            .io_context(|| format!("failed to stat {}", self.path.display()))?;
        Ok(meta.len())
    }
}

/// Every mandatory artifact present, optional ones resolved if found.
#[derive(Debug, Clone, Default)]
pub struct ValidatedArtifacts {
    resolved: HashMap<ArtifactKind, ResolvedArtifact>,
}

impl ValidatedArtifacts {
    pub fn get(&self, kind: ArtifactKind) -> Option<&ResolvedArtifact> {
        self.resolved.get(&kind)
    }

    /// Path of an artifact that was declared and found.
    pub fn path(&self, kind: ArtifactKind) -> Result<&Path> {
        self.get(kind)
            .map(|a| a.path.as_path())
            .ok_or_else(|| BuildError::Validation(format!("{} was not resolved", kind)))
    }

    pub fn size(&self, kind: ArtifactKind) -> Result<u64> {
        match self.get(kind) {
            Some(artifact) => artifact.size(),
            None => Err(BuildError::Validation(format!("{} was not resolved", kind))),
        }
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.resolved.contains_key(&kind)
    }
}

/// Confirm every mandatory artifact exists.
///
/// Fails on the first missing mandatory artifact, naming the path that was
/// expected. Touches nothing on disk.
pub fn validate(set: &ArtifactSet) -> Result<ValidatedArtifacts> {
    let mut resolved = HashMap::new();

    for artifact in set.iter() {
        match artifact.locate() {
            Some(path) => {
                debug!(kind = %artifact.kind, path = %path.display(), "artifact found");
                resolved.insert(
                    artifact.kind,
                    ResolvedArtifact {
                        kind: artifact.kind,
                        path,
                    },
                );
            }
            None if artifact.required => return Err(artifact.missing()),
            None => {
                debug!(kind = %artifact.kind, "optional artifact absent");
            }
        }
    }

    Ok(ValidatedArtifacts { resolved })
}

impl Artifact {
    /// First candidate with the right shape.
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates
            .iter()
            .find(|p| matches_shape(p, self.shape))
            .cloned()
    }

    /// Error naming the expected path and any other searched locations.
    pub fn missing(&self) -> BuildError {
        let path = self.candidates.first().cloned().unwrap_or_default();
        let mut what = self.kind.describe().to_string();
        if self.shape == Shape::Executable && path.is_file() {
            what.push_str(" (not executable)");
        }
        if self.candidates.len() > 1 {
            let others: Vec<String> = self.candidates[1..]
                .iter()
                .map(|p| format!("'{}'", p.display()))
                .collect();
            return BuildError::missing_artifact(
                format!("{} (also searched {})", what, others.join(", ")),
                path,
            );
        }
        BuildError::missing_artifact(what, path)
    }
}

fn matches_shape(path: &Path, shape: Shape) -> bool {
    match shape {
        Shape::File => path.is_file(),
        Shape::Dir => path.is_dir(),
        Shape::Executable => fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_all_present() {
        let dir = TempDir::new().unwrap();
        let kernel = dir.path().join("kernel.bin");
        let sym = dir.path().join("kernel.sym");
        fs::write(&kernel, vec![0u8; 1000]).unwrap();
        fs::write(&sym, b"syms").unwrap();

        let set = ArtifactSet::new()
            .file(ArtifactKind::Kernel, &kernel)
            .file(ArtifactKind::KernelSymbols, &sym);
        let validated = validate(&set).unwrap();

        assert_eq!(validated.path(ArtifactKind::Kernel).unwrap(), kernel);
        assert_eq!(validated.size(ArtifactKind::Kernel).unwrap(), 1000);
        assert_eq!(validated.size(ArtifactKind::KernelSymbols).unwrap(), 4);
    }

    #[test]
    fn test_first_missing_is_reported() {
        let dir = TempDir::new().unwrap();
        let kernel = dir.path().join("kernel.bin");
        fs::write(&kernel, b"k").unwrap();
        let sym = dir.path().join("kernel.sym");
        let cfg = dir.path().join("limine.conf");

        let set = ArtifactSet::new()
            .file(ArtifactKind::Kernel, &kernel)
            .file(ArtifactKind::KernelSymbols, &sym)
            .file(ArtifactKind::BootConfig, &cfg);

        match validate(&set).unwrap_err() {
            BuildError::MissingArtifact { path, what } => {
                assert_eq!(path, sym);
                assert_eq!(what, "kernel symbols");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_candidates_searched_in_order() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("EFI/BOOT/BOOTX64.EFI");
        let flat = dir.path().join("BOOTX64.EFI");
        fs::write(&flat, b"efi").unwrap();

        let set = ArtifactSet::new()
            .file_from(ArtifactKind::LoaderEfi, vec![nested.clone(), flat.clone()]);
        assert_eq!(validate(&set).unwrap().path(ArtifactKind::LoaderEfi).unwrap(), flat);

        fs::create_dir_all(nested.parent().unwrap()).unwrap();
        fs::write(&nested, b"efi").unwrap();
        assert_eq!(validate(&set).unwrap().path(ArtifactKind::LoaderEfi).unwrap(), nested);
    }

    #[test]
    fn test_missing_candidates_listed() {
        let set = ArtifactSet::new().file_from(
            ArtifactKind::LoaderEfi,
            vec![PathBuf::from("/nope/EFI/BOOT/BOOTX64.EFI"), PathBuf::from("/nope/BOOTX64.EFI")],
        );
        let msg = validate(&set).unwrap_err().to_string();
        assert!(msg.contains("/nope/EFI/BOOT/BOOTX64.EFI"));
        assert!(msg.contains("also searched '/nope/BOOTX64.EFI'"));
    }

    #[test]
    fn test_optional_absent_is_fine() {
        let set = ArtifactSet::new().optional_dir(ArtifactKind::Modules, "/nonexistent/modules");
        let validated = validate(&set).unwrap();
        assert!(!validated.contains(ArtifactKind::Modules));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let set = ArtifactSet::new().file(ArtifactKind::Kernel, dir.path());
        assert!(matches!(validate(&set), Err(BuildError::MissingArtifact { .. })));
    }

    #[test]
    fn test_executable_requires_mode_bit() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("limine");
        fs::write(&bin, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o644)).unwrap();

        let set = ArtifactSet::new().executable(ArtifactKind::LoaderInstaller, &bin);
        let msg = validate(&set).unwrap_err().to_string();
        assert!(msg.contains("not executable"));

        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(validate(&set).is_ok());
    }
}
