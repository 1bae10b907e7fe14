//! Format a FAT32 volume and fill it from a file mapping.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::mtools::FatVolume;
use crate::error::{BuildError, IoContext, Result};
use crate::process::ToolInvoker;

/// A host file and where it lands inside the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub source: PathBuf,
    /// Absolute volume path, e.g. `/EFI/BOOT/BOOTX64.EFI`.
    pub dest: String,
}

impl FileMapping {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

/// A host directory copied recursively if it exists and is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalDir {
    pub source: PathBuf,
    pub dest: String,
}

/// Everything that goes into one FAT volume.
#[derive(Debug, Clone, Default)]
pub struct VolumePlan {
    pub label: String,
    pub mappings: Vec<FileMapping>,
    pub optional_dirs: Vec<OptionalDir>,
}

impl VolumePlan {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn map(mut self, source: impl Into<PathBuf>, dest: impl Into<String>) -> Self {
        self.mappings.push(FileMapping::new(source, dest));
        self
    }

    pub fn optional_dir(mut self, source: impl Into<PathBuf>, dest: impl Into<String>) -> Self {
        self.optional_dirs.push(OptionalDir {
            source: source.into(),
            dest: dest.into(),
        });
        self
    }

    /// Parent directories the mappings need, shallowest first, no repeats.
    pub fn directories(&self) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        for mapping in &self.mappings {
            for dir in parents(&mapping.dest) {
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
        dirs
    }
}

/// What ended up in the volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub files_copied: usize,
    pub directories_created: usize,
    /// Optional directories that were absent or empty.
    pub skipped: Vec<PathBuf>,
}

/// Format `volume` and copy `plan` into it.
///
/// Every mapping source is checked before the format, so a missing input
/// fails without touching the image.
pub fn populate(
    invoker: &dyn ToolInvoker,
    volume: &FatVolume,
    plan: &VolumePlan,
) -> Result<PopulateReport> {
    for mapping in &plan.mappings {
        if !mapping.source.is_file() {
            return Err(BuildError::missing_artifact(
                format!("source for {}", mapping.dest),
                &mapping.source,
            ));
        }
    }

    let mut report = PopulateReport::default();

    println!(">> Formatting FAT32 with label '{}'", plan.label);
    volume.format(invoker, &plan.label)?;

    let dirs = plan.directories();
    if !dirs.is_empty() {
        println!(">> Creating directory structure");
    }
    for dir in &dirs {
        volume.mkdir(invoker, dir)?;
        report.directories_created += 1;
    }

    println!(">> Copying files");
    for mapping in &plan.mappings {
        debug!(src = %mapping.source.display(), dest = %mapping.dest, "copy");
        volume.copy(invoker, &mapping.source, &mapping.dest)?;
        report.files_copied += 1;
    }

    for opt in &plan.optional_dirs {
        copy_optional_dir(invoker, volume, opt, &dirs, &mut report)?;
    }

    Ok(report)
}

fn copy_optional_dir(
    invoker: &dyn ToolInvoker,
    volume: &FatVolume,
    opt: &OptionalDir,
    existing: &[String],
    report: &mut PopulateReport,
) -> Result<()> {
    if !opt.source.is_dir() {
        debug!(dir = %opt.source.display(), "optional directory absent");
        report.skipped.push(opt.source.clone());
        return Ok(());
    }

    let files = list_files(&opt.source)?;
    if files.is_empty() {
        warn!(dir = %opt.source.display(), "optional directory is empty, skipping");
        report.skipped.push(opt.source.clone());
        return Ok(());
    }

    println!(">> Copying {} -> {}", opt.source.display(), opt.dest);
    let mut created: Vec<String> = existing.to_vec();
    for rel in files {
        let dest = join_volume_path(&opt.dest, &rel);
        for dir in parents(&dest) {
            if !created.contains(&dir) {
                volume.mkdir(invoker, &dir)?;
                report.directories_created += 1;
                created.push(dir);
            }
        }
        volume.copy(invoker, &opt.source.join(&rel), &dest)?;
        report.files_copied += 1;
    }
    Ok(())
}

/// Regular files under `root`, as sorted relative paths.
fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).display().to_string();
            BuildError::io(
                format!("failed to read {}", path),
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory loop")),
            )
        })?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .map_err(std::io::Error::other)
                .io_context(|| format!("bad path under {}", root.display()))?;
            files.push(rel);
        }
    }
    Ok(files)
}

fn join_volume_path(base: &str, rel: &Path) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for part in rel.components() {
        out.push('/');
        out.push_str(&part.as_os_str().to_string_lossy());
    }
    out
}

/// `/a/b/c.txt` -> [`/a`, `/a/b`].
fn parents(dest: &str) -> Vec<String> {
    let parts: Vec<&str> = dest.split('/').filter(|p| !p.is_empty()).collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        current.push('/');
        current.push_str(part);
        out.push(current.clone());
    }
    out
}
