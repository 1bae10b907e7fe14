//! EFI System Partition image: one FAT32 volume filling the whole file.
//!
//! UEFI firmware loads `/EFI/BOOT/BOOTX64.EFI` directly, so there is no
//! partition table and no boot sector step.

use std::fs;
use std::path::PathBuf;

use super::boot_config::{self, BOOT_CONFIG_DEST};
use super::{Pipeline, Stage, StageError};
use crate::artifact::{self, ArtifactKind, ArtifactSet};
use crate::compress;
use crate::config::{BootConfigPolicy, Config};
use crate::disk::{allocate_image, populate, FatVolume, PopulateReport, VolumePlan};
use crate::layout::{efi_image_bytes, DEFAULT_EFI_IMAGE_MIB};
use crate::preflight::require_tools;
use crate::process::ToolInvoker;

/// Host tools the EFI build needs.
pub fn efi_tools(compress: bool) -> Vec<&'static str> {
    let mut tools = vec!["mformat", "mmd", "mcopy"];
    if compress {
        tools.push("gzip");
    }
    tools
}

#[derive(Debug, Clone)]
pub struct EfiOptions {
    /// Requested size in MiB, as given on the command line.
    pub size_mib: String,
    /// Output path; `BUILD_DIR/efi.fat` when unset.
    pub output: Option<PathBuf>,
    /// gzip the finished image in place.
    pub compress: bool,
}

impl Default for EfiOptions {
    fn default() -> Self {
        Self {
            size_mib: DEFAULT_EFI_IMAGE_MIB.to_string(),
            output: None,
            compress: true,
        }
    }
}

#[derive(Debug)]
pub struct EfiOutcome {
    pub output: PathBuf,
    /// FAT image size before compression.
    pub raw_bytes: u64,
    /// Size of the file on disk at the end of the build.
    pub final_bytes: u64,
    pub compressed: bool,
    pub boot_config_synthesized: bool,
    pub populate: PopulateReport,
    pub stages: Vec<Stage>,
}

/// Inputs of the EFI image.
pub fn efi_artifacts(config: &Config) -> ArtifactSet {
    let set = ArtifactSet::new()
        .file_from(ArtifactKind::LoaderEfi, config.limine_efi_candidates())
        .file(ArtifactKind::Kernel, &config.kernel_path)
        .file(ArtifactKind::KernelSymbols, &config.symbol_path);

    let set = match config.boot_config_policy {
        BootConfigPolicy::Require => set.file(ArtifactKind::BootConfig, &config.efi_boot_config),
        BootConfigPolicy::Synthesize => {
            set.optional_file(ArtifactKind::BootConfig, &config.efi_boot_config)
        }
    };

    let set = set.optional_dir(ArtifactKind::Modules, &config.modules_dir);
    match config.efi_extra_dir {
        Some(ref dir) => set.optional_dir(ArtifactKind::ExtraEfi, dir),
        None => set,
    }
}

/// Build the EFI FAT32 image.
pub fn build_efi_image(
    config: &Config,
    invoker: &dyn ToolInvoker,
    opts: &EfiOptions,
) -> Result<EfiOutcome, StageError> {
    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| config.default_efi_output());

    let mut pipeline = Pipeline::new(&output, config.on_failure);

    let (image_bytes, validated, boot_config) = pipeline.stage(Stage::Validate, || {
        let image_bytes = efi_image_bytes(&opts.size_mib)?;
        require_tools(invoker, &efi_tools(opts.compress))?;
        let validated = artifact::validate(&efi_artifacts(config))?;
        let boot_config = boot_config::resolve(&config.efi_boot_config, config.boot_config_policy)?;
        Ok((image_bytes, validated, boot_config))
    })?;

    let plan = pipeline.stage(Stage::SizeCompute, || {
        let mut plan = VolumePlan::new(&config.efi_label)
            .map(validated.path(ArtifactKind::LoaderEfi)?, "/EFI/BOOT/BOOTX64.EFI")
            .map(boot_config.path(), BOOT_CONFIG_DEST)
            .map(validated.path(ArtifactKind::Kernel)?, "/kernel.bin")
            .map(validated.path(ArtifactKind::KernelSymbols)?, "/kernel.sym");
        if let Some(modules) = validated.get(ArtifactKind::Modules) {
            plan = plan.optional_dir(&modules.path, "/modules");
        }
        if let Some(extra) = validated.get(ArtifactKind::ExtraEfi) {
            plan = plan.optional_dir(&extra.path, "/EFI/BOOT");
        }
        Ok(plan)
    })?;

    println!(">> Creating boot FS image: {}", output.display());
    pipeline.stage(Stage::Allocate, || allocate_image(&output, image_bytes))?;

    let volume = FatVolume::whole(&output).with_env(config.mtools_env(false));
    let report = pipeline.stage(Stage::FormatAndPopulate, || {
        populate(invoker, &volume, &plan)
    })?;

    if opts.compress {
        println!(">> Compressing image");
        pipeline.stage(Stage::Compress, || compress::compress_in_place(invoker, &output))?;
    }

    let final_bytes = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);

    Ok(EfiOutcome {
        output,
        raw_bytes: image_bytes,
        final_bytes,
        compressed: opts.compress,
        boot_config_synthesized: boot_config.is_synthesized(),
        populate: report,
        stages: pipeline.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    #[test]
    fn test_tools_depend_on_compression() {
        assert!(efi_tools(true).contains(&"gzip"));
        assert!(!efi_tools(false).contains(&"gzip"));
    }

    #[test]
    fn test_artifact_set_respects_policy() {
        let base = Path::new("/w");
        let config = Config::from_vars(base, &HashMap::new()).unwrap();
        let required: Vec<_> = efi_artifacts(&config)
            .iter()
            .filter(|a| a.required)
            .map(|a| a.kind)
            .collect();
        assert!(required.contains(&ArtifactKind::BootConfig));
        assert!(required.contains(&ArtifactKind::KernelSymbols));
        assert!(!required.contains(&ArtifactKind::Modules));

        let vars: HashMap<String, String> =
            [("BOOT_CONFIG_POLICY".to_string(), "synthesize".to_string())].into();
        let config = Config::from_vars(base, &vars).unwrap();
        assert!(efi_artifacts(&config)
            .iter()
            .any(|a| a.kind == ArtifactKind::BootConfig && !a.required));
    }
}
