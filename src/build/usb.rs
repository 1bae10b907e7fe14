//! Hybrid BIOS/UEFI USB image.
//!
//! Layout: MBR with one bootable `ef` partition at LBA 2048 holding a
//! FAT32 volume with the Limine UEFI binary, the Limine BIOS stage, the
//! kernel and its symbols, the gzipped root filesystem and the boot
//! config. `limine bios-install` then embeds the BIOS bootstrap.
//!
//! The compressed root payload size feeds the partition size, so
//! compression runs before the layout is computed.

use std::fs;
use std::path::{Path, PathBuf};

use super::boot_config::{self, BOOT_CONFIG_DEST};
use super::loader;
use super::{Pipeline, Stage, StageError};
use crate::artifact::{self, ArtifactKind, ArtifactSet, ValidatedArtifacts};
use crate::compress;
use crate::config::{BootConfigPolicy, Config};
use crate::disk::{
    allocate_image, install_bios_boot_sector, populate, write_partition_table, FatVolume,
    PartitionEntry, PartitionTable, PopulateReport, VolumePlan,
};
use crate::error::{IoContext, Result};
use crate::layout::{ImageLayout, SizeCalculator};
use crate::preflight::require_tools;
use crate::process::ToolInvoker;

/// Host tools the USB build needs. The Limine installer is an artifact.
pub const USB_TOOLS: [&str; 5] = ["gzip", "sfdisk", "mformat", "mmd", "mcopy"];

#[derive(Debug, Clone, Default)]
pub struct UsbOptions {
    /// Run `make` in the Limine checkout first.
    pub build_loader: bool,
    /// Output path; `USB_OUTPUT` when unset.
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct UsbOutcome {
    pub output: PathBuf,
    pub layout: ImageLayout,
    pub root_gz: PathBuf,
    pub boot_config_synthesized: bool,
    pub populate: PopulateReport,
    pub stages: Vec<Stage>,
}

/// Inputs of the USB image.
pub fn usb_artifacts(config: &Config) -> ArtifactSet {
    let set = ArtifactSet::new()
        .file(ArtifactKind::RootImage, &config.root_image)
        .file(ArtifactKind::Kernel, &config.kernel_path)
        .file(ArtifactKind::KernelSymbols, &config.symbol_path)
        .file_from(ArtifactKind::LoaderEfi, config.limine_efi_candidates())
        .file(ArtifactKind::LoaderBiosStage, config.limine_bios_stage())
        .executable(ArtifactKind::LoaderInstaller, config.limine_installer());

    match config.boot_config_policy {
        BootConfigPolicy::Require => set.file(ArtifactKind::BootConfig, &config.usb_boot_config),
        BootConfigPolicy::Synthesize => {
            set.optional_file(ArtifactKind::BootConfig, &config.usb_boot_config)
        }
    }
}

/// Compressed root payload, written next to the USB image.
pub fn root_gz_path(output: &Path) -> PathBuf {
    output.with_file_name("root.iso.gz")
}

/// Partition layout for the current inputs.
///
/// The partition is sized for the kernel, its symbols, the boot config and
/// the compressed root payload, plus the loader reserve and headroom.
pub fn compute_usb_layout(
    config: &Config,
    validated: &ValidatedArtifacts,
    boot_config: &Path,
    root_gz: &Path,
) -> Result<ImageLayout> {
    let sizes = [
        validated.size(ArtifactKind::Kernel)?,
        validated.size(ArtifactKind::KernelSymbols)?,
        file_size(boot_config)?,
        file_size(root_gz)?,
    ];
    SizeCalculator::new(config.headroom_mib).compute(sizes)
}

fn file_size(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).io_context(|| format!("failed to stat {}", path.display()))?;
    Ok(meta.len())
}

/// Volume contents, in copy order.
fn usb_plan(
    config: &Config,
    validated: &ValidatedArtifacts,
    boot_config: &Path,
    root_gz: &Path,
) -> Result<VolumePlan> {
    Ok(VolumePlan::new(&config.usb_label)
        .map(validated.path(ArtifactKind::LoaderEfi)?, "/EFI/BOOT/BOOTX64.EFI")
        .map(validated.path(ArtifactKind::LoaderBiosStage)?, "/limine-bios.sys")
        .map(validated.path(ArtifactKind::Kernel)?, "/kernel.bin")
        .map(validated.path(ArtifactKind::KernelSymbols)?, "/kernel.sym")
        .map(root_gz, "/root.iso.gz")
        .map(boot_config, BOOT_CONFIG_DEST))
}

/// Build the USB image.
pub fn build_usb_image(
    config: &Config,
    invoker: &dyn ToolInvoker,
    opts: &UsbOptions,
) -> std::result::Result<UsbOutcome, StageError> {
    let output = opts.output.clone().unwrap_or_else(|| config.usb_output.clone());
    let root_gz = root_gz_path(&output);

    let mut pipeline = Pipeline::new(&output, config.on_failure);

    if opts.build_loader {
        pipeline.stage(Stage::BuildLoader, || {
            require_tools(invoker, &["make"])?;
            loader::build_loader(invoker, &config.limine_dir)
        })?;
    }

    let (validated, boot_config) = pipeline.stage(Stage::Validate, || {
        require_tools(invoker, &USB_TOOLS)?;
        let validated = artifact::validate(&usb_artifacts(config))?;
        let boot_config = boot_config::resolve(&config.usb_boot_config, config.boot_config_policy)?;
        Ok((validated, boot_config))
    })?;

    println!(">> Compressing root filesystem -> {}", root_gz.display());
    pipeline.stage(Stage::Compress, || {
        if let Some(dir) = root_gz.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .io_context(|| format!("failed to create {}", dir.display()))?;
        }
        compress::compress_to(invoker, validated.path(ArtifactKind::RootImage)?, &root_gz)
    })?;

    let (layout, plan) = pipeline.stage(Stage::SizeCompute, || {
        let layout = compute_usb_layout(config, &validated, boot_config.path(), &root_gz)?;
        let plan = usb_plan(config, &validated, boot_config.path(), &root_gz)?;
        Ok((layout, plan))
    })?;
    println!(
        ">> Layout: {} bytes, partition {} sectors at LBA {}",
        layout.image_bytes, layout.partition_sectors, layout.start_lba
    );

    println!(">> Creating image: {}", output.display());
    pipeline.stage(Stage::Allocate, || allocate_image(&output, layout.image_bytes))?;

    println!(">> Writing partition table");
    let table = PartitionTable::dos(PartitionEntry::bootable_esp(&layout));
    pipeline.stage(Stage::PartitionWrite, || {
        write_partition_table(invoker, &output, &table)
    })?;

    let volume = FatVolume::at_offset(&output, layout.partition_offset())
        .with_env(config.mtools_env(true));
    let report = pipeline.stage(Stage::FormatAndPopulate, || {
        populate(invoker, &volume, &plan)
    })?;

    println!(">> Installing BIOS boot sector");
    pipeline.stage(Stage::InstallBootSector, || {
        let installer = validated.path(ArtifactKind::LoaderInstaller)?;
        install_bios_boot_sector(invoker, installer, &output)
    })?;

    Ok(UsbOutcome {
        output,
        layout,
        root_gz,
        boot_config_synthesized: boot_config.is_synthesized(),
        populate: report,
        stages: pipeline.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_usb_artifacts_require_installer_executable() {
        let config = Config::from_vars(Path::new("/w"), &HashMap::new()).unwrap();
        let set = usb_artifacts(&config);
        let installer = set
            .iter()
            .find(|a| a.kind == ArtifactKind::LoaderInstaller)
            .unwrap();
        assert!(installer.required);
        assert_eq!(installer.shape, crate::artifact::Shape::Executable);
        assert_eq!(set.len(), 7);
    }

    #[test]
    fn test_root_gz_sits_next_to_output() {
        assert_eq!(
            root_gz_path(Path::new("/out/usb.img")),
            PathBuf::from("/out/root.iso.gz")
        );
        assert_eq!(root_gz_path(Path::new("usb.img")), PathBuf::from("root.iso.gz"));
    }
}
