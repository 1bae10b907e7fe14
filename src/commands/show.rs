//! Show command - displays configuration and the USB layout.

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::artifact::{self, ArtifactKind};
use crate::build::boot_config;
use crate::build::usb::{compute_usb_layout, usb_artifacts};
use crate::compress;
use crate::config::Config;
use crate::process::SystemInvoker;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the USB layout for the current inputs
    Layout,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Layout => show_layout(config)?,
    }
    Ok(())
}

/// Compute the USB layout without touching the output image.
///
/// The root payload is compressed into a scratch directory, since its
/// compressed size drives the partition size.
fn show_layout(config: &Config) -> Result<()> {
    let validated = artifact::validate(&usb_artifacts(config))?;
    let boot_config = boot_config::resolve(&config.usb_boot_config, config.boot_config_policy)?;

    let scratch = TempDir::new().context("failed to create scratch directory")?;
    let root_gz = scratch.path().join("root.iso.gz");
    compress::compress_to(&SystemInvoker, validated.path(ArtifactKind::RootImage)?, &root_gz)?;

    let layout = compute_usb_layout(config, &validated, boot_config.path(), &root_gz)?;

    println!("USB layout:");
    println!("  Sector size:      {}", layout.sector_size);
    println!("  Payload:          {} bytes", layout.payload_bytes);
    println!(
        "  Partition:        {} bytes ({} sectors)",
        layout.partition_bytes, layout.partition_sectors
    );
    println!("  Partition start:  LBA {} (offset {})", layout.start_lba, layout.partition_offset());
    println!(
        "  Image:            {} bytes ({} MiB, {} sectors)",
        layout.image_bytes,
        layout.image_mib(),
        layout.total_sectors
    );
    Ok(())
}
