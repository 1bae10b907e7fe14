//! Build command - builds the EFI or USB image.

use anyhow::Result;
use std::time::Instant;

use crate::build::{self, EfiOptions, UsbOptions};
use crate::config::Config;
use crate::layout::MIB;
use crate::process::SystemInvoker;

/// Build the EFI System Partition image.
pub fn cmd_build_efi(config: &Config, opts: &EfiOptions) -> Result<()> {
    println!("=== EFI Boot Image ===\n");
    let start = Instant::now();

    let outcome = build::build_efi_image(config, &SystemInvoker, opts)?;

    if outcome.boot_config_synthesized {
        println!("  (boot config synthesized, no config file found)");
    }
    println!("\n=== Image Ready ===");
    println!("  Output: {}", outcome.output.display());
    println!("  Volume: {} MiB", outcome.raw_bytes / MIB);
    if outcome.compressed {
        println!("  Size:   {} (gzip)", format_mib(outcome.final_bytes));
    }
    println!(
        "  Files:  {} copied, {} directories",
        outcome.populate.files_copied, outcome.populate.directories_created
    );
    println!("  Time:   {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Build the hybrid BIOS/UEFI USB image.
pub fn cmd_build_usb(config: &Config, opts: &UsbOptions) -> Result<()> {
    println!("=== USB Boot Image ===\n");
    let start = Instant::now();

    let outcome = build::build_usb_image(config, &SystemInvoker, opts)?;

    if outcome.boot_config_synthesized {
        println!("  (boot config synthesized, no config file found)");
    }
    println!("\n=== Image Ready ===");
    println!("  Output:    {}", outcome.output.display());
    println!("  Size:      {} MiB", outcome.layout.image_mib());
    println!(
        "  Partition: {} sectors at LBA {}",
        outcome.layout.partition_sectors, outcome.layout.start_lba
    );
    println!("  Root:      {}", outcome.root_gz.display());
    println!("  Time:      {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

pub(crate) fn format_mib(bytes: u64) -> String {
    format!("{:.1} MiB", bytes as f64 / MIB as f64)
}
