//! rrimage - Retro Rocket boot image builder.
//!
//! Produces two kinds of bootable images:
//! - EFI System Partition image (FAT32, UEFI only, optionally gzipped)
//! - Hybrid USB disk image (MBR + FAT32 partition + Limine BIOS stage)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rrimage::build::{EfiOptions, UsbOptions};
use rrimage::commands;
use rrimage::config::Config;
use rrimage::layout::DEFAULT_EFI_IMAGE_MIB;

#[derive(Parser)]
#[command(name = "rrimage")]
#[command(about = "Retro Rocket boot image builder")]
#[command(
    after_help = "QUICK START:
  rrimage preflight  Check tools and inputs
  rrimage efi        Build the EFI boot image
  rrimage usb        Build the hybrid USB image"
)]
struct Cli {
    /// Show debug output from every stage and tool invocation
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the EFI System Partition image (FAT32)
    Efi {
        /// Image size in MiB (minimum 8)
        #[arg(value_name = "SIZE_MIB", default_value_t = DEFAULT_EFI_IMAGE_MIB.to_string())]
        size_mib: String,

        /// Output path (default: $BUILD_DIR/efi.fat)
        #[arg(value_name = "OUTPUT_IMG")]
        output: Option<PathBuf>,

        /// Leave the FAT image uncompressed
        #[arg(long)]
        no_compress: bool,
    },

    /// Build the hybrid BIOS/UEFI USB image
    Usb {
        /// Run make in the Limine checkout first
        #[arg(long)]
        build_loader: bool,

        /// Output path (default: $USB_OUTPUT)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run preflight checks (verify tools and inputs before a build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show the USB layout for the current inputs (writes no image)
    Layout,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env may set RUST_LOG
    dotenvy::dotenv().ok();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let base_dir = std::env::current_dir().context("failed to read current directory")?;
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Efi {
            size_mib,
            output,
            no_compress,
        } => {
            let opts = EfiOptions {
                size_mib,
                output,
                compress: !no_compress,
            };
            commands::cmd_build_efi(&config, &opts)?;
        }

        Commands::Usb {
            build_loader,
            output,
        } => {
            let opts = UsbOptions {
                build_loader,
                output,
            };
            commands::cmd_build_usb(&config, &opts)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Layout => commands::show::ShowTarget::Layout,
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}
