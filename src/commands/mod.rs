//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build the EFI or USB image
//! - `show` - Display configuration and computed layout
//! - `preflight` - Run preflight checks

pub mod build;
mod preflight;
pub mod show;

pub use build::{cmd_build_efi, cmd_build_usb};
pub use preflight::cmd_preflight;
pub use show::cmd_show;
