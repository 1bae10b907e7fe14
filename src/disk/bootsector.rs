//! Legacy BIOS boot sector installation.

use std::path::Path;

use crate::error::Result;
use crate::process::{Cmd, ToolInvoker};

/// `limine bios-install <image>` as a command.
pub fn bios_install_command(installer: &Path, image: &Path) -> Cmd {
    Cmd::new(installer.to_string_lossy())
        .arg("bios-install")
        .arg_path(image)
}

/// Embed the Limine BIOS bootstrap into a finished image.
///
/// Must run after the partition table is written and the volume is
/// populated: the installer records where `limine-bios.sys` lives.
pub fn install_bios_boot_sector(
    invoker: &dyn ToolInvoker,
    installer: &Path,
    image: &Path,
) -> Result<()> {
    bios_install_command(installer, image).run_with(invoker)?;
    Ok(())
}
