//! Rebuild the Limine host tools before a USB build.

use std::path::Path;

use crate::error::Result;
use crate::process::{Cmd, ToolInvoker};

/// Make variables inherited from an outer make that break Limine's build.
const SCRUBBED_MAKE_VARS: [&str; 3] = ["MAKEFLAGS", "MFLAGS", "MAKELEVEL"];

pub fn build_loader_command(limine_dir: &Path) -> Cmd {
    let mut cmd = Cmd::new("make").arg("-j1").dir(limine_dir);
    for var in SCRUBBED_MAKE_VARS {
        cmd = cmd.env_remove(var);
    }
    cmd
}

/// Run `make` in the Limine checkout.
///
/// Whether the installer came out executable is checked by the
/// validation stage that follows.
pub fn build_loader(invoker: &dyn ToolInvoker, limine_dir: &Path) -> Result<()> {
    println!(">> Building Limine in {}", limine_dir.display());
    build_loader_command(limine_dir).run_with(invoker)?;
    Ok(())
}
