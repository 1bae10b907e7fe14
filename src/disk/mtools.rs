//! mtools operations on a FAT volume inside an image file.
//!
//! mtools addresses a volume that starts part-way into a file with the
//! `image@@offset` syntax, which is how the USB image's partition is
//! formatted and filled without a loop device or root.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::process::{Cmd, ToolInvoker};

/// A FAT volume at a byte offset within an image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatVolume {
    image: PathBuf,
    offset: u64,
    env: Vec<(String, String)>,
}

impl FatVolume {
    /// A volume occupying the whole file.
    pub fn whole(image: &Path) -> Self {
        Self::at_offset(image, 0)
    }

    pub fn at_offset(image: &Path, offset: u64) -> Self {
        Self {
            image: image.to_path_buf(),
            offset,
            env: Vec::new(),
        }
    }

    /// Environment passed to every mtools call (e.g. `MTOOLS_SKIP_CHECK`).
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The `-i` argument for mtools.
    pub fn device_spec(&self) -> String {
        if self.offset == 0 {
            self.image.to_string_lossy().into_owned()
        } else {
            format!("{}@@{}", self.image.display(), self.offset)
        }
    }

    fn tool(&self, program: &str) -> Cmd {
        Cmd::new(program)
            .arg("-i")
            .arg(self.device_spec())
            .envs(&self.env)
    }

    /// Create a FAT32 filesystem labelled `label`.
    pub fn format(&self, invoker: &dyn ToolInvoker, label: &str) -> Result<()> {
        self.tool("mformat")
            .args(["-F", "-v", label, "::"])
            .run_with(invoker)?;
        Ok(())
    }

    /// Create a directory. `dir` is an absolute volume path like `/EFI/BOOT`.
    pub fn mkdir(&self, invoker: &dyn ToolInvoker, dir: &str) -> Result<()> {
        self.tool("mmd").arg(target(dir)).run_with(invoker)?;
        Ok(())
    }

    /// Copy a host file to `dest`, overwriting any existing file there.
    pub fn copy(&self, invoker: &dyn ToolInvoker, src: &Path, dest: &str) -> Result<()> {
        self.tool("mcopy")
            .arg("-o")
            .arg_path(src)
            .arg(target(dest))
            .run_with(invoker)?;
        Ok(())
    }
}

/// `::/path` target for a volume path.
fn target(path: &str) -> String {
    format!("::/{}", path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_spec() {
        let whole = FatVolume::whole(Path::new("/b/iso/efi.fat"));
        assert_eq!(whole.device_spec(), "/b/iso/efi.fat");

        let part = FatVolume::at_offset(Path::new("/b/usb.img"), 1_048_576);
        assert_eq!(part.device_spec(), "/b/usb.img@@1048576");
    }

    #[test]
    fn test_target_normalizes_leading_slash() {
        assert_eq!(target("/EFI/BOOT"), "::/EFI/BOOT");
        assert_eq!(target("kernel.bin"), "::/kernel.bin");
    }

    #[test]
    fn test_env_is_applied() {
        let vol = FatVolume::whole(Path::new("x.img"))
            .with_env(vec![("MTOOLS_SKIP_CHECK".into(), "1".into())]);
        let cmd = vol.tool("mmd");
        assert_eq!(cmd.get_envs(), [("MTOOLS_SKIP_CHECK".to_string(), "1".to_string())]);
        assert_eq!(cmd.get_args(), ["-i", "x.img"]);
    }
}
