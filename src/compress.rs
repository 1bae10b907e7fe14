//! Reproducible gzip compression.
//!
//! `gzip -n` omits the original file name and modification time from the
//! header, so identical input bytes always give identical output bytes.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};
use crate::process::{Cmd, ToolInvoker};

/// gzip flags: no name/timestamp, maximum compression, write to stdout.
pub const GZIP_ARGS: [&str; 3] = ["-n", "-9", "-c"];

/// The `gzip` command that compresses `src` into `dest`.
pub fn gzip_command(src: &Path, dest: &Path) -> Cmd {
    Cmd::new("gzip").args(GZIP_ARGS).arg_path(src).stdout_file(dest)
}

/// Compress `src` into `dest`, replacing any existing `dest`.
pub fn compress_to(invoker: &dyn ToolInvoker, src: &Path, dest: &Path) -> Result<()> {
    gzip_command(src, dest).run_with(invoker)?;
    Ok(())
}

/// Compress a file in place.
///
/// Output goes to a `<path>.gz.tmp` sibling first and is renamed over the
/// original only once gzip succeeded.
pub fn compress_in_place(invoker: &dyn ToolInvoker, path: &Path) -> Result<()> {
    let tmp = scratch_path(path);
    if let Err(e) = compress_to(invoker, path, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)
        .io_context(|| format!("failed to move {} over {}", tmp.display(), path.display()))?;
    Ok(())
}

fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz.tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{self, SystemInvoker};
    use tempfile::TempDir;

    #[test]
    fn test_gzip_command_shape() {
        let cmd = gzip_command(Path::new("/b/rr.iso"), Path::new("/b/root.iso.gz"));
        assert_eq!(cmd.program(), "gzip");
        assert_eq!(cmd.get_args(), ["-n", "-9", "-c", "/b/rr.iso"]);
        assert_eq!(cmd.get_stdout_file(), Some(Path::new("/b/root.iso.gz")));
    }

    #[test]
    fn test_scratch_path() {
        assert_eq!(
            scratch_path(Path::new("/b/iso/efi.fat")),
            PathBuf::from("/b/iso/efi.fat.gz.tmp")
        );
    }

    #[test]
    fn test_compression_is_reproducible() {
        if !process::exists("gzip") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("rr.iso");
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &payload).unwrap();

        let first = dir.path().join("first.gz");
        compress_to(&SystemInvoker, &src, &first).unwrap();

        // Different mtime on the source must not change the output.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        fs::write(&src, &payload).unwrap();
        let second = dir.path().join("second.gz");
        compress_to(&SystemInvoker, &src, &second).unwrap();

        let a = fs::read(&first).unwrap();
        let b = fs::read(&second).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..2], &[0x1f, 0x8b]);
        // MTIME field of the gzip header is zero.
        assert_eq!(&a[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_in_place_replaces_file() {
        if !process::exists("gzip") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let img = dir.path().join("efi.fat");
        fs::write(&img, vec![0u8; 64 * 1024]).unwrap();

        compress_in_place(&SystemInvoker, &img).unwrap();

        let bytes = fs::read(&img).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert!(bytes.len() < 64 * 1024);
        assert!(!scratch_path(&img).exists());
    }
}
