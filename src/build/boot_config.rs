//! Boot configuration resolution.
//!
//! Under [`BootConfigPolicy::Require`] the configured file must exist. Under
//! [`BootConfigPolicy::Synthesize`] a missing file is replaced with a
//! minimal Limine config written to a scratch file for the duration of the
//! build.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::warn;

use crate::config::BootConfigPolicy;
use crate::error::{BuildError, IoContext, Result};

/// Destination of the boot configuration inside every volume.
pub const BOOT_CONFIG_DEST: &str = "/limine.conf";

/// Minimal Limine config: boot the kernel with its symbol table as a module.
pub const DEFAULT_LIMINE_CONF: &str = "\
timeout: 3

/Retro Rocket
    protocol: limine
    kernel_path: boot():/kernel.bin
    module_path: boot():/kernel.sym
";

/// A usable boot configuration file.
#[derive(Debug)]
pub enum BootConfig {
    /// User-provided file.
    File(PathBuf),
    /// Generated default; the file is deleted when this is dropped.
    Synthesized(NamedTempFile),
}

impl BootConfig {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Synthesized(temp) => temp.path(),
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, Self::Synthesized(_))
    }
}

/// Resolve the boot config at `path` according to `policy`.
pub fn resolve(path: &Path, policy: BootConfigPolicy) -> Result<BootConfig> {
    if path.is_file() {
        return Ok(BootConfig::File(path.to_path_buf()));
    }
    match policy {
        BootConfigPolicy::Require => Err(BuildError::missing_artifact("boot configuration", path)),
        BootConfigPolicy::Synthesize => {
            warn!(path = %path.display(), "boot configuration missing, using generated default");
            let mut temp = Builder::new()
                .prefix("limine-")
                .suffix(".conf")
                .tempfile()
                .io_context(|| "failed to create scratch boot config")?;
            temp.write_all(DEFAULT_LIMINE_CONF.as_bytes())
                .and_then(|_| temp.flush())
                .io_context(|| "failed to write scratch boot config")?;
            Ok(BootConfig::Synthesized(temp))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_existing_file_used_under_both_policies() {
        let dir = TempDir::new().unwrap();
        let cfg = dir.path().join("limine-hdd.conf");
        fs::write(&cfg, "timeout: 0\n").unwrap();

        for policy in [BootConfigPolicy::Require, BootConfigPolicy::Synthesize] {
            let resolved = resolve(&cfg, policy).unwrap();
            assert_eq!(resolved.path(), cfg);
            assert!(!resolved.is_synthesized());
        }
    }

    #[test]
    fn test_require_fails_with_path() {
        let missing = Path::new("/nope/limine-hdd.conf");
        let err = resolve(missing, BootConfigPolicy::Require).unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingArtifact { ref path, .. } if path == missing
        ));
    }

    #[test]
    fn test_synthesize_writes_default_and_cleans_up() {
        let resolved =
            resolve(Path::new("/nope/limine.conf"), BootConfigPolicy::Synthesize).unwrap();
        assert!(resolved.is_synthesized());
        let scratch = resolved.path().to_path_buf();
        assert_eq!(fs::read_to_string(&scratch).unwrap(), DEFAULT_LIMINE_CONF);

        drop(resolved);
        assert!(!scratch.exists());
    }
}
