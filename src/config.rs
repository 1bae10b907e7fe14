//! Configuration management for rrimage.
//!
//! The environment (after `.env` has been loaded by `main`) is read exactly
//! once into an immutable [`Config`]. Components receive the value by
//! reference and never consult the process environment themselves.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{BuildError, Result};

pub const DEFAULT_EFI_LABEL: &str = "RETROEFI";
pub const DEFAULT_USB_LABEL: &str = "RETROROCKET";
pub const DEFAULT_HEADROOM_MIB: u64 = 64;

/// Largest accepted `HEADROOM_MIB` (1 TiB).
pub const MAX_HEADROOM_MIB: u64 = 1024 * 1024;

/// What to do when the boot configuration file is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootConfigPolicy {
    /// Missing config is a `MissingArtifact` error.
    #[default]
    Require,
    /// Missing config is replaced by a generated minimal one.
    Synthesize,
}

impl FromStr for BootConfigPolicy {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require" => Ok(Self::Require),
            "synthesize" => Ok(Self::Synthesize),
            other => Err(BuildError::Validation(format!(
                "BOOT_CONFIG_POLICY must be 'require' or 'synthesize', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BootConfigPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Require => f.write_str("require"),
            Self::Synthesize => f.write_str("synthesize"),
        }
    }
}

/// What happens to a partially written image when a later stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Leave it on disk for inspection.
    #[default]
    Keep,
    /// Delete it.
    Remove,
}

impl FromStr for FailurePolicy {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "remove" => Ok(Self::Remove),
            other => Err(BuildError::Validation(format!(
                "ON_FAILURE must be 'keep' or 'remove', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => f.write_str("keep"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// Resolved build configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory relative overrides are resolved against.
    pub base_dir: PathBuf,
    /// Limine checkout (binaries and installer).
    pub limine_dir: PathBuf,
    /// Build output directory (kernel, default EFI image).
    pub build_dir: PathBuf,
    pub kernel_path: PathBuf,
    /// Always `kernel.sym` next to the kernel.
    pub symbol_path: PathBuf,
    /// Optional directory of loadable modules.
    pub modules_dir: PathBuf,
    /// Explicit UEFI loader; searched for in `limine_dir` when unset.
    pub limine_boot_efi: Option<PathBuf>,
    /// Optional directory of extra EFI payloads copied to `/EFI/BOOT/`.
    pub efi_extra_dir: Option<PathBuf>,
    pub efi_label: String,
    pub usb_label: String,
    pub efi_boot_config: PathBuf,
    pub usb_boot_config: PathBuf,
    /// Root filesystem payload (compressed into the USB image).
    pub root_image: PathBuf,
    pub usb_output: PathBuf,
    pub boot_config_policy: BootConfigPolicy,
    pub on_failure: FailurePolicy,
    /// Explicit `MTOOLS_SKIP_CHECK`; each variant has its own default.
    pub mtools_skip_check: Option<bool>,
    pub headroom_mib: u64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(base_dir, &vars)
    }

    /// Build configuration from an explicit variable map.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let path = |key: &str| get(key).map(|v| resolve(base_dir, v));

        let limine_dir = path("LIMINE_DIR").unwrap_or_else(|| base_dir.join("../limine"));
        let build_dir = path("BUILD_DIR").unwrap_or_else(|| base_dir.join("iso"));
        let kernel_path = path("KERNEL_PATH").unwrap_or_else(|| build_dir.join("kernel.bin"));
        let symbol_path = kernel_path
            .parent()
            .unwrap_or(Path::new("."))
            .join("kernel.sym");
        let modules_dir = path("MODULES_DIR").unwrap_or_else(|| build_dir.join("modules"));

        let boot_config_policy = match get("BOOT_CONFIG_POLICY") {
            Some(v) => v.parse()?,
            None => BootConfigPolicy::default(),
        };
        let on_failure = match get("ON_FAILURE") {
            Some(v) => v.parse()?,
            None => FailurePolicy::default(),
        };
        let mtools_skip_check = get("MTOOLS_SKIP_CHECK").map(parse_flag).transpose()?;
        let headroom_mib = match get("HEADROOM_MIB") {
            Some(v) => v
                .parse::<u64>()
                .ok()
                .filter(|&mib| mib <= MAX_HEADROOM_MIB)
                .ok_or_else(|| {
                    BuildError::Validation(format!(
                        "HEADROOM_MIB must be an integer between 0 and {}, got '{}'",
                        MAX_HEADROOM_MIB, v
                    ))
                })?,
            None => DEFAULT_HEADROOM_MIB,
        };

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            limine_boot_efi: path("LIMINE_BOOT_EFI"),
            efi_extra_dir: path("EFI_EXTRA_DIR"),
            efi_label: get("EFI_LABEL").unwrap_or(DEFAULT_EFI_LABEL).to_string(),
            usb_label: get("USB_LABEL").unwrap_or(DEFAULT_USB_LABEL).to_string(),
            efi_boot_config: path("EFI_BOOT_CONFIG")
                .unwrap_or_else(|| base_dir.join("limine-hdd.conf")),
            usb_boot_config: path("USB_BOOT_CONFIG")
                .unwrap_or_else(|| base_dir.join("../limine-usb.conf")),
            root_image: path("ROOT_IMAGE").unwrap_or_else(|| base_dir.join("rr.iso")),
            usb_output: path("USB_OUTPUT").unwrap_or_else(|| base_dir.join("usb.img")),
            limine_dir,
            build_dir,
            kernel_path,
            symbol_path,
            modules_dir,
            boot_config_policy,
            on_failure,
            mtools_skip_check,
            headroom_mib,
        })
    }

    /// Default output path for the EFI FAT image.
    pub fn default_efi_output(&self) -> PathBuf {
        self.build_dir.join("efi.fat")
    }

    /// The `limine` host executable (BIOS installer).
    pub fn limine_installer(&self) -> PathBuf {
        self.limine_dir.join("limine")
    }

    /// BIOS stage file copied into the USB volume.
    pub fn limine_bios_stage(&self) -> PathBuf {
        self.limine_dir.join("limine-bios.sys")
    }

    /// Candidate locations for the UEFI loader, most specific first.
    pub fn limine_efi_candidates(&self) -> Vec<PathBuf> {
        match self.limine_boot_efi {
            Some(ref explicit) => vec![explicit.clone()],
            None => vec![
                self.limine_dir.join("EFI/BOOT/BOOTX64.EFI"),
                self.limine_dir.join("BOOTX64.EFI"),
            ],
        }
    }

    /// Environment for mtools invocations.
    pub fn mtools_env(&self, skip_check_default: bool) -> Vec<(String, String)> {
        if self.mtools_skip_check.unwrap_or(skip_check_default) {
            vec![("MTOOLS_SKIP_CHECK".to_string(), "1".to_string())]
        } else {
            Vec::new()
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  LIMINE_DIR:         {}", self.limine_dir.display());
        println!("  BUILD_DIR:          {}", self.build_dir.display());
        println!("  KERNEL_PATH:        {}", self.kernel_path.display());
        println!("  (kernel symbols):   {}", self.symbol_path.display());
        println!("  MODULES_DIR:        {}", self.modules_dir.display());
        match self.limine_boot_efi {
            Some(ref p) => println!("  LIMINE_BOOT_EFI:    {}", p.display()),
            None => println!("  LIMINE_BOOT_EFI:    (search {})", self.limine_dir.display()),
        }
        match self.efi_extra_dir {
            Some(ref p) => println!("  EFI_EXTRA_DIR:      {}", p.display()),
            None => println!("  EFI_EXTRA_DIR:      (none)"),
        }
        println!("  EFI_LABEL:          {}", self.efi_label);
        println!("  USB_LABEL:          {}", self.usb_label);
        println!("  EFI_BOOT_CONFIG:    {}", self.efi_boot_config.display());
        println!("  USB_BOOT_CONFIG:    {}", self.usb_boot_config.display());
        println!("  ROOT_IMAGE:         {}", self.root_image.display());
        println!("  USB_OUTPUT:         {}", self.usb_output.display());
        println!("  BOOT_CONFIG_POLICY: {}", self.boot_config_policy);
        println!("  ON_FAILURE:         {}", self.on_failure);
        match self.mtools_skip_check {
            Some(v) => println!("  MTOOLS_SKIP_CHECK:  {}", v),
            None => println!("  MTOOLS_SKIP_CHECK:  (variant default)"),
        }
        println!("  HEADROOM_MIB:       {}", self.headroom_mib);
    }
}

fn resolve(base_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BuildError::Validation(format!(
            "MTOOLS_SKIP_CHECK must be a boolean flag, got '{}'",
            other
        ))),
    }
}
