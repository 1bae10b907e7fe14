//! Preflight checks for image builds.
//!
//! Reports every missing host tool and build input for both image variants
//! at once, instead of stopping at the first problem like a build does.
//! Run with `rrimage preflight`.

mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::artifact::ArtifactSet;
use crate::build::{efi, usb};
use crate::config::Config;

pub use host_tools::{check_host_tools, package_for, require_tools};
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    let mut tools = efi::efi_tools(true);
    for tool in usb::USB_TOOLS {
        if !tools.contains(&tool) {
            tools.push(tool);
        }
    }
    checks.extend(check_host_tools(&tools));

    println!("Checking EFI image inputs...");
    checks.extend(check_artifacts("efi", &efi::efi_artifacts(config)));

    println!("Checking USB image inputs...");
    checks.extend(check_artifacts("usb", &usb::usb_artifacts(config)));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}

/// One check per declared input. Absent optional inputs only warn.
pub fn check_artifacts(variant: &str, set: &ArtifactSet) -> Vec<CheckResult> {
    set.iter()
        .map(|artifact| {
            let name = format!("{variant}: {}", artifact.kind);
            match artifact.locate() {
                Some(path) => CheckResult::pass_with(&name, &path.display().to_string()),
                None if artifact.required => {
                    CheckResult::fail(&name, &artifact.missing().to_string())
                }
                None => CheckResult::warn(
                    &name,
                    &format!("{} (optional, skipped)", artifact.missing()),
                ),
            }
        })
        .collect()
}
