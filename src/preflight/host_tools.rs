//! Host tool availability checks.

use crate::error::{BuildError, Result};
use crate::process::{self, ToolInvoker};

use super::types::CheckResult;

/// (tool, package, purpose)
const KNOWN_TOOLS: &[(&str, &str, &str)] = &[
    ("mformat", "mtools", "Formats the FAT32 volume"),
    ("mmd", "mtools", "Creates directories in the FAT32 volume"),
    ("mcopy", "mtools", "Copies files into the FAT32 volume"),
    ("gzip", "gzip", "Compresses the root payload and EFI image"),
    ("sfdisk", "util-linux", "Writes the USB partition table"),
    ("make", "make", "Builds the Limine host installer"),
];

/// Package that provides `tool`, for install hints.
pub fn package_for(tool: &str) -> &'static str {
    KNOWN_TOOLS
        .iter()
        .find(|(name, _, _)| *name == tool)
        .map(|(_, package, _)| *package)
        .unwrap_or("unknown package")
}

/// Fail with `MissingTool` on the first tool `invoker` cannot locate.
pub fn require_tools(invoker: &dyn ToolInvoker, tools: &[&str]) -> Result<()> {
    for tool in tools {
        if invoker.locate(tool).is_none() {
            return Err(BuildError::MissingTool {
                tool: tool.to_string(),
                package: package_for(tool).to_string(),
            });
        }
    }
    Ok(())
}

/// One check result per tool.
pub fn check_host_tools(tools: &[&str]) -> Vec<CheckResult> {
    tools.iter().map(|tool| check_tool_exists(tool)).collect()
}

fn check_tool_exists(tool: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => {
            let purpose = KNOWN_TOOLS
                .iter()
                .find(|(name, _, _)| *name == tool)
                .map(|(_, _, purpose)| *purpose)
                .unwrap_or("");
            CheckResult::fail(
                tool,
                &format!("Not found. Install '{}' package. {}", package_for(tool), purpose),
            )
        }
    }
}
