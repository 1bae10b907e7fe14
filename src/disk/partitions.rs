//! Image allocation and MBR partition table creation.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::Builder;

use crate::error::{IoContext, Result};
use crate::layout::ImageLayout;
use crate::process::{Cmd, ToolInvoker};

/// Partition type byte for an EFI System Partition in a DOS table.
pub const EFI_PARTITION_TYPE: u8 = 0xef;

/// Partition table label understood by sfdisk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Dos,
}

impl LabelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dos => "dos",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub start_sector: u64,
    pub sectors: u64,
    pub type_byte: u8,
    pub bootable: bool,
}

impl PartitionEntry {
    /// The single bootable ESP spanning the data region of `layout`.
    pub fn bootable_esp(layout: &ImageLayout) -> Self {
        Self {
            start_sector: layout.start_lba,
            sectors: layout.partition_sectors,
            type_byte: EFI_PARTITION_TYPE,
            bootable: true,
        }
    }
}

/// A one-entry partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionTable {
    pub label: LabelKind,
    pub entry: PartitionEntry,
}

impl PartitionTable {
    pub fn dos(entry: PartitionEntry) -> Self {
        Self {
            label: LabelKind::Dos,
            entry,
        }
    }

    /// Render as an sfdisk input script.
    pub fn to_sfdisk_script(&self) -> String {
        let e = &self.entry;
        format!(
            "label: {}\nunit: sectors\n\n{} {} {:02x}{}\n",
            self.label.as_str(),
            e.start_sector,
            e.sectors,
            e.type_byte,
            if e.bootable { " *" } else { "" }
        )
    }
}

/// Create (or truncate) `path` as a zero-filled sparse file of `bytes`.
pub fn allocate_image(path: &Path, bytes: u64) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .io_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = fs::File::create(path)
        .io_context(|| format!("failed to create image {}", path.display()))?;
    file.set_len(bytes)
        .io_context(|| format!("failed to size image {} to {} bytes", path.display(), bytes))?;
    Ok(())
}

/// Apply `table` to `image` with sfdisk.
///
/// The script goes through a scratch file that is removed when this
/// returns, whether sfdisk succeeded or not.
pub fn write_partition_table(
    invoker: &dyn ToolInvoker,
    image: &Path,
    table: &PartitionTable,
) -> Result<()> {
    let mut script = Builder::new()
        .prefix("sfdisk_")
        .tempfile()
        .io_context(|| "failed to create sfdisk script file")?;
    script
        .write_all(table.to_sfdisk_script().as_bytes())
        .and_then(|_| script.flush())
        .io_context(|| "failed to write sfdisk script")?;

    Cmd::new("sfdisk")
        .arg_path(image)
        .stdin_file(script.path())
        .run_with(invoker)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{SizeCalculator, MIB};
    use tempfile::TempDir;

    #[test]
    fn test_sfdisk_script() {
        let layout = SizeCalculator::with_overhead(0).compute([4 * MIB]).unwrap();
        let table = PartitionTable::dos(PartitionEntry::bootable_esp(&layout));
        assert_eq!(
            table.to_sfdisk_script(),
            "label: dos\nunit: sectors\n\n2048 8192 ef *\n"
        );
    }

    #[test]
    fn test_non_bootable_entry_has_no_marker() {
        let table = PartitionTable::dos(PartitionEntry {
            start_sector: 2048,
            sectors: 100,
            type_byte: 0x0c,
            bootable: false,
        });
        assert!(table.to_sfdisk_script().ends_with("2048 100 0c\n"));
    }

    #[test]
    fn test_entry_matches_layout() {
        let layout = SizeCalculator::new(64).compute([3 * MIB]).unwrap();
        let entry = PartitionEntry::bootable_esp(&layout);
        assert_eq!(entry.start_sector, 2048);
        assert_eq!(entry.start_sector + entry.sectors, layout.total_sectors);
    }

    #[test]
    fn test_allocate_truncates_existing() {
        let dir = TempDir::new().unwrap();
        let img = dir.path().join("out/usb.img");
        allocate_image(&img, 2 * MIB).unwrap();
        assert_eq!(fs::metadata(&img).unwrap().len(), 2 * MIB);

        fs::write(&img, b"stale").unwrap();
        allocate_image(&img, MIB).unwrap();
        let bytes = fs::read(&img).unwrap();
        assert_eq!(bytes.len() as u64, MIB);
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
