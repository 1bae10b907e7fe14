//! Raw image assembly without root privileges.
//!
//! - `partitions`: sparse allocation and the MBR table (sfdisk on a file)
//! - `mtools`: FAT32 operations on a volume inside an image (`image@@offset`)
//! - `populate`: format + directory skeleton + file copies from a plan
//! - `bootsector`: Limine `bios-install`

pub mod bootsector;
pub mod mtools;
pub mod partitions;
pub mod populate;

pub use bootsector::install_bios_boot_sector;
pub use mtools::FatVolume;
pub use partitions::{allocate_image, write_partition_table, PartitionEntry, PartitionTable};
pub use populate::{populate, FileMapping, PopulateReport, VolumePlan};
