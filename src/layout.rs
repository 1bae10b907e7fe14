//! Image size and offset arithmetic.
//!
//! The USB image is laid out as a reserved first region (partition table
//! plus alignment padding, exactly `START_LBA` sectors) followed by a
//! single data partition that runs to the end of the image:
//!
//! ```text
//! 0            1 MiB                                   image_bytes
//! | MBR + pad  | FAT32 partition (partition_size)      |
//!  LBA 0..2047   LBA 2048 .. total_sectors
//! ```

use crate::error::{BuildError, Result};

pub const MIB: u64 = 1024 * 1024;

/// Logical sector size of the image.
pub const SECTOR_SIZE: u64 = 512;

/// First sector of the data partition (1 MiB / 512).
pub const START_LBA: u64 = 2048;

/// Bytes before the data partition.
pub const RESERVED_FIRST_REGION: u64 = START_LBA * SECTOR_SIZE;

/// Partition size granularity.
pub const PARTITION_ALIGNMENT: u64 = 4 * MIB;

/// Space reserved in the partition for the boot loader's own files.
pub const LOADER_RESERVE: u64 = 2 * MIB;

/// Smallest EFI image `mformat` can turn into FAT32.
pub const MIN_EFI_IMAGE_MIB: u64 = 8;

pub const DEFAULT_EFI_IMAGE_MIB: u64 = 68;

/// Round `x` up to the next multiple of `a`. `a` must be a power of two.
pub const fn align_up(x: u64, a: u64) -> u64 {
    debug_assert!(a.is_power_of_two());
    (x + (a - 1)) & !(a - 1)
}

/// Byte layout of a partitioned image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub sector_size: u64,
    pub start_lba: u64,
    pub image_bytes: u64,
    pub partition_bytes: u64,
    pub total_sectors: u64,
    pub partition_sectors: u64,
    /// Payload the partition was sized for (before alignment).
    pub payload_bytes: u64,
}

impl ImageLayout {
    /// Byte offset of the data partition within the image.
    pub fn partition_offset(&self) -> u64 {
        self.start_lba * self.sector_size
    }

    /// Image size rounded to whole MiB, for reporting.
    pub fn image_mib(&self) -> u64 {
        (self.image_bytes + MIB / 2) / MIB
    }
}

/// Derives the USB image layout from artifact sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCalculator {
    pub overhead_bytes: u64,
    pub alignment: u64,
    pub reserved_first_region: u64,
    pub sector_size: u64,
    pub start_lba: u64,
}

impl SizeCalculator {
    /// Standard calculator: loader reserve plus `headroom_mib` of overhead.
    ///
    /// Saturates; an absurd headroom is rejected by [`Self::compute`].
    pub fn new(headroom_mib: u64) -> Self {
        Self::with_overhead(headroom_mib.saturating_mul(MIB).saturating_add(LOADER_RESERVE))
    }

    pub fn with_overhead(overhead_bytes: u64) -> Self {
        Self {
            overhead_bytes,
            alignment: PARTITION_ALIGNMENT,
            reserved_first_region: RESERVED_FIRST_REGION,
            sector_size: SECTOR_SIZE,
            start_lba: START_LBA,
        }
    }

    /// Compute the layout for a partition that must hold `artifact_sizes`.
    ///
    /// Fails with [`BuildError::Validation`] when the image size does not
    /// fit in 64 bits.
    pub fn compute<I>(&self, artifact_sizes: I) -> Result<ImageLayout>
    where
        I: IntoIterator<Item = u64>,
    {
        let too_large = || BuildError::Validation("image size overflows 64 bits".to_string());

        let payload_bytes = artifact_sizes
            .into_iter()
            .try_fold(self.overhead_bytes, u64::checked_add)
            .ok_or_else(too_large)?;
        let partition_bytes = payload_bytes
            .checked_add(self.alignment - 1)
            .map(|v| v & !(self.alignment - 1))
            .ok_or_else(too_large)?;
        let image_bytes = self
            .reserved_first_region
            .checked_add(partition_bytes)
            .ok_or_else(too_large)?;
        let total_sectors = image_bytes / self.sector_size;
        let partition_sectors = total_sectors - self.start_lba;

        Ok(ImageLayout {
            sector_size: self.sector_size,
            start_lba: self.start_lba,
            image_bytes,
            partition_bytes,
            total_sectors,
            partition_sectors,
            payload_bytes,
        })
    }
}

/// Parse and validate the EFI image size argument (whole MiB).
///
/// Returns the image size in bytes.
pub fn efi_image_bytes(size_mib: &str) -> Result<u64> {
    let trimmed = size_mib.trim();
    let invalid = || {
        BuildError::Validation(format!(
            "SIZE_MIB must be an integer >= {} (got '{}')",
            MIN_EFI_IMAGE_MIB, size_mib
        ))
    };

    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let mib: u64 = trimmed.parse().map_err(|_| invalid())?;
    if mib < MIN_EFI_IMAGE_MIB {
        return Err(invalid());
    }
    mib.checked_mul(MIB).ok_or_else(invalid)
}
