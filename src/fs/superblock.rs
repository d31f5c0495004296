use bincode::{Decode, Encode};

use crate::utils::{
    fs_size_calculator::{self, RegionStarts, INODES_PER_BLOCK},
    traits::OnDiskRecord,
};

use super::{FsError, Result, BLOCK_SIZE, FS_MAGIC};

/// The superblock of this filesystem, always stored in block 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct SuperBlock {
    /// magic number
    pub magic_num: u32,
    /// inode capacity
    pub max_inum: u32,
    /// data block capacity
    pub max_dnum: u32,
    /// start block of inode bitmap
    pub i_bitmap_blk: u32,
    /// start block of data block bitmap
    pub d_bitmap_blk: u32,
    /// start block of inode table
    pub i_start_blk: u32,
    /// start block of data region
    pub d_start_blk: u32,
}

impl OnDiskRecord for SuperBlock {
    const SLOT_SIZE: usize = BLOCK_SIZE;
}

impl SuperBlock {
    /// lay out an image for the given capacities.
    /// Both must be positive and the whole image must fit `u32` block numbers.
    pub fn new(max_inum: u32, max_dnum: u32) -> Result<Self> {
        if max_inum == 0 || max_dnum == 0 {
            return Err(FsError::InvalidCapacity(format!(
                "{max_inum} inodes and {max_dnum} data blocks, both must be positive"
            )));
        }
        let RegionStarts {
            i_bitmap_blk,
            d_bitmap_blk,
            i_start_blk,
            d_start_blk,
            ..
        } = fs_size_calculator::region_starts(max_inum, max_dnum).ok_or_else(|| {
            FsError::InvalidCapacity(format!(
                "{max_inum} inodes and {max_dnum} data blocks overflow the block numbers"
            ))
        })?;
        Ok(Self {
            magic_num: FS_MAGIC,
            max_inum,
            max_dnum,
            i_bitmap_blk,
            d_bitmap_blk,
            i_start_blk,
            d_start_blk,
        })
    }

    /// blocks the backing store must hold for this geometry
    pub const fn total_blocks(&self) -> u32 {
        self.d_start_blk.saturating_add(self.max_dnum)
    }

    pub const fn inodes_per_block(&self) -> u32 {
        INODES_PER_BLOCK
    }

    /// block numbers a data block pointer may hold
    pub fn data_region(&self) -> std::ops::Range<u32> {
        self.d_start_blk..self.total_blocks()
    }

    /// check a superblock read back from disk:
    /// the magic number must match and the stored region starts must be
    /// exactly what the layout formula gives for the stored capacities
    pub fn verify(&self) -> Result<()> {
        if self.magic_num != FS_MAGIC {
            return Err(FsError::BadMagic(self.magic_num));
        }
        let expected = Self::new(self.max_inum, self.max_dnum)
            .map_err(|e| FsError::Corrupted(format!("superblock {self:?}: {e}")))?;
        if *self != expected {
            return Err(FsError::Corrupted(format!(
                "superblock layout does not match its capacities: {self:?}"
            )));
        }
        Ok(())
    }
}
