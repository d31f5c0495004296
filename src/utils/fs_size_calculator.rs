//! This module contains functions to calculate the size of differennt fs components
//!
//! All sizes are in blocks. The same inputs always give the same layout,
//! which is what lets a remount rebuild the geometry from the superblock alone.

use crate::fs::{BLOCK_SIZE, INODE_SLOT_SIZE};

/// how many inode records are packed into one block
pub const INODES_PER_BLOCK: u32 = (BLOCK_SIZE / INODE_SLOT_SIZE) as u32;

/// calculate needed bitmap size in blocks
/// # Arguments
/// - `element_count`: the number of tracked inodes or data blocks
/// # Example
/// ```
/// use tinyfs::utils::fs_size_calculator::bitmap_blocks;
/// assert_eq!(bitmap_blocks(1024), 1);
/// assert_eq!(bitmap_blocks(4096 * 8 + 1), 2);
/// ```
pub const fn bitmap_blocks(element_count: u32) -> u32 {
    element_count.div_ceil(8).div_ceil(BLOCK_SIZE as u32)
}

/// calculate needed Inode Table size in blocks
/// # Example
/// ```
/// use tinyfs::utils::fs_size_calculator::inode_table_blocks;
/// assert_eq!(inode_table_blocks(1024), 64);
/// assert_eq!(inode_table_blocks(17), 2);
/// ```
pub const fn inode_table_blocks(max_inum: u32) -> u32 {
    max_inum.div_ceil(INODES_PER_BLOCK)
}

/// block index of every region, in on-disk order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionStarts {
    pub i_bitmap_blk: u32,
    pub d_bitmap_blk: u32,
    pub i_start_blk: u32,
    pub d_start_blk: u32,
    pub total_blocks: u32,
}

/// lay out superblock, inode bitmap, data bitmap, inode table and data region
/// back to back. Block 0 always holds the superblock, so no data block can be
/// numbered 0 and a zero block pointer can mean "unallocated".
///
/// `None` if the image would need more than `u32::MAX` blocks.
/// # Example
/// ```
/// use tinyfs::utils::fs_size_calculator::region_starts;
/// assert_eq!(region_starts(1024, 16384).unwrap().total_blocks, 67 + 16384);
/// assert!(region_starts(1024, u32::MAX).is_none());
/// ```
pub fn region_starts(max_inum: u32, max_dnum: u32) -> Option<RegionStarts> {
    let i_bitmap_blk = 1u32;
    let d_bitmap_blk = i_bitmap_blk.checked_add(bitmap_blocks(max_inum))?;
    let i_start_blk = d_bitmap_blk.checked_add(bitmap_blocks(max_dnum))?;
    let d_start_blk = i_start_blk.checked_add(inode_table_blocks(max_inum))?;
    Some(RegionStarts {
        i_bitmap_blk,
        d_bitmap_blk,
        i_start_blk,
        d_start_blk,
        total_blocks: d_start_blk.checked_add(max_dnum)?,
    })
}
