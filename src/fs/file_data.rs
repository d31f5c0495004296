//! map byte ranges of a file onto its direct and indirect blocks

use log::{debug, warn};

use crate::block_store::{BlockBuf, Storage};

use super::{
    FsError, Inode, Result, TinyFs, BLOCK_SIZE, DIRECT_POINTERS, INDIRECT_POINTERS, PTRS_PER_BLOCK,
};

const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;

/// blocks one inode can address
pub const MAX_FILE_BLOCKS: u64 = (DIRECT_POINTERS + INDIRECT_POINTERS * PTRS_PER_BLOCK) as u64;
/// largest byte size a file can grow to
pub const MAX_FILE_SIZE: u64 = MAX_FILE_BLOCKS * BLOCK_SIZE_U64;

/// where the pointer for one logical block of a file is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockSlot {
    Direct(usize),
    Indirect { pointer: usize, entry: usize },
}

impl BlockSlot {
    fn of(index: u64) -> Result<Self> {
        if index >= MAX_FILE_BLOCKS {
            return Err(FsError::FileTooLarge);
        }
        let index = index as usize;
        if index < DIRECT_POINTERS {
            return Ok(BlockSlot::Direct(index));
        }
        let k = index - DIRECT_POINTERS;
        Ok(BlockSlot::Indirect {
            pointer: k / PTRS_PER_BLOCK,
            entry: k % PTRS_PER_BLOCK,
        })
    }
}

/// entries of an indirect block, little endian
fn pointer_at(buf: &BlockBuf, entry: usize) -> u32 {
    let at = entry * 4;
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn set_pointer_at(buf: &mut BlockBuf, entry: usize, block: u32) {
    let at = entry * 4;
    buf[at..at + 4].copy_from_slice(&block.to_le_bytes());
}

/// pointer lookup and allocation
impl<S> TinyFs<S>
where
    S: Storage,
{
    /// block holding logical block `index` of `inode`, 0 if none is allocated
    fn find_data_block(&self, inode: &Inode, index: u64) -> Result<u32> {
        match BlockSlot::of(index)? {
            BlockSlot::Direct(i) => Ok(inode.direct_ptr[i]),
            BlockSlot::Indirect { pointer, entry } => match inode.indirect_ptr[pointer] {
                0 => Ok(0),
                indirect => {
                    let mut buf = BlockBuf::zeroed();
                    self.read_block(indirect, &mut buf)?;
                    Ok(pointer_at(&buf, entry))
                }
            },
        }
    }

    /// like [Self::find_data_block], allocating zeroed blocks for missing pointers.
    /// A missing indirect block is allocated before the data block.
    fn find_or_allocate_block(&mut self, inode: &mut Inode, index: u64) -> Result<u32> {
        match BlockSlot::of(index)? {
            BlockSlot::Direct(i) => {
                if inode.direct_ptr[i] == 0 {
                    inode.direct_ptr[i] = self.allocate_data_block()?;
                }
                Ok(inode.direct_ptr[i])
            }
            BlockSlot::Indirect { pointer, entry } => {
                if inode.indirect_ptr[pointer] == 0 {
                    inode.indirect_ptr[pointer] = self.allocate_data_block()?;
                    debug!(
                        "inode {} got indirect block {}",
                        inode.ino, inode.indirect_ptr[pointer]
                    );
                }
                let indirect = inode.indirect_ptr[pointer];
                let mut buf = BlockBuf::zeroed();
                self.read_block(indirect, &mut buf)?;
                match pointer_at(&buf, entry) {
                    0 => {
                        let block = self.allocate_data_block()?;
                        set_pointer_at(&mut buf, entry, block);
                        if let Err(e) = self.write_block(indirect, &buf) {
                            self.release_data_block(block)?;
                            return Err(e);
                        }
                        Ok(block)
                    }
                    block => Ok(block),
                }
            }
        }
    }

    /// free every block at logical index `keep` or later,
    /// and every indirect block left without entries
    fn free_blocks_from(&mut self, inode: &mut Inode, keep: u64) -> Result<()> {
        for i in 0..DIRECT_POINTERS {
            if i as u64 >= keep && inode.direct_ptr[i] != 0 {
                self.release_data_block(inode.direct_ptr[i])?;
                inode.direct_ptr[i] = 0;
            }
        }

        let mut buf = BlockBuf::zeroed();
        for pointer in 0..INDIRECT_POINTERS {
            let indirect = inode.indirect_ptr[pointer];
            if indirect == 0 {
                continue;
            }
            self.read_block(indirect, &mut buf)?;
            let first = (DIRECT_POINTERS + pointer * PTRS_PER_BLOCK) as u64;
            let mut changed = false;
            for entry in 0..PTRS_PER_BLOCK {
                let block = pointer_at(&buf, entry);
                if block != 0 && first + entry as u64 >= keep {
                    self.release_data_block(block)?;
                    set_pointer_at(&mut buf, entry, 0);
                    changed = true;
                }
            }
            if (0..PTRS_PER_BLOCK).all(|entry| pointer_at(&buf, entry) == 0) {
                self.release_data_block(indirect)?;
                inode.indirect_ptr[pointer] = 0;
            } else if changed {
                self.write_block(indirect, &buf)?;
            }
        }
        Ok(())
    }
}

/// file content operations
impl<S> TinyFs<S>
where
    S: Storage,
{
    /// read from `offset` until `buf` is full or the end of the file
    /// # Return
    /// the number of bytes copied into `buf`
    pub fn read_data(&self, inode: &Inode, buf: &mut [u8], offset: u64) -> Result<usize> {
        if offset >= inode.size {
            return Ok(0);
        }
        let end = inode.size.min(offset + buf.len() as u64);
        let mut scratch = BlockBuf::zeroed();
        let mut pos = offset;
        while pos < end {
            let within = (pos % BLOCK_SIZE_U64) as usize;
            let chunk = (BLOCK_SIZE - within).min((end - pos) as usize);
            let out = (pos - offset) as usize;
            match self.find_data_block(inode, pos / BLOCK_SIZE_U64)? {
                // a hole inside the file
                0 => buf[out..out + chunk].fill(0),
                block => {
                    self.read_block(block, &mut scratch)?;
                    buf[out..out + chunk].copy_from_slice(&scratch[within..within + chunk]);
                }
            }
            pos += chunk as u64;
        }
        Ok((end - offset) as usize)
    }

    /// write `data` at `offset`, allocating blocks on the way.
    ///
    /// The inode is persisted even when the write stops early; a short count
    /// is returned if some bytes made it to disk, the error otherwise.
    pub fn write_data(&mut self, inode: &mut Inode, data: &[u8], offset: u64) -> Result<usize> {
        let mut written = 0;
        let outcome = self.write_chunks(inode, data, offset, &mut written);
        if written > 0 {
            inode.size = inode.size.max(offset + written as u64);
            inode.update_modified_at();
        }
        inode.refresh_stat();
        self.write_inode(inode.ino, inode)?;
        match outcome {
            Ok(()) => Ok(written),
            Err(e) if written > 0 => {
                warn!(
                    "short write to inode {}: {written} of {} bytes, {e}",
                    inode.ino,
                    data.len()
                );
                Ok(written)
            }
            Err(e) => Err(e),
        }
    }

    fn write_chunks(
        &mut self,
        inode: &mut Inode,
        data: &[u8],
        offset: u64,
        written: &mut usize,
    ) -> Result<()> {
        let mut scratch = BlockBuf::zeroed();
        while *written < data.len() {
            let pos = offset + *written as u64;
            let within = (pos % BLOCK_SIZE_U64) as usize;
            let chunk = (BLOCK_SIZE - within).min(data.len() - *written);
            let block = self.find_or_allocate_block(inode, pos / BLOCK_SIZE_U64)?;
            if chunk < BLOCK_SIZE {
                self.read_block(block, &mut scratch)?;
            }
            scratch[within..within + chunk].copy_from_slice(&data[*written..*written + chunk]);
            self.write_block(block, &scratch)?;
            *written += chunk;
        }
        Ok(())
    }

    /// set the size of `inode` to `new_size`.
    ///
    /// Shrinking frees the blocks past the new end, growing only records the
    /// new size and leaves a hole.
    pub fn truncate(&mut self, inode: &mut Inode, new_size: u64) -> Result<()> {
        if new_size > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        if new_size < inode.size {
            let keep = new_size.div_ceil(BLOCK_SIZE_U64);
            self.free_blocks_from(inode, keep)?;

            // the kept tail must read back as zeros if the file grows again
            let tail = (new_size % BLOCK_SIZE_U64) as usize;
            if tail != 0 {
                let block = self.find_data_block(inode, new_size / BLOCK_SIZE_U64)?;
                if block != 0 {
                    let mut buf = BlockBuf::zeroed();
                    self.read_block(block, &mut buf)?;
                    buf[tail..].fill(0);
                    self.write_block(block, &buf)?;
                }
            }
        }
        debug!("truncate inode {} from {} to {new_size}", inode.ino, inode.size);
        inode.size = new_size;
        inode.update_modified_at();
        inode.refresh_stat();
        self.write_inode(inode.ino, inode)
    }

    /// free every data and indirect block of `inode` and clear its pointers,
    /// the inode itself is not persisted
    pub fn release_blocks(&mut self, inode: &mut Inode) -> Result<()> {
        self.free_blocks_from(inode, 0)
    }
}
