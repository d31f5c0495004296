//! fixed-size block read/write over a flat backing object,
//! either a memory-mapped image file or a plain in-memory buffer.
use std::{
    fs::OpenOptions,
    io::{Error, ErrorKind},
    ops::{Deref, DerefMut},
    path::Path,
};

use memmap2::MmapMut;

use crate::fs::BLOCK_SIZE;

/// one block worth of bytes
pub type Block = [u8; BLOCK_SIZE];

/// a heap-allocated, zero-initialised block buffer.
///
/// Every operation that needs scratch space acquires one of these and lets it
/// drop at the end of its scope, so it is released on every exit path.
#[derive(Clone)]
pub struct BlockBuf(Box<Block>);

impl BlockBuf {
    pub fn zeroed() -> Self {
        Self(Box::new([0u8; BLOCK_SIZE]))
    }
}

impl Default for BlockBuf {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Deref for BlockBuf {
    type Target = Block;
    fn deref(&self) -> &Block {
        &self.0
    }
}

impl DerefMut for BlockBuf {
    fn deref_mut(&mut self) -> &mut Block {
        &mut self.0
    }
}

impl std::fmt::Debug for BlockBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockBuf").finish_non_exhaustive()
    }
}

/// the byte storage backing a [BlockStore]
pub trait Storage: AsRef<[u8]> + AsMut<[u8]> {
    /// make written bytes durable
    fn flush(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Storage for MmapMut {
    fn flush(&self) -> std::io::Result<()> {
        MmapMut::flush(self)
    }
}

impl Storage for Vec<u8> {}

/// block device over a [Storage].
///
/// Blocks are addressed by a dense zero-based index. Nothing here reserves
/// block 0, that is a convention of the layout.
#[derive(Debug)]
pub struct BlockStore<S> {
    inner: S,
    total_blocks: u32,
}

impl BlockStore<MmapMut> {
    /// create a new image file holding `total_blocks` zeroed blocks and map it.
    /// Fails if the file already exists.
    pub fn create<P>(path: P, total_blocks: u32) -> std::io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        // all blocks read back as zero after `set_len`
        file.set_len(total_blocks as u64 * BLOCK_SIZE as u64)?;

        // Safety
        // the mapping is only valid while no other process truncates the image,
        // this program is the single user of the file while mounted
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self::new(mmap))
    }

    /// map an existing image file
    pub fn open<P>(path: P) -> std::io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len < BLOCK_SIZE as u64 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("image file is {len} bytes, smaller than one block"),
            ));
        }
        // Safety
        // same as `create`: nothing else may resize the image while it is mapped
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self::new(mmap))
    }
}

impl BlockStore<Vec<u8>> {
    /// a zeroed store that lives only in memory
    pub fn in_memory(total_blocks: u32) -> Self {
        Self::new(vec![0u8; total_blocks as usize * BLOCK_SIZE])
    }
}

impl<S> BlockStore<S>
where
    S: Storage,
{
    /// wrap a storage, trailing bytes that do not fill a whole block are ignored
    pub fn new(inner: S) -> Self {
        let total_blocks = (inner.as_ref().len() / BLOCK_SIZE) as u32;
        Self {
            inner,
            total_blocks,
        }
    }

    pub const fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// get underlying storage
    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn read_block(&self, index: u32, buf: &mut Block) -> std::io::Result<()> {
        let range = self.range_of(index)?;
        buf.copy_from_slice(&self.inner.as_ref()[range]);
        Ok(())
    }

    pub fn write_block(&mut self, index: u32, buf: &Block) -> std::io::Result<()> {
        let range = self.range_of(index)?;
        self.inner.as_mut()[range].copy_from_slice(buf);
        Ok(())
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.inner.flush()
    }

    fn range_of(&self, index: u32) -> std::io::Result<std::ops::Range<usize>> {
        if index >= self.total_blocks {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "block {index} is out of range, store has {} blocks",
                    self.total_blocks
                ),
            ));
        }
        let start = index as usize * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }
}
