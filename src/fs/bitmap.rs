use bitvec::prelude::*;
use log::debug;

use crate::block_store::{BlockBuf, BlockStore, Storage};

use super::{FsError, Result, BLOCK_SIZE};

/// one bit per allocatable unit, `1` means allocated.
///
/// The whole bitmap is kept in memory and its block range is rewritten
/// after every change.
#[derive(Debug, Default, Clone)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
    /// first block of the on-disk copy
    start_blk: u32,
    /// blocks the on-disk copy spans
    blocks: u32,
    /// what the bits count, used in errors and logs
    what: &'static str,
}

/// for persistence
impl Bitmap {
    /// an all-clear bitmap tracking `capacity` units
    pub fn new(what: &'static str, capacity: u32, start_blk: u32, blocks: u32) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; capacity as usize],
            start_blk,
            blocks,
            what,
        }
    }

    /// read the bitmap back as it is on disk, it is trusted as-is
    pub fn load<S: Storage>(
        store: &BlockStore<S>,
        what: &'static str,
        capacity: u32,
        start_blk: u32,
        blocks: u32,
    ) -> Result<Self> {
        let mut raw = Vec::with_capacity(blocks as usize * BLOCK_SIZE);
        let mut buf = BlockBuf::zeroed();
        for i in 0..blocks {
            store.read_block(start_blk + i, &mut buf)?;
            raw.extend_from_slice(&buf[..]);
        }
        let mut bits = BitVec::<u8, Lsb0>::from_vec(raw);
        // drop the padding bits of the last block
        bits.truncate(capacity as usize);
        Ok(Self {
            bits,
            start_blk,
            blocks,
            what,
        })
    }

    /// rewrite the whole block range
    pub fn persist<S: Storage>(&self, store: &mut BlockStore<S>) -> Result<()> {
        let raw = self.bits.as_raw_slice();
        let mut buf = BlockBuf::zeroed();
        for i in 0..self.blocks as usize {
            buf.fill(0);
            let start = (i * BLOCK_SIZE).min(raw.len());
            let end = ((i + 1) * BLOCK_SIZE).min(raw.len());
            buf[..end - start].copy_from_slice(&raw[start..end]);
            store.write_block(self.start_blk + i as u32, &buf)?;
        }
        Ok(())
    }
}

/// for allocation
impl Bitmap {
    pub fn capacity(&self) -> u32 {
        self.bits.len() as u32
    }

    /// check if `index` is allocated
    pub fn is_allocated(&self, index: u32) -> bool {
        self.bits.get(index as usize).as_deref() == Some(&true)
    }

    /// calculate the number of free units
    pub fn free_count(&self) -> u32 {
        self.bits.count_zeros() as u32
    }

    /// take the lowest clear bit and persist the bitmap
    pub fn allocate<S: Storage>(&mut self, store: &mut BlockStore<S>) -> Result<u32> {
        let index = self.bits.first_zero().ok_or(FsError::Exhausted(self.what))?;
        self.bits.set(index, true);
        if let Err(e) = self.persist(store) {
            self.bits.set(index, false);
            return Err(e);
        }
        debug!("allocated {} {index}", self.what);
        Ok(index as u32)
    }

    /// clear `index` and persist the bitmap
    pub fn free<S: Storage>(&mut self, store: &mut BlockStore<S>, index: u32) -> Result<()> {
        if index >= self.capacity() {
            return Err(FsError::Corrupted(format!(
                "freeing {} {index} beyond capacity {}",
                self.what,
                self.capacity()
            )));
        }
        self.bits.set(index as usize, false);
        debug!("freed {} {index}", self.what);
        self.persist(store)
    }

    /// mark `index` allocated without searching, used while formatting
    pub fn occupy<S: Storage>(&mut self, store: &mut BlockStore<S>, index: u32) -> Result<()> {
        self.bits.set(index as usize, true);
        self.persist(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_with_store(capacity: u32) -> (Bitmap, BlockStore<Vec<u8>>) {
        let store = BlockStore::in_memory(4);
        (Bitmap::new("inodes", capacity, 1, 1), store)
    }

    #[test]
    fn test_sequential_allocation_is_ascending() {
        let (mut bitmap, mut store) = bitmap_with_store(10);
        let got: Vec<u32> = (0..10)
            .map(|_| bitmap.allocate(&mut store).unwrap())
            .collect();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
        assert!(matches!(
            bitmap.allocate(&mut store),
            Err(FsError::Exhausted("inodes"))
        ));
    }

    #[test]
    fn test_free_then_allocate_reuses_lowest() {
        let (mut bitmap, mut store) = bitmap_with_store(16);
        for _ in 0..8 {
            bitmap.allocate(&mut store).unwrap();
        }
        bitmap.free(&mut store, 5).unwrap();
        bitmap.free(&mut store, 2).unwrap();
        assert_eq!(bitmap.free_count(), 10);
        assert_eq!(bitmap.allocate(&mut store).unwrap(), 2);
        assert_eq!(bitmap.allocate(&mut store).unwrap(), 5);
        assert_eq!(bitmap.allocate(&mut store).unwrap(), 8);
    }

    #[test]
    fn test_bitmap_persists_lsb_first() {
        let (mut bitmap, mut store) = bitmap_with_store(20);
        bitmap.occupy(&mut store, 0).unwrap();
        bitmap.occupy(&mut store, 9).unwrap();

        let mut buf = BlockBuf::zeroed();
        store.read_block(1, &mut buf).unwrap();
        assert_eq!(buf[0], 0b0000_0001);
        assert_eq!(buf[1], 0b0000_0010);

        let loaded = Bitmap::load(&store, "inodes", 20, 1, 1).unwrap();
        assert_eq!(loaded.capacity(), 20);
        assert!(loaded.is_allocated(0));
        assert!(loaded.is_allocated(9));
        assert!(!loaded.is_allocated(1));
        assert!(!loaded.is_allocated(20));
        assert_eq!(loaded.free_count(), 18);
    }

    #[test]
    fn test_free_out_of_range_is_refused() {
        let (mut bitmap, mut store) = bitmap_with_store(4);
        assert!(bitmap.free(&mut store, 4).is_err());
    }
}
