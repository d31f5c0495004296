use bincode::{config, Decode, Encode};

use crate::fs::error::Result;

/// Trait for records stored in a fixed-size slot of a block
/// (superblock, inodes, directory entries)
/// # Note
/// records are encoded with the bincode legacy configuration,
/// little endian with fixed-width integers, so every value of a type
/// encodes to the same length
pub trait OnDiskRecord: Encode + Decode<()> + Sized {
    /// bytes reserved for one record on disk
    const SLOT_SIZE: usize;

    /// encode into `slot`, zero-filling the bytes after the record
    /// # Returns
    /// The number of bytes the record itself occupies
    fn encode_into(&self, slot: &mut [u8]) -> Result<usize> {
        let slot = &mut slot[..Self::SLOT_SIZE];
        slot.fill(0);
        Ok(bincode::encode_into_slice(self, slot, config::legacy())?)
    }

    /// decode from the start of `slot`
    fn decode_from(slot: &[u8]) -> Result<Self> {
        let (record, _read): (Self, usize) =
            bincode::decode_from_slice(&slot[..Self::SLOT_SIZE], config::legacy())?;
        Ok(record)
    }

    /// the encoded length of a record, always `<= SLOT_SIZE`
    fn encoded_len(&self) -> Result<usize> {
        let mut scratch = vec![0u8; Self::SLOT_SIZE];
        self.encode_into(&mut scratch)
    }
}
