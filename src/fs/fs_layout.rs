//! what does our filesystem look like in the memory

use crate::{
    block_store::{Block, BlockBuf, BlockStore, Storage},
    utils::traits::OnDiskRecord,
};

use super::{
    directory::Dirent, superblock::SuperBlock, Bitmap, FileKind, FsError, Inode, Result,
    INODE_SLOT_SIZE, MAX_DNUM, MAX_INUM, ROOT_INODE,
};
use byte_unit::Byte;
use log::{debug, info, warn};
use memmap2::MmapMut;
use std::path::Path;

/// capacities and root ownership used when a new image is formatted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub max_inum: u32,
    pub max_dnum: u32,
    /// owner of the root directory
    pub uid: u32,
    pub gid: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_inum: MAX_INUM,
            max_dnum: MAX_DNUM,
            uid: users::get_effective_uid(),
            gid: users::get_effective_gid(),
        }
    }
}

impl FormatOptions {
    /// the superblock these options format, refusing capacities that
    /// cannot be laid out
    pub fn layout(&self) -> Result<SuperBlock> {
        SuperBlock::new(self.max_inum, self.max_dnum)
    }
}

/// it has the following layout:
/// - superblock
/// - inode bitmap
/// - data block bitmap
/// - inode table
/// - data region
///
/// This value owns all mutable state of one mounted filesystem.
#[derive(Debug)]
pub struct TinyFs<S = MmapMut> {
    /// the superblock of this filesystem
    superblock: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    /// block device holding the image
    store: BlockStore<S>,
}

/// mount and unmount an image file
impl TinyFs<MmapMut> {
    /// load the filesystem in `image_path`, formatting a new image with
    /// `options` if the file does not exist yet
    pub fn mount<P>(image_path: P, options: &FormatOptions) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let image_path = image_path.as_ref();
        if image_path.exists() {
            info!("loading filesystem from {image_path:?}");
            Self::load(BlockStore::open(image_path)?)
        } else {
            let total_blocks = options.layout()?.total_blocks();
            info!(
                "no image at {image_path:?}, formatting {}",
                Byte::from_bytes(total_blocks as u128 * super::BLOCK_SIZE as u128)
                    .get_appropriate_unit(true)
            );
            let formatted = Self::format(BlockStore::create(image_path, total_blocks)?, options);
            if formatted.is_err() {
                // leave no unformatted image behind
                if let Err(e) = std::fs::remove_file(image_path) {
                    warn!("failed to remove unformatted image {image_path:?}: {e}");
                }
            }
            formatted
        }
    }

    /// flush every block to the image file and close it
    pub fn unmount(self) -> Result<()> {
        self.sync()?;
        info!("filesystem unmounted");
        Ok(())
    }
}

impl TinyFs<Vec<u8>> {
    /// a formatted filesystem that lives only in memory
    pub fn in_memory(options: &FormatOptions) -> Result<Self> {
        let total_blocks = options.layout()?.total_blocks();
        Self::format(BlockStore::in_memory(total_blocks), options)
    }
}

impl<S> TinyFs<S>
where
    S: Storage,
{
    /// write a fresh filesystem onto `store`
    pub fn format(mut store: BlockStore<S>, options: &FormatOptions) -> Result<Self> {
        let superblock = options.layout()?;
        check_store_size(&store, &superblock)?;
        debug!("formatting with layout {superblock:?}");

        let mut buf = BlockBuf::zeroed();
        superblock.encode_into(&mut buf[..])?;
        store.write_block(0, &buf)?;

        // stale bytes in the inode table must not look like valid inodes
        buf.fill(0);
        for blk in superblock.i_start_blk..superblock.d_start_blk {
            store.write_block(blk, &buf)?;
        }

        let mut fs = TinyFs {
            inode_bitmap: Bitmap::new(
                "inodes",
                superblock.max_inum,
                superblock.i_bitmap_blk,
                superblock.d_bitmap_blk - superblock.i_bitmap_blk,
            ),
            data_bitmap: Bitmap::new(
                "data blocks",
                superblock.max_dnum,
                superblock.d_bitmap_blk,
                superblock.i_start_blk - superblock.d_bitmap_blk,
            ),
            superblock,
            store,
        };
        fs.create_root(options)?;
        fs.sync()?;
        info!(
            "formatted filesystem: {} inodes, {} data blocks",
            superblock.max_inum, superblock.max_dnum
        );
        Ok(fs)
    }

    /// rebuild the in-memory state of a formatted `store`,
    /// the bitmaps and inode table are trusted as they are
    pub fn load(store: BlockStore<S>) -> Result<Self> {
        let mut buf = BlockBuf::zeroed();
        store.read_block(0, &mut buf)?;
        let superblock = SuperBlock::decode_from(&buf[..])?;
        superblock.verify()?;
        check_store_size(&store, &superblock)?;
        debug!("loaded superblock {superblock:?}");

        let inode_bitmap = Bitmap::load(
            &store,
            "inodes",
            superblock.max_inum,
            superblock.i_bitmap_blk,
            superblock.d_bitmap_blk - superblock.i_bitmap_blk,
        )?;
        let data_bitmap = Bitmap::load(
            &store,
            "data blocks",
            superblock.max_dnum,
            superblock.d_bitmap_blk,
            superblock.i_start_blk - superblock.d_bitmap_blk,
        )?;
        Ok(TinyFs {
            superblock,
            inode_bitmap,
            data_bitmap,
            store,
        })
    }

    /// create root directory "/", holding only its "." entry
    fn create_root(&mut self, options: &FormatOptions) -> Result<()> {
        self.inode_bitmap.persist(&mut self.store)?;
        self.data_bitmap.persist(&mut self.store)?;
        self.inode_bitmap.occupy(&mut self.store, ROOT_INODE)?;
        self.data_bitmap.occupy(&mut self.store, 0)?;
        let root_blk = self.superblock.d_start_blk;

        let mut buf = BlockBuf::zeroed();
        Dirent::new(ROOT_INODE, b".")?.encode_into(&mut buf[..])?;
        self.store.write_block(root_blk, &buf)?;

        let mut root = Inode::new(ROOT_INODE, FileKind::Directory);
        root.direct_ptr[0] = root_blk;
        root.vstat.user_id = options.uid;
        root.vstat.group_id = options.gid;
        root.refresh_stat();
        self.write_inode(ROOT_INODE, &root)
    }

    /// flush written blocks to the backing storage
    pub fn sync(&self) -> Result<()> {
        Ok(self.store.flush()?)
    }
}

fn check_store_size<S: Storage>(store: &BlockStore<S>, superblock: &SuperBlock) -> Result<()> {
    if store.total_blocks() < superblock.total_blocks() {
        return Err(FsError::Corrupted(format!(
            "store holds {} blocks, layout needs {}",
            store.total_blocks(),
            superblock.total_blocks()
        )));
    }
    Ok(())
}

/// get [SuperBlock] and allocation counters of this filesystem
impl<S> TinyFs<S> {
    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    #[inline]
    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[inline]
    pub fn data_bitmap(&self) -> &Bitmap {
        &self.data_bitmap
    }

    /// give back the block device, for example to remount it
    pub fn into_store(self) -> BlockStore<S> {
        self.store
    }
}

/// [Inode] operations
impl<S> TinyFs<S>
where
    S: Storage,
{
    /// host block and byte offset of an inode slot
    #[inline]
    fn inode_position(&self, ino: u32) -> Result<(u32, usize)> {
        if ino >= self.superblock.max_inum {
            return Err(FsError::InvalidInode(ino));
        }
        let per_block = self.superblock.inodes_per_block();
        let block = self.superblock.i_start_blk + ino / per_block;
        let offset = (ino % per_block) as usize * INODE_SLOT_SIZE;
        Ok((block, offset))
    }

    /// read the record in slot `ino`, whether it is valid or not
    pub fn read_inode(&self, ino: u32) -> Result<Inode> {
        let (block, offset) = self.inode_position(ino)?;
        let mut buf = BlockBuf::zeroed();
        self.store.read_block(block, &mut buf)?;
        Inode::decode_from(&buf[offset..])
    }

    /// overwrite slot `ino`, keeping the other inodes of its block
    pub fn write_inode(&mut self, ino: u32, inode: &Inode) -> Result<()> {
        let (block, offset) = self.inode_position(ino)?;
        let mut buf = BlockBuf::zeroed();
        self.store.read_block(block, &mut buf)?;
        inode.encode_into(&mut buf[offset..])?;
        self.store.write_block(block, &buf)?;
        Ok(())
    }

    /// read an inode that must be live
    pub(crate) fn read_valid_inode(&self, ino: u32) -> Result<Inode> {
        let inode = self.read_inode(ino)?;
        if !inode.valid {
            return Err(FsError::NotFound);
        }
        Ok(inode)
    }
}

/// allocation and raw data block access
impl<S> TinyFs<S>
where
    S: Storage,
{
    pub(crate) fn allocate_inode(&mut self) -> Result<u32> {
        self.inode_bitmap.allocate(&mut self.store)
    }

    pub(crate) fn release_inode(&mut self, ino: u32) -> Result<()> {
        self.inode_bitmap.free(&mut self.store, ino)
    }

    /// allocate a data block, zero it on disk and return its block number
    pub(crate) fn allocate_data_block(&mut self) -> Result<u32> {
        let index = self.data_bitmap.allocate(&mut self.store)?;
        let block = self.superblock.d_start_blk + index;
        if let Err(e) = self.store.write_block(block, &BlockBuf::zeroed()) {
            self.data_bitmap.free(&mut self.store, index)?;
            return Err(e.into());
        }
        Ok(block)
    }

    pub(crate) fn release_data_block(&mut self, block: u32) -> Result<()> {
        if !self.superblock.data_region().contains(&block) {
            return Err(FsError::Corrupted(format!(
                "block pointer {block} is outside the data region"
            )));
        }
        let index = block - self.superblock.d_start_blk;
        self.data_bitmap.free(&mut self.store, index)
    }

    pub(crate) fn read_block(&self, block: u32, buf: &mut Block) -> Result<()> {
        Ok(self.store.read_block(block, buf)?)
    }

    pub(crate) fn write_block(&mut self, block: u32, buf: &Block) -> Result<()> {
        Ok(self.store.write_block(block, buf)?)
    }
}

#[cfg(test)]
pub(crate) fn test_fs() -> TinyFs<Vec<u8>> {
    TinyFs::in_memory(&FormatOptions {
        max_inum: 64,
        max_dnum: 1024,
        uid: 1000,
        gid: 1000,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DIRECT_POINTERS, INDIRECT_POINTERS};

    #[test]
    fn test_format_creates_root() {
        let fs = test_fs();
        let root = fs.read_inode(ROOT_INODE).unwrap();
        assert!(root.valid);
        assert!(root.is_dir());
        assert_eq!(root.link, 1);
        assert_eq!(root.vstat.user_id, 1000);
        assert_eq!(root.direct_ptr[0], fs.superblock().d_start_blk);
        assert!(root.direct_ptr[1..].iter().all(|p| *p == 0));

        assert!(fs.inode_bitmap().is_allocated(0));
        assert!(fs.data_bitmap().is_allocated(0));
        assert_eq!(fs.inode_bitmap().free_count(), 63);
        assert_eq!(fs.data_bitmap().free_count(), 1023);

        // every other inode slot is invalid
        assert!(!fs.read_inode(1).unwrap().valid);
        assert!(!fs.read_inode(63).unwrap().valid);
        assert!(matches!(fs.read_inode(64), Err(FsError::InvalidInode(64))));
    }

    #[test]
    fn test_load_reproduces_layout() {
        let fs = test_fs();
        let superblock = *fs.superblock();
        let reloaded = TinyFs::load(fs.into_store()).unwrap();
        assert_eq!(*reloaded.superblock(), superblock);
        assert!(reloaded.inode_bitmap().is_allocated(0));
        assert_eq!(reloaded.data_bitmap().free_count(), 1023);
    }

    #[test]
    fn test_load_rejects_unformatted_store() {
        let store = BlockStore::in_memory(16);
        assert!(matches!(TinyFs::load(store), Err(FsError::BadMagic(0))));
    }

    #[test]
    fn test_inode_round_trip_keeps_neighbours() {
        let mut fs = test_fs();
        let mut inode = Inode::new(17, FileKind::RegularFile);
        inode.size = 12345;
        inode.link = 3;
        inode.direct_ptr = [9; DIRECT_POINTERS];
        inode.indirect_ptr = [11; INDIRECT_POINTERS];
        inode.vstat.mode = 0o600;
        fs.write_inode(17, &inode).unwrap();

        let mut neighbour = Inode::new(18, FileKind::Directory);
        neighbour.size = 1;
        fs.write_inode(18, &neighbour).unwrap();

        // 16 and 17 share a block with 18
        assert_eq!(fs.read_inode(17).unwrap(), inode);
        assert_eq!(fs.read_inode(18).unwrap(), neighbour);
        assert!(!fs.read_inode(16).unwrap().valid);
    }

    #[test]
    fn test_data_blocks_are_numbered_in_the_data_region() {
        let mut fs = test_fs();
        let d_start = fs.superblock().d_start_blk;
        let first = fs.allocate_data_block().unwrap();
        let second = fs.allocate_data_block().unwrap();
        assert_eq!(first, d_start + 1);
        assert_eq!(second, d_start + 2);

        fs.release_data_block(first).unwrap();
        assert_eq!(fs.allocate_data_block().unwrap(), first);
        assert!(fs.release_data_block(0).is_err());
    }

    #[test]
    fn test_mount_formats_then_loads() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("DISKFILE");
        let options = FormatOptions {
            max_inum: 32,
            max_dnum: 128,
            uid: 0,
            gid: 0,
        };
        let fs = TinyFs::mount(&image, &options).unwrap();
        let superblock = *fs.superblock();
        fs.unmount().unwrap();
        assert!(image.exists());

        // the capacities come from the image now, not from the options
        let fs = TinyFs::mount(&image, &FormatOptions::default()).unwrap();
        assert_eq!(*fs.superblock(), superblock);
        assert!(fs.read_inode(ROOT_INODE).unwrap().valid);
    }

    #[test]
    fn test_mount_refuses_unusable_capacities_without_leaving_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("DISKFILE");
        for (max_inum, max_dnum) in [(0, 128), (32, 0), (32, u32::MAX)] {
            let options = FormatOptions {
                max_inum,
                max_dnum,
                uid: 0,
                gid: 0,
            };
            assert!(matches!(
                TinyFs::mount(&image, &options),
                Err(FsError::InvalidCapacity(_))
            ));
            assert!(!image.exists());
        }

        let options = FormatOptions {
            max_inum: 32,
            max_dnum: 128,
            uid: 0,
            gid: 0,
        };
        TinyFs::mount(&image, &options).unwrap().unmount().unwrap();
    }

    #[test]
    fn test_format_refuses_unusable_capacities() {
        let options = FormatOptions {
            max_inum: 0,
            max_dnum: 16,
            uid: 0,
            gid: 0,
        };
        assert!(matches!(
            TinyFs::format(BlockStore::in_memory(64), &options),
            Err(FsError::InvalidCapacity(_))
        ));
        assert!(TinyFs::in_memory(&options).is_err());
    }

    #[test]
    fn test_load_refuses_overflowing_superblock() {
        let mut store = test_fs().into_store();
        let mut buf = BlockBuf::zeroed();
        store.read_block(0, &mut buf).unwrap();
        let mut superblock = SuperBlock::decode_from(&buf[..]).unwrap();
        superblock.max_dnum = u32::MAX;
        superblock.encode_into(&mut buf[..]).unwrap();
        store.write_block(0, &buf).unwrap();

        assert!(matches!(TinyFs::load(store), Err(FsError::Corrupted(_))));
    }
}
