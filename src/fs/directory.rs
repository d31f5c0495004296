use bincode::{Decode, Encode};
use log::debug;
use std::{ffi::OsStr, ops::ControlFlow, os::unix::ffi::OsStrExt};

use crate::{
    block_store::{BlockBuf, Storage},
    utils::traits::OnDiskRecord,
};

use super::{
    FsError, Inode, Result, TinyFs, DIRENTS_PER_BLOCK, DIRENT_SLOT_SIZE, NAME_MAX,
};

/// a directory entry, stored in a fixed slot of a directory data block
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    /// inode number of the child
    pub ino: u32,
    /// a cleared flag marks a tombstone, free for reuse
    pub valid: bool,
    /// bytes of `name` in use
    pub len: u16,
    pub name: [u8; NAME_MAX],
}

impl OnDiskRecord for Dirent {
    const SLOT_SIZE: usize = DIRENT_SLOT_SIZE;
}

impl Dirent {
    /// a live entry mapping `name` to `ino`
    pub fn new(ino: u32, name: &[u8]) -> Result<Self> {
        validate_name(name)?;
        let mut buf = [0u8; NAME_MAX];
        buf[..name.len()].copy_from_slice(name);
        Ok(Self {
            ino,
            valid: true,
            len: name.len() as u16,
            name: buf,
        })
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..(self.len as usize).min(NAME_MAX)]
    }

    pub fn name_os(&self) -> &OsStr {
        OsStr::from_bytes(self.name())
    }
}

/// check that `name` can be stored in one directory entry
pub fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name.len() > NAME_MAX || name.iter().any(|b| *b == b'/' || *b == 0) {
        return Err(FsError::InvalidName(
            String::from_utf8_lossy(name).into_owned(),
        ));
    }
    Ok(())
}

/// where an entry lives: block number and slot index
type SlotPosition = (u32, usize);

/// directory operations
impl<S> TinyFs<S>
where
    S: Storage,
{
    /// visit the slots of every allocated block of `dir` in pointer order,
    /// stopping at the first [ControlFlow::Break]
    fn scan_slots<T>(
        &self,
        dir: &Inode,
        mut visit: impl FnMut(SlotPosition, Dirent) -> ControlFlow<T>,
    ) -> Result<Option<T>> {
        if !dir.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let mut buf = BlockBuf::zeroed();
        for block in dir.direct_blocks() {
            self.read_block(block, &mut buf)?;
            for slot in 0..DIRENTS_PER_BLOCK {
                let dirent = Dirent::decode_from(&buf[slot * DIRENT_SLOT_SIZE..])?;
                if let ControlFlow::Break(found) = visit((block, slot), dirent) {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn find_slot(&self, dir: &Inode, name: &[u8]) -> Result<Option<(SlotPosition, Dirent)>> {
        self.scan_slots(dir, |position, dirent| {
            if dirent.valid && dirent.name() == name {
                ControlFlow::Break((position, dirent))
            } else {
                ControlFlow::Continue(())
            }
        })
    }

    /// look `name` up in directory `dir_ino`
    pub fn dir_find(&self, dir_ino: u32, name: &[u8]) -> Result<Dirent> {
        let dir = self.read_valid_inode(dir_ino)?;
        self.find_entry(&dir, name)
    }

    /// look `name` up in an inode already read
    pub(crate) fn find_entry(&self, dir: &Inode, name: &[u8]) -> Result<Dirent> {
        self.find_slot(dir, name)?
            .map(|(_, dirent)| dirent)
            .ok_or(FsError::NotFound)
    }

    /// every live entry of `dir_ino` in pointer and slot order
    pub fn read_dir(&self, dir_ino: u32) -> Result<Vec<Dirent>> {
        let dir = self.read_valid_inode(dir_ino)?;
        let mut entries = Vec::new();
        self.scan_slots::<()>(&dir, |_, dirent| {
            if dirent.valid {
                entries.push(dirent);
            }
            ControlFlow::Continue(())
        })?;
        Ok(entries)
    }

    /// insert `name -> child_ino` into `parent`.
    ///
    /// If the child inode is not valid yet, it is built as an empty
    /// directory holding ".." and ".". The parent record is updated in place
    /// and persisted.
    pub fn dir_add(&mut self, parent: &mut Inode, child_ino: u32, name: &[u8]) -> Result<()> {
        validate_name(name)?;
        if self.find_slot(parent, name)?.is_some() {
            return Err(FsError::DuplicateName);
        }

        let tombstone = self.scan_slots(parent, |position, dirent| {
            if dirent.valid {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(position)
            }
        })?;
        let (position, new_pointer) = match tombstone {
            Some(position) => (position, None),
            None => {
                let index = parent
                    .direct_ptr
                    .iter()
                    .position(|p| *p == 0)
                    .ok_or(FsError::DirectoryFull)?;
                let block = self.allocate_data_block()?;
                ((block, 0), Some(index))
            }
        };

        if let Err(e) = self.prepare_child(child_ino, parent.ino) {
            if new_pointer.is_some() {
                self.release_data_block(position.0)?;
            }
            return Err(e);
        }

        let (block, slot) = position;
        let mut buf = BlockBuf::zeroed();
        self.read_block(block, &mut buf)?;
        Dirent::new(child_ino, name)?.encode_into(&mut buf[slot * DIRENT_SLOT_SIZE..])?;
        self.write_block(block, &buf)?;

        if let Some(index) = new_pointer {
            parent.direct_ptr[index] = block;
        }
        parent.link += 1;
        parent.update_modified_at();
        parent.refresh_stat();
        self.write_inode(parent.ino, parent)?;
        debug!(
            "added {:?} -> {child_ino} to directory {} at block {block} slot {slot}",
            String::from_utf8_lossy(name),
            parent.ino
        );
        Ok(())
    }

    /// build an empty directory in `child_ino` unless it already holds a live inode
    fn prepare_child(&mut self, child_ino: u32, parent_ino: u32) -> Result<()> {
        if self.read_inode(child_ino)?.valid {
            return Ok(());
        }
        let block = self.allocate_data_block()?;
        if let Err(e) = self.seed_directory(block, child_ino, parent_ino) {
            self.release_data_block(block)?;
            return Err(e);
        }
        Ok(())
    }

    fn seed_directory(&mut self, block: u32, child_ino: u32, parent_ino: u32) -> Result<()> {
        let mut buf = BlockBuf::zeroed();
        Dirent::new(parent_ino, b"..")?.encode_into(&mut buf[..])?;
        Dirent::new(child_ino, b".")?.encode_into(&mut buf[DIRENT_SLOT_SIZE..])?;
        self.write_block(block, &buf)?;

        let mut shell = Inode::directory_shell(child_ino);
        shell.direct_ptr[0] = block;
        shell.refresh_stat();
        self.write_inode(child_ino, &shell)
    }

    /// tombstone the entry `name` of `parent` and return it as it was
    pub fn dir_remove(&mut self, parent: &mut Inode, name: &[u8]) -> Result<Dirent> {
        let ((block, slot), dirent) = self
            .find_slot(parent, name)?
            .ok_or(FsError::NotFound)?;

        let mut buf = BlockBuf::zeroed();
        self.read_block(block, &mut buf)?;
        let tombstone = Dirent {
            valid: false,
            ..dirent.clone()
        };
        tombstone.encode_into(&mut buf[slot * DIRENT_SLOT_SIZE..])?;
        self.write_block(block, &buf)?;

        parent.link = parent.link.saturating_sub(1);
        parent.update_modified_at();
        parent.refresh_stat();
        self.write_inode(parent.ino, parent)?;
        debug!(
            "removed {:?} from directory {}",
            dirent.name_os(),
            parent.ino
        );
        Ok(dirent)
    }
}
