use bincode::{Decode, Encode};
use std::time::UNIX_EPOCH;

use crate::utils::{
    time_util::{self, TimeDurationStruct},
    traits::OnDiskRecord,
};

use super::{
    filekind::FileKind, BLOCK_SIZE, DIRECT_POINTERS, INDIRECT_POINTERS, INODE_SLOT_SIZE,
};

/// attribute mirror, only used to answer attribute queries
#[derive(Encode, Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub user_id: u32,
    pub group_id: u32,
    /// permission bits, the file type lives in [Inode::kind]
    pub mode: u32,
    pub hard_links: u32,
    pub file_size: u64,
    pub block_size: u32,
    pub accessed_at: TimeDurationStruct,
    pub modified_at: TimeDurationStruct,
    pub metadata_changed_at: TimeDurationStruct,
}

#[derive(Encode, Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Inode {
    /// inode number, also its index in the inode bitmap
    pub ino: u32,
    /// a cleared flag means the slot holds no live inode
    pub valid: bool,
    pub kind: FileKind,
    /// size in bytes
    pub size: u64,
    pub link: u32,
    /// 0 means unallocated
    pub direct_ptr: [u32; DIRECT_POINTERS],
    /// each names a block of further direct block numbers
    pub indirect_ptr: [u32; INDIRECT_POINTERS],
    pub vstat: Stat,
}

impl OnDiskRecord for Inode {
    const SLOT_SIZE: usize = INODE_SLOT_SIZE;
}

/// Convert [Inode] to [FileAttr](fuser::FileAttr)
impl From<&Inode> for fuser::FileAttr {
    fn from(attrs: &Inode) -> Self {
        fuser::FileAttr {
            // FUSE reserves 0 and uses 1 for the root
            ino: attrs.ino as u64 + 1,
            size: attrs.size,
            blocks: attrs.size.div_ceil(BLOCK_SIZE as u64) * (BLOCK_SIZE as u64 / 512),
            atime: attrs.vstat.accessed_at.into(),
            mtime: attrs.vstat.modified_at.into(),
            ctime: attrs.vstat.metadata_changed_at.into(),
            crtime: UNIX_EPOCH,
            kind: attrs.kind.into(),
            perm: (attrs.vstat.mode & 0o7777) as u16,
            nlink: attrs.link,
            uid: attrs.vstat.user_id,
            gid: attrs.vstat.group_id,
            rdev: 0,
            blksize: attrs.vstat.block_size,
            flags: 0,
        }
    }
}

impl Inode {
    /// a fresh, valid inode with no blocks
    pub fn new(ino: u32, kind: FileKind) -> Self {
        let now = time_util::now();
        Inode {
            ino,
            valid: true,
            kind,
            link: 1,
            vstat: Stat {
                mode: match kind {
                    FileKind::Directory => 0o755,
                    FileKind::RegularFile => 0o644,
                },
                hard_links: 1,
                block_size: BLOCK_SIZE as u32,
                accessed_at: now,
                modified_at: now,
                metadata_changed_at: now,
                ..Stat::default()
            },
            ..Inode::default()
        }
    }

    /// an empty directory: link 2 for "." and the parent's entry
    pub fn directory_shell(ino: u32) -> Self {
        let mut inode = Inode::new(ino, FileKind::Directory);
        inode.link = 2;
        inode
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// copy size and link count into the attribute mirror
    pub fn refresh_stat(&mut self) {
        self.vstat.file_size = self.size;
        self.vstat.hard_links = self.link;
    }

    pub fn update_modified_at(&mut self) {
        let now = time_util::now();
        self.vstat.metadata_changed_at = now;
        self.vstat.modified_at = now;
    }

    pub fn update_changed_at(&mut self) {
        self.vstat.metadata_changed_at = time_util::now();
    }

    /// full `st_mode`: type bits and permission bits
    pub fn st_mode(&self) -> u32 {
        self.kind.mode_bits() | (self.vstat.mode & 0o7777)
    }

    /// every allocated direct pointer
    pub fn direct_blocks(&self) -> Vec<u32> {
        self.direct_ptr.iter().copied().filter(|b| *b != 0).collect()
    }
}
