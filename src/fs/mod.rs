//! our tiny inode-based filesystem
pub mod bitmap;
pub mod directory;
pub mod error;
pub mod file_data;
pub mod filekind;
pub mod fs_layout;
pub mod inode;
pub mod operations;
pub mod path;
pub mod superblock;
mod fs_api_impl;
pub use bitmap::*;
pub use directory::*;
pub use error::{FsError, Result};
pub use filekind::*;
pub use fs_layout::*;
pub use inode::*;
pub use operations::*;
pub use superblock::*;

pub const FS_MAGIC: u32 = 0x5C3A;
pub const BLOCK_SIZE: usize = 4096;
/// default inode capacity
pub const MAX_INUM: u32 = 1024;
/// default data block capacity
pub const MAX_DNUM: u32 = 16384;
pub const ROOT_INODE: u32 = 0;
pub const DIRECT_POINTERS: usize = 16;
pub const INDIRECT_POINTERS: usize = 8;
/// block numbers held by one indirect block
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / std::mem::size_of::<u32>();
pub const INODE_SLOT_SIZE: usize = 256;
pub const DIRENT_SLOT_SIZE: usize = 256;
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SLOT_SIZE;
/// longest entry name in bytes
pub const NAME_MAX: usize = 208;
/// deepest path the resolver walks
pub const MAX_PATH_DEPTH: usize = 64;
