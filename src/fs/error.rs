use thiserror::Error;

/// everything the storage engine can refuse or fail with
#[derive(Debug, Error)]
pub enum FsError {
    /// missing path component, directory entry or inode
    #[error("no such file or directory")]
    NotFound,
    /// no free index remains in a bitmap
    #[error("no free {0} left")]
    Exhausted(&'static str),
    #[error("name already exists in the directory")]
    DuplicateName,
    /// every direct pointer of the directory is used and every slot is live
    #[error("directory has no free entry slot")]
    DirectoryFull,
    #[error("block store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode an on-disk record: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode an on-disk record: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory is not empty")]
    NotEmpty,
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("inode {0} is out of range")]
    InvalidInode(u32),
    /// capacities that cannot be laid out in a `u32` block space
    #[error("invalid capacities: {0}")]
    InvalidCapacity(String),
    #[error("offset is beyond the maximum file size")]
    FileTooLarge,
    #[error("bad superblock magic {0:#x}")]
    BadMagic(u32),
    #[error("filesystem is corrupted: {0}")]
    Corrupted(String),
}

impl FsError {
    /// the errno reported to the kernel for this error
    pub fn errno(&self) -> libc::c_int {
        match self {
            Self::NotFound | Self::InvalidInode(_) => libc::ENOENT,
            Self::Exhausted(_) | Self::DirectoryFull => libc::ENOSPC,
            Self::DuplicateName => libc::EEXIST,
            Self::Io(_) | Self::Encode(_) | Self::Decode(_) | Self::BadMagic(_) => libc::EIO,
            Self::Corrupted(_) => libc::EIO,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::InvalidName(name) if name.len() > super::NAME_MAX => libc::ENAMETOOLONG,
            Self::InvalidName(_) | Self::InvalidPath(_) | Self::InvalidCapacity(_) => libc::EINVAL,
            Self::FileTooLarge => libc::EFBIG,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
