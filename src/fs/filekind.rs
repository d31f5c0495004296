use bincode::{Decode, Encode};

/// an enum to describe the type of a file
#[derive(Encode, Decode, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// an regular file
    #[default]
    RegularFile,
    /// a directory
    Directory,
}

impl FileKind {
    /// the `S_IFMT` bits of this kind
    pub fn mode_bits(self) -> u32 {
        match self {
            FileKind::RegularFile => libc::S_IFREG as u32,
            FileKind::Directory => libc::S_IFDIR as u32,
        }
    }
}

/// implement a trait to convert [FileKind] to [fuser::FileType]
impl From<FileKind> for fuser::FileType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::RegularFile => fuser::FileType::RegularFile,
            FileKind::Directory => fuser::FileType::Directory,
        }
    }
}
