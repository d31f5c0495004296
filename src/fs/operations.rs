//! namespace operations built on the directory engine and the data mapper

use log::{debug, info};

use crate::{block_store::Storage, utils::time_util::TimeDurationStruct};

use super::{
    path::split_parent, validate_name, Dirent, FileKind, FsError, Inode, Result, TinyFs,
    BLOCK_SIZE, NAME_MAX, ROOT_INODE,
};

/// attribute changes of one setattr request, `None` keeps the current value
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// truncate or extend to this size
    pub size: Option<u64>,
    pub atime: Option<TimeDurationStruct>,
    pub mtime: Option<TimeDurationStruct>,
}

/// capacity and usage figures for statfs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub free_blocks: u64,
    pub files: u64,
    pub free_files: u64,
    pub block_size: u32,
    pub name_max: u32,
}

fn is_dot_entry(name: &[u8]) -> bool {
    name == b"." || name == b".."
}

/// inode based operations, used by the FUSE adapter
impl<S> TinyFs<S>
where
    S: Storage,
{
    /// find `name` in directory `parent`
    pub fn lookup_entry(&self, parent: u32, name: &[u8]) -> Result<(u32, Inode)> {
        let ino = self.dir_find(parent, name)?.ino;
        Ok((ino, self.read_valid_inode(ino)?))
    }

    /// create a file or an empty directory called `name` in `parent`
    /// # Params
    /// - `mode`: permission bits of the new node
    /// - `uid`, `gid`: its owner
    /// # Return
    /// the inode number and the inode as it was persisted
    pub fn make_node(
        &mut self,
        parent: u32,
        name: &[u8],
        kind: FileKind,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Result<(u32, Inode)> {
        validate_name(name)?;
        let mut parent_inode = self.read_valid_inode(parent)?;
        match self.find_entry(&parent_inode, name) {
            Ok(_) => return Err(FsError::DuplicateName),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let ino = self.allocate_inode()?;
        if let Err(e) = self.link_new_node(&mut parent_inode, ino, name, kind) {
            self.discard_node(ino)?;
            return Err(e);
        }

        let mut inode = self.read_inode(ino)?;
        inode.vstat.mode = mode & 0o7777;
        inode.vstat.user_id = uid;
        inode.vstat.group_id = gid;
        inode.refresh_stat();
        self.write_inode(ino, &inode)?;
        info!(
            "created {kind:?} {:?} as inode {ino} in directory {parent}",
            String::from_utf8_lossy(name)
        );
        Ok((ino, inode))
    }

    fn link_new_node(
        &mut self,
        parent: &mut Inode,
        ino: u32,
        name: &[u8],
        kind: FileKind,
    ) -> Result<()> {
        match kind {
            FileKind::RegularFile => {
                let mut file = Inode::new(ino, FileKind::RegularFile);
                file.refresh_stat();
                self.write_inode(ino, &file)?;
            }
            // an invalid slot makes dir_add build the directory shell
            FileKind::Directory => {
                let mut slot = self.read_inode(ino)?;
                if slot.valid {
                    slot.valid = false;
                    self.write_inode(ino, &slot)?;
                }
            }
        }
        self.dir_add(parent, ino, name)
    }

    /// free the blocks of `ino`, mark it invalid and give its number back
    fn discard_node(&mut self, ino: u32) -> Result<()> {
        let mut inode = self.read_inode(ino)?;
        if inode.valid {
            self.release_blocks(&mut inode)?;
            inode.valid = false;
            inode.update_changed_at();
            self.write_inode(ino, &inode)?;
        }
        self.release_inode(ino)
    }

    /// unlink a file or remove an empty directory
    pub fn remove_node(&mut self, parent: u32, name: &[u8], kind: FileKind) -> Result<()> {
        if is_dot_entry(name) {
            return Err(FsError::InvalidPath(format!(
                "cannot remove {:?}",
                String::from_utf8_lossy(name)
            )));
        }
        let mut parent_inode = self.read_valid_inode(parent)?;
        let entry = self.find_entry(&parent_inode, name)?;
        if entry.ino == ROOT_INODE {
            return Err(FsError::InvalidPath("cannot remove the root".into()));
        }
        let target = self.read_valid_inode(entry.ino)?;
        match kind {
            FileKind::RegularFile if target.is_dir() => return Err(FsError::IsADirectory),
            FileKind::Directory if !target.is_dir() => return Err(FsError::NotADirectory),
            FileKind::Directory => {
                let has_children = self
                    .read_dir(entry.ino)?
                    .iter()
                    .any(|dirent| !is_dot_entry(dirent.name()));
                if has_children {
                    return Err(FsError::NotEmpty);
                }
            }
            FileKind::RegularFile => {}
        }

        self.dir_remove(&mut parent_inode, name)?;
        self.discard_node(entry.ino)?;
        info!(
            "removed {kind:?} {:?} (inode {}) from directory {parent}",
            entry.name_os(),
            entry.ino
        );
        Ok(())
    }

    /// apply `changes` to `ino` and return the updated inode
    pub fn set_attr(&mut self, ino: u32, changes: &SetAttr) -> Result<Inode> {
        let mut inode = self.read_valid_inode(ino)?;
        if let Some(size) = changes.size {
            if inode.is_dir() {
                return Err(FsError::IsADirectory);
            }
            self.truncate(&mut inode, size)?;
        }
        if let Some(mode) = changes.mode {
            inode.vstat.mode = mode & 0o7777;
        }
        if let Some(uid) = changes.uid {
            inode.vstat.user_id = uid;
        }
        if let Some(gid) = changes.gid {
            inode.vstat.group_id = gid;
        }
        inode.update_changed_at();
        if let Some(atime) = changes.atime {
            inode.vstat.accessed_at = atime;
        }
        if let Some(mtime) = changes.mtime {
            inode.vstat.modified_at = mtime;
        }
        inode.refresh_stat();
        self.write_inode(ino, &inode)?;
        debug!("set attributes of inode {ino}: {changes:?}");
        Ok(inode)
    }

    pub fn stat_fs(&self) -> StatFs {
        StatFs {
            blocks: self.superblock().max_dnum as u64,
            free_blocks: self.data_bitmap().free_count() as u64,
            files: self.superblock().max_inum as u64,
            free_files: self.inode_bitmap().free_count() as u64,
            block_size: BLOCK_SIZE as u32,
            name_max: NAME_MAX as u32,
        }
    }
}

/// path based operations
impl<S> TinyFs<S>
where
    S: Storage,
{
    /// resolve the directory holding the last component of `path`
    fn resolve_parent<'p>(&self, path: &'p str) -> Result<(u32, &'p str)> {
        let (parent_path, name) = split_parent(path)?;
        let (parent, parent_inode) = self.resolve(parent_path)?;
        if !parent_inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((parent, name))
    }

    pub fn getattr(&self, path: &str) -> Result<Inode> {
        self.resolve(path).map(|(_, inode)| inode)
    }

    /// create an empty directory owned by the current user
    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<u32> {
        let (parent, name) = self.resolve_parent(path)?;
        let (ino, _) = self.make_node(
            parent,
            name.as_bytes(),
            FileKind::Directory,
            mode,
            users::get_effective_uid(),
            users::get_effective_gid(),
        )?;
        Ok(ino)
    }

    /// create an empty regular file owned by the current user
    pub fn create(&mut self, path: &str, mode: u32) -> Result<u32> {
        let (parent, name) = self.resolve_parent(path)?;
        let (ino, _) = self.make_node(
            parent,
            name.as_bytes(),
            FileKind::RegularFile,
            mode,
            users::get_effective_uid(),
            users::get_effective_gid(),
        )?;
        Ok(ino)
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        self.remove_node(parent, name.as_bytes(), FileKind::RegularFile)
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        self.remove_node(parent, name.as_bytes(), FileKind::Directory)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<Dirent>> {
        let (ino, _) = self.resolve(path)?;
        self.read_dir(ino)
    }

    pub fn read_file(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        let (_, inode) = self.resolve(path)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.read_data(&inode, buf, offset)
    }

    pub fn write_file(&mut self, path: &str, data: &[u8], offset: u64) -> Result<usize> {
        let (_, mut inode) = self.resolve(path)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.write_data(&mut inode, data, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{test_fs, FormatOptions};

    fn names(entries: &[Dirent]) -> Vec<String> {
        entries
            .iter()
            .map(|d| String::from_utf8_lossy(d.name()).into_owned())
            .collect()
    }

    fn check_readme<S: Storage>(fs: &TinyFs<S>) {
        let mut buf = [0u8; 5];
        assert_eq!(fs.read_file("/docs/readme.txt", &mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        let attr = fs.getattr("/docs/readme.txt").unwrap();
        assert_eq!(attr.size, 5);
        assert_eq!(attr.vstat.file_size, 5);
        assert_eq!(attr.kind, FileKind::RegularFile);
        assert!(fs.getattr("/docs").unwrap().is_dir());
    }

    #[test]
    fn test_end_to_end_with_remount() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("DISKFILE");
        let options = FormatOptions {
            max_inum: 64,
            max_dnum: 256,
            uid: 0,
            gid: 0,
        };

        let mut fs = TinyFs::mount(&image, &options).unwrap();
        fs.mkdir("/docs", 0o755).unwrap();
        fs.create("/docs/readme.txt", 0o644).unwrap();
        assert_eq!(fs.write_file("/docs/readme.txt", b"hello", 0).unwrap(), 5);
        check_readme(&fs);
        fs.unmount().unwrap();

        let fs = TinyFs::mount(&image, &options).unwrap();
        check_readme(&fs);
        assert_eq!(names(&fs.list_dir("/").unwrap()), vec![".", "docs"]);
        assert_eq!(
            names(&fs.list_dir("/docs").unwrap()),
            vec!["..", ".", "readme.txt"]
        );
    }

    #[test]
    fn test_make_node_sets_owner_and_mode() {
        let mut fs = test_fs();
        let (ino, inode) = fs
            .make_node(ROOT_INODE, b"script.sh", FileKind::RegularFile, 0o100755, 42, 7)
            .unwrap();
        assert_eq!(inode.vstat.mode, 0o755);
        assert_eq!(inode.vstat.user_id, 42);
        assert_eq!(inode.vstat.group_id, 7);
        assert_eq!(fs.read_inode(ino).unwrap(), inode);
        assert_eq!(fs.lookup_entry(ROOT_INODE, b"script.sh").unwrap(), (ino, inode));
    }

    #[test]
    fn test_refused_make_node_leaves_bitmaps_alone() {
        let mut fs = test_fs();
        fs.mkdir("/a", 0o755).unwrap();
        let free_inodes = fs.inode_bitmap().free_count();
        let free_blocks = fs.data_bitmap().free_count();

        assert!(matches!(fs.mkdir("/a", 0o755), Err(FsError::DuplicateName)));
        assert!(matches!(fs.create("/a", 0o644), Err(FsError::DuplicateName)));
        assert!(matches!(fs.mkdir("/missing/b", 0o755), Err(FsError::NotFound)));
        assert_eq!(fs.inode_bitmap().free_count(), free_inodes);
        assert_eq!(fs.data_bitmap().free_count(), free_blocks);
    }

    #[test]
    fn test_directory_link_counts() {
        let mut fs = test_fs();
        fs.mkdir("/a", 0o755).unwrap();
        assert_eq!(fs.getattr("/").unwrap().link, 2);
        assert_eq!(fs.getattr("/a").unwrap().link, 2);

        fs.create("/a/f", 0o644).unwrap();
        assert_eq!(fs.getattr("/a").unwrap().link, 3);
        assert_eq!(fs.getattr("/a/f").unwrap().link, 1);

        fs.unlink("/a/f").unwrap();
        assert_eq!(fs.getattr("/a").unwrap().link, 2);
        fs.rmdir("/a").unwrap();
        assert_eq!(fs.getattr("/").unwrap().link, 1);
    }

    #[test]
    fn test_unlink_releases_every_block() {
        let mut fs = test_fs();
        let free_inodes = fs.inode_bitmap().free_count();
        let free_blocks = fs.data_bitmap().free_count();

        fs.create("/big", 0o644).unwrap();
        let data = vec![7u8; 20 * BLOCK_SIZE];
        fs.write_file("/big", &data, 0).unwrap();
        assert_eq!(fs.data_bitmap().free_count(), free_blocks - 21);

        fs.unlink("/big").unwrap();
        assert_eq!(fs.inode_bitmap().free_count(), free_inodes);
        assert_eq!(fs.data_bitmap().free_count(), free_blocks);
        assert!(matches!(fs.getattr("/big"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_freed_inode_is_reused_as_fresh_directory() {
        let mut fs = test_fs();
        let file = fs.create("/f", 0o644).unwrap();
        fs.write_file("/f", b"old content", 0).unwrap();
        fs.unlink("/f").unwrap();
        assert!(!fs.read_inode(file).unwrap().valid);

        let dir = fs.mkdir("/d", 0o755).unwrap();
        assert_eq!(dir, file);
        let inode = fs.getattr("/d").unwrap();
        assert!(inode.is_dir());
        assert_eq!(inode.size, 0);
        assert_eq!(inode.link, 2);
        assert_eq!(names(&fs.list_dir("/d").unwrap()), vec!["..", "."]);
    }

    #[test]
    fn test_remove_refusals() {
        let mut fs = test_fs();
        fs.mkdir("/dir", 0o755).unwrap();
        fs.create("/dir/file", 0o644).unwrap();

        assert!(matches!(fs.rmdir("/dir"), Err(FsError::NotEmpty)));
        assert!(matches!(fs.unlink("/dir"), Err(FsError::IsADirectory)));
        assert!(matches!(fs.rmdir("/dir/file"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.rmdir("/"), Err(FsError::InvalidPath(_))));
        assert!(matches!(fs.rmdir("/dir/."), Err(FsError::InvalidPath(_))));
        assert!(matches!(fs.unlink("/nothing"), Err(FsError::NotFound)));

        fs.unlink("/dir/file").unwrap();
        fs.rmdir("/dir").unwrap();
        assert_eq!(names(&fs.list_dir("/").unwrap()), vec!["."]);
    }

    #[test]
    fn test_resolve_needs_every_hop() {
        let mut fs = test_fs();
        fs.mkdir("/a", 0o755).unwrap();
        fs.mkdir("/a/b", 0o755).unwrap();
        assert!(matches!(fs.getattr("/a/b/c"), Err(FsError::NotFound)));
        let c = fs.mkdir("/a/b/c", 0o755).unwrap();
        assert_eq!(fs.resolve("/a/b/c").unwrap().0, c);
        fs.rmdir("/a/b/c").unwrap();
        assert!(matches!(fs.resolve("/a/b/c"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_set_attr() {
        let mut fs = test_fs();
        let ino = fs.create("/f", 0o644).unwrap();
        fs.write_file("/f", &[1u8; 3 * BLOCK_SIZE], 0).unwrap();
        let mtime = TimeDurationStruct { sec: 10, nsec: 5 };

        let inode = fs
            .set_attr(
                ino,
                &SetAttr {
                    mode: Some(0o600),
                    uid: Some(5),
                    size: Some(10),
                    mtime: Some(mtime),
                    ..SetAttr::default()
                },
            )
            .unwrap();
        assert_eq!(inode.size, 10);
        assert_eq!(inode.vstat.mode, 0o600);
        assert_eq!(inode.vstat.user_id, 5);
        assert_eq!(inode.vstat.modified_at, mtime);
        assert_eq!(inode.direct_blocks().len(), 1);
        assert_eq!(fs.read_inode(ino).unwrap(), inode);

        let root_size = SetAttr {
            size: Some(0),
            ..SetAttr::default()
        };
        assert!(matches!(
            fs.set_attr(ROOT_INODE, &root_size),
            Err(FsError::IsADirectory)
        ));
    }

    #[test]
    fn test_stat_fs() {
        let mut fs = test_fs();
        let before = fs.stat_fs();
        assert_eq!(before.blocks, 1024);
        assert_eq!(before.free_blocks, 1023);
        assert_eq!(before.files, 64);
        assert_eq!(before.free_files, 63);

        fs.mkdir("/x", 0o755).unwrap();
        let after = fs.stat_fs();
        assert_eq!(after.free_blocks, 1022);
        assert_eq!(after.free_files, 62);
    }

    #[test]
    fn test_file_operations_on_directories() {
        let mut fs = test_fs();
        fs.mkdir("/d", 0o755).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            fs.read_file("/d", &mut buf, 0),
            Err(FsError::IsADirectory)
        ));
        assert!(matches!(
            fs.write_file("/d", b"x", 0),
            Err(FsError::IsADirectory)
        ));
    }
}
