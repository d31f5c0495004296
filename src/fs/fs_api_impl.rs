use std::{ffi::OsStr, os::unix::ffi::OsStrExt, time::Duration};

use crate::{
    block_store::Storage,
    fs::{Dirent, FileKind, SetAttr},
    utils::time_util::{self, TimeDurationStruct},
};

use super::TinyFs;

use fuser::{Filesystem, TimeOrNow};

use log::{error, info, warn};

const TTL: Duration = Duration::new(0, 0);

/// FUSE reserves inode 0 and numbers the root 1, ours starts at 0
fn engine_ino(ino: u64) -> Option<u32> {
    ino.checked_sub(1).and_then(|ino| u32::try_from(ino).ok())
}

fn time_or_now(time: TimeOrNow) -> anyhow::Result<TimeDurationStruct> {
    match time {
        TimeOrNow::SpecificTime(time) => time.try_into(),
        TimeOrNow::Now => Ok(time_util::now()),
    }
}

impl<S> TinyFs<S>
where
    S: Storage,
{
    /// the live entries of directory `ino`, each with the kind of its child
    fn typed_entries(&self, ino: u32) -> super::Result<Vec<(Dirent, FileKind)>> {
        self.read_dir(ino)?
            .into_iter()
            .map(|entry| {
                let kind = self.read_inode(entry.ino)?.kind;
                Ok::<_, super::FsError>((entry, kind))
            })
            .collect()
    }
}

impl<S> Filesystem for TinyFs<S>
where
    S: Storage,
{
    // to init the filesystem
    fn init(
        &mut self,
        _req: &fuser::Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        info!("init() called, layout: {:?}", self.superblock());
        Ok(())
    }

    // to umount the filesystem
    fn destroy(&mut self) {
        info!("destroy() called");
        if let Err(e) = self.sync() {
            error!("failed to flush the image: {e}");
        }
    }

    // to show FS information
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let stat = self.stat_fs();
        // every inode is a file node
        reply.statfs(
            stat.blocks,
            stat.free_blocks,
            stat.free_blocks,
            stat.files,
            stat.free_files,
            stat.block_size,
            stat.name_max,
            stat.block_size,
        )
    }

    // to look up a file
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        info!("lookup() called with parent inode number: {parent} and name: {name:?}");
        let Some(parent) = engine_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.lookup_entry(parent, name.as_bytes()) {
            Ok((_, inode)) => reply.entry(&TTL, &(&inode).into(), 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &fuser::Request<'_>, ino: u64, reply: fuser::ReplyAttr) {
        info!("getattr() called with inode number: {:?}", ino);
        let Some(ino) = engine_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.read_valid_inode(ino) {
            Ok(inode) => reply.attr(&TTL, &(&inode).into()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        info!(
            "setattr() called with inode number: {:?}, mode: {:?}, uid: {:?}, gid: {:?}, size: {:?}, atime: {:?}, mtime: {:?}, fh: {:?}",
            ino, mode, uid, gid, size, atime, mtime, fh
        );
        let Some(ino) = engine_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let (Ok(atime), Ok(mtime)) = (
            atime.map(time_or_now).transpose(),
            mtime.map(time_or_now).transpose(),
        ) else {
            reply.error(libc::EINVAL);
            return;
        };
        let changes = SetAttr {
            mode,
            uid,
            gid,
            size,
            atime,
            mtime,
        };
        match self.set_attr(ino, &changes) {
            Ok(inode) => reply.attr(&TTL, &(&inode).into()),
            Err(e) => {
                warn!("setattr() on inode {ino} refused: {e}");
                reply.error(e.errno());
            }
        }
    }

    fn opendir(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        info!("opendir() called with inode number: {ino}, flags: {flags:?}");
        let Some(ino) = engine_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.read_valid_inode(ino) {
            Ok(inode) if inode.is_dir() => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e.errno()),
        }
    }

    // to read a dir
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        info!("readdir() called with inode number: {ino}");
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let Some(ino) = engine_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.typed_entries(ino) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("readdir() of inode {ino} failed: {e}");
                reply.error(e.errno());
                return;
            }
        };
        for (index, (entry, kind)) in entries.iter().enumerate().skip(offset as usize) {
            let buffer_full: bool = reply.add(
                entry.ino as u64 + 1,
                index as i64 + 1,
                (*kind).into(),
                entry.name_os(),
            );

            if buffer_full {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        reply: fuser::ReplyEmpty,
    ) {
        info!("releasedir() called with inode number: {ino}");
        reply.ok();
    }

    // to create a dir
    fn mkdir(
        &mut self,
        req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        info!("mkdir() called with parent inode number: {parent} and name: {name:?}");
        let Some(parent) = engine_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.make_node(
            parent,
            name.as_bytes(),
            FileKind::Directory,
            mode & !umask,
            req.uid(),
            req.gid(),
        ) {
            Ok((_, inode)) => reply.entry(&TTL, &(&inode).into(), 0),
            Err(e) => {
                warn!("mkdir() of {name:?} refused: {e}");
                reply.error(e.errno());
            }
        }
    }

    // to remove a dir
    fn rmdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        info!("rmdir() called with parent inode number: {parent} and name: {name:?}");
        let Some(parent) = engine_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.remove_node(parent, name.as_bytes(), FileKind::Directory) {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!("rmdir() of {name:?} refused: {e}");
                reply.error(e.errno());
            }
        }
    }

    // to create a new file
    fn create(
        &mut self,
        req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mut mode: u32,
        umask: u32,
        flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        info!("create() called with parent inode number: {parent} and name: {name:?}");
        let Some(parent) = engine_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if req.uid() != 0 {
            mode &= !(libc::S_ISUID | libc::S_ISGID) as u32;
        }
        match self.make_node(
            parent,
            name.as_bytes(),
            FileKind::RegularFile,
            mode & !umask,
            req.uid(),
            req.gid(),
        ) {
            Ok((_, inode)) => reply.created(&TTL, &(&inode).into(), 0, 0, flags as u32),
            Err(e) => {
                warn!("create() of {name:?} refused: {e}");
                reply.error(e.errno());
            }
        }
    }

    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        info!("open() called with inode number: {ino}, flags: {flags:?}");
        let Some(ino) = engine_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.read_valid_inode(ino) {
            Ok(inode) if inode.is_dir() => reply.error(libc::EISDIR),
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    // to read from a file
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        info!(
            "read() called with inode number: {:?}, fh: {:?}, offset: {:?}, size: {:?}, flags: {:?}, lock_owner: {:?}",
            ino, fh, offset, size, flags, lock_owner
        );
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let Some(ino) = engine_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let inode = match self.read_valid_inode(ino) {
            Ok(inode) if inode.is_dir() => {
                reply.error(libc::EISDIR);
                return;
            }
            Ok(inode) => inode,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        let mut buf = vec![0u8; size as usize];
        match self.read_data(&inode, &mut buf, offset as u64) {
            Ok(read) => reply.data(&buf[..read]),
            Err(e) => reply.error(e.errno()),
        }
    }

    // to write to a file
    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        info!(
            "write() called with inode number: {:?}, fh: {:?}, offset: {:?}, len: {:?}, write_flags: {:?}, flags: {:?}, lock_owner: {:?}",
            ino, fh, offset, data.len(), write_flags, flags, lock_owner
        );

        // if offset < 0, return EINVAL
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let Some(ino) = engine_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut inode = match self.read_valid_inode(ino) {
            Ok(inode) if inode.is_dir() => {
                reply.error(libc::EISDIR);
                return;
            }
            Ok(inode) => inode,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        match self.write_data(&mut inode, data, offset as u64) {
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                warn!("write() to inode {ino} failed: {e}");
                reply.error(e.errno());
            }
        }
    }

    // to delete a file
    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        info!("unlink() called with parent inode number: {parent} and name: {name:?}");
        let Some(parent) = engine_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.remove_node(parent, name.as_bytes(), FileKind::RegularFile) {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!("unlink() of {name:?} refused: {e}");
                reply.error(e.errno());
            }
        }
    }
}
