//! translate `/`-separated paths into inodes

use std::str::Split;

use crate::block_store::Storage;

use super::{FsError, Inode, Result, TinyFs, MAX_PATH_DEPTH, ROOT_INODE};

/// the non-empty components of a path, left to right.
///
/// Yields an [FsError::InvalidPath] and stops once more than
/// [MAX_PATH_DEPTH] components have been produced.
#[derive(Debug, Clone)]
pub struct Components<'a> {
    path: &'a str,
    parts: Split<'a, char>,
    depth: usize,
    done: bool,
}

impl<'a> Components<'a> {
    pub fn new(path: &'a str) -> Self {
        Self {
            path,
            parts: path.split('/'),
            depth: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for Components<'a> {
    type Item = Result<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let part = self.parts.by_ref().find(|part| !part.is_empty())?;
        self.depth += 1;
        if self.depth > MAX_PATH_DEPTH {
            self.done = true;
            return Some(Err(FsError::InvalidPath(format!(
                "{} is deeper than {MAX_PATH_DEPTH} components",
                self.path
            ))));
        }
        Some(Ok(part))
    }
}

/// split `path` into its parent path and final name
/// # Example
/// ```
/// use tinyfs::fs::path::split_parent;
/// assert_eq!(split_parent("/docs/readme.txt").unwrap(), ("/docs", "readme.txt"));
/// assert_eq!(split_parent("/docs/").unwrap(), ("/", "docs"));
/// ```
pub fn split_parent(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = trimmed.rsplit_once('/').unwrap_or(("", trimmed));
    if name.is_empty() {
        return Err(FsError::InvalidPath(format!("{path:?} has no final name")));
    }
    let parent = parent.trim_end_matches('/');
    Ok((if parent.is_empty() { "/" } else { parent }, name))
}

/// path resolution
impl<S> TinyFs<S>
where
    S: Storage,
{
    /// walk `path` from the root directory
    /// # Return
    /// the inode number and the live inode it names
    pub fn resolve(&self, path: &str) -> Result<(u32, Inode)> {
        let mut ino = ROOT_INODE;
        let mut inode = self.read_valid_inode(ROOT_INODE)?;
        let mut walked = false;
        for component in Components::new(path) {
            let component = component?;
            if !inode.is_dir() {
                return Err(FsError::NotADirectory);
            }
            ino = self.find_entry(&inode, component.as_bytes())?.ino;
            inode = self.read_valid_inode(ino)?;
            walked = true;
        }
        if !walked {
            ino = self.find_entry(&inode, b".")?.ino;
            inode = self.read_valid_inode(ino)?;
        }
        Ok((ino, inode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{test_fs, FileKind};

    fn add_dir(fs: &mut TinyFs<Vec<u8>>, parent: u32, name: &str) -> u32 {
        let ino = fs.allocate_inode().unwrap();
        let mut parent = fs.read_inode(parent).unwrap();
        fs.dir_add(&mut parent, ino, name.as_bytes()).unwrap();
        ino
    }

    #[test]
    fn test_components() {
        let parts: Vec<&str> = Components::new("//a///b/c/")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(parts, vec!["a", "b", "c"]);
        assert_eq!(Components::new("/").count(), 0);
        assert_eq!(Components::new("").count(), 0);
    }

    #[test]
    fn test_components_are_bounded() {
        let deepest = "d/".repeat(MAX_PATH_DEPTH);
        assert_eq!(
            Components::new(&deepest)
                .collect::<Result<Vec<_>>>()
                .unwrap()
                .len(),
            MAX_PATH_DEPTH
        );

        let too_deep = "d/".repeat(MAX_PATH_DEPTH + 1);
        let mut components = Components::new(&too_deep);
        assert!(matches!(
            components.nth(MAX_PATH_DEPTH),
            Some(Err(FsError::InvalidPath(_)))
        ));
        assert!(components.next().is_none());
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/a").unwrap(), ("/", "a"));
        assert_eq!(split_parent("a").unwrap(), ("/", "a"));
        assert_eq!(split_parent("/a/b/c").unwrap(), ("/a/b", "c"));
        assert_eq!(split_parent("/a//b").unwrap(), ("/a", "b"));
        assert!(split_parent("/").is_err());
        assert!(split_parent("").is_err());
    }

    #[test]
    fn test_resolve_nested() {
        let mut fs = test_fs();
        let a = add_dir(&mut fs, ROOT_INODE, "a");
        let b = add_dir(&mut fs, a, "b");
        let c = add_dir(&mut fs, b, "c");

        let (ino, inode) = fs.resolve("/a/b/c").unwrap();
        assert_eq!(ino, c);
        assert!(inode.is_dir());
        assert_eq!(fs.resolve("a/b").unwrap().0, b);
        assert_eq!(fs.resolve("/a/b/c/..").unwrap().0, b);
        assert_eq!(fs.resolve("/").unwrap().0, ROOT_INODE);
        assert_eq!(fs.resolve("").unwrap().0, ROOT_INODE);

        assert!(matches!(fs.resolve("/a/x/c"), Err(FsError::NotFound)));
        assert!(matches!(fs.resolve("/b"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_resolve_through_a_file() {
        let mut fs = test_fs();
        let file = fs.allocate_inode().unwrap();
        fs.write_inode(file, &Inode::new(file, FileKind::RegularFile))
            .unwrap();
        let mut root = fs.read_inode(ROOT_INODE).unwrap();
        fs.dir_add(&mut root, file, b"f").unwrap();

        assert_eq!(fs.resolve("/f").unwrap().0, file);
        assert!(matches!(
            fs.resolve("/f/inner"),
            Err(FsError::NotADirectory)
        ));
    }
}
