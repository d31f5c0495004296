use clap::Parser;

use crate::fs::{MAX_DNUM, MAX_INUM};

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum TinyFsCli {
    /// create a new file system
    Mkfs(MkfsArgs),
    /// register a filesystem to `FUSE` and mount it
    Mount(MountArgs),
}
///make a new fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "make a new file system")]
pub struct MkfsArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the inode count of the file system
    #[clap(short, long, default_value_t = MAX_INUM)]
    pub inode_count: u32,
    /// the data block count of the file system
    #[clap(short, long, default_value_t = MAX_DNUM)]
    pub data_block_count: u32,
}

/// mount a fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "mount a file system, formatting the image if it does not exist")]
pub struct MountArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the mount point of the file system
    #[clap(short, long)]
    pub mount_point: String,
    /// unmount automatically when the process exits
    #[clap(long)]
    pub auto_unmount: bool,
    /// let other users access the mounted filesystem
    #[clap(long)]
    pub allow_other: bool,
}

/// test the `TinyFsCli` struct
/// test `mkfs` subcommand
#[cfg(test)]
mod mkfs_parse_args_tests {
    use super::*;
    /// test short parameter form
    #[test]
    fn test_short_parameter_form() {
        let args = TinyFsCli::parse_from(["tinyfs", "mkfs", "-p", "test", "-i", "64", "-d", "512"]);
        assert_eq!(
            args,
            TinyFsCli::Mkfs(MkfsArgs {
                image_file_path: "test".to_string(),
                inode_count: 64,
                data_block_count: 512,
            })
        );
    }
    /// test long parameter form
    #[test]
    fn test_long_parameter_form() {
        let image_file_path_name = concat!("--", "image-file-path");
        let args = TinyFsCli::parse_from([
            "tinyfs",
            "mkfs",
            image_file_path_name,
            "test",
            "--inode-count",
            "3172",
            "--data-block-count",
            "4096",
        ]);
        assert_eq!(
            args,
            TinyFsCli::Mkfs(MkfsArgs {
                image_file_path: "test".to_string(),
                inode_count: 3172,
                data_block_count: 4096,
            })
        );
    }
    #[test]
    fn test_default_capacities() {
        let args = TinyFsCli::parse_from(["tinyfs", "mkfs", "-p", "test"]);
        assert_eq!(
            args,
            TinyFsCli::Mkfs(MkfsArgs {
                image_file_path: "test".to_string(),
                inode_count: MAX_INUM,
                data_block_count: MAX_DNUM,
            })
        );
    }
}

/// test the `TinyFsCli` struct
/// test `mount` subcommand
#[cfg(test)]
mod mount_parse_args_tests {
    use super::*;
    /// test short parameter form
    #[test]
    fn test_short_parameter_form() {
        let args = TinyFsCli::parse_from(["tinyfs", "mount", "-p", "test", "-m", "test"]);
        assert_eq!(
            args,
            TinyFsCli::Mount(MountArgs {
                image_file_path: "test".to_string(),
                mount_point: "test".to_string(),
                auto_unmount: false,
                allow_other: false,
            })
        );
    }
    /// test long parameter form
    #[test]
    fn test_long_parameter_form() {
        let image_file_path_name = concat!("--", "image-file-path");
        let args = TinyFsCli::parse_from([
            "tinyfs",
            "mount",
            image_file_path_name,
            "test",
            "--mount-point",
            "test",
            "--auto-unmount",
            "--allow-other",
        ]);
        assert_eq!(
            args,
            TinyFsCli::Mount(MountArgs {
                image_file_path: "test".to_string(),
                mount_point: "test".to_string(),
                auto_unmount: true,
                allow_other: true,
            })
        );
    }
}
