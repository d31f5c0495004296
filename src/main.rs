use clap::Parser;
use tinyfs::cli_interface::TinyFsCli;
/// a CLI interface to users to choose create our filesystem,
/// or register it to `FUSE` and mount it.
///
/// The latter will block the program until we umount our filesystem ourselves,
///
/// or specify `--auto-unmount` when mounting this fs.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = TinyFsCli::parse();
    match args {
        //create a new file system
        TinyFsCli::Mkfs(args) => {
            tinyfs::mkfs::mkfs(args.image_file_path, args.inode_count, args.data_block_count)?;
        }
        //register a filesystem to `FUSE` and mount it
        TinyFsCli::Mount(args) => {
            tinyfs::mount::mount(
                args.image_file_path,
                args.mount_point,
                args.auto_unmount,
                args.allow_other,
            )?;
        }
    }
    Ok(())
}
