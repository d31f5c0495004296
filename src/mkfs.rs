//! create our filesystem
use crate::{
    block_store::BlockStore,
    fs::{FormatOptions, TinyFs, BLOCK_SIZE},
};
use anyhow::{anyhow, Context};
use byte_unit::Byte;
use log::info;
use std::path::Path;

/// create a new filesystem image, given the path of the image file and its capacities
/// # Params
/// - `image_file_path`: the path of the image file, it must not exist yet
/// - `inode_count`: the number of inodes
/// - `data_block_count`: the number of data blocks
///
/// # Return
/// an [anyhow::Result] type to indicate whether the operation is successful
pub fn mkfs<P>(image_file_path: P, inode_count: u32, data_block_count: u32) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let image_file_path = image_file_path.as_ref();
    if image_file_path.exists() {
        return Err(anyhow!(
            "{image_file_path:?} already exists, refusing to overwrite it"
        ));
    }

    // use the uid and gid of this program as the owner of "/"
    let options = FormatOptions {
        max_inum: inode_count,
        max_dnum: data_block_count,
        ..FormatOptions::default()
    };
    let total_blocks = options.layout()?.total_blocks();
    let store = BlockStore::create(image_file_path, total_blocks)
        .with_context(|| format!("failed to create image file {image_file_path:?}"))?;
    let fs = TinyFs::format(store, &options)?;
    fs.unmount()?;
    info!(
        "created {image_file_path:?}: {} with {inode_count} inodes and {data_block_count} data blocks",
        Byte::from_bytes(total_blocks as u128 * BLOCK_SIZE as u128).get_appropriate_unit(true)
    );
    Ok(())
}
