//! register our filesystem to `FUSE` and mount it
use anyhow::Context;
use fuser::MountOption;
use log::info;
use std::path::Path;

use crate::fs::{FormatOptions, TinyFs};

/// options passed to `FUSE` for every mount
fn mount_options(auto_unmount: bool, allow_other: bool) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName("tinyfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }
    if allow_other {
        opts.push(MountOption::AllowOther);
    }
    opts
}

/// load the image, formatting it with default capacities if it does not exist,
/// then serve it at `mountpoint` until it is unmounted
pub fn mount<P, Q>(
    image_path: P,
    mountpoint: Q,
    auto_unmount: bool,
    allow_other: bool,
) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let image_path = image_path.as_ref();
    let fs = TinyFs::mount(image_path, &FormatOptions::default())
        .with_context(|| format!("failed to open filesystem image {image_path:?}"))?;

    info!("mounting {image_path:?} at {:?}", mountpoint.as_ref());
    let opts = mount_options(auto_unmount, allow_other);
    Ok(fuser::mount2(fs, mountpoint, &opts)?)
}
