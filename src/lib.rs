pub mod block_store;
pub mod cli_interface;
pub mod fs;
pub mod mkfs;
pub mod mount;
pub mod utils;
pub use fs::*;
