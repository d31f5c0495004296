//! command line arguments of the `tinyfs` binary
mod cli_struct;
pub use cli_struct::*;
