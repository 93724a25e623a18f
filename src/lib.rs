pub use block_file::{ChunkFile, FileOwner};
pub use error::{Error, Result};
pub use options::{DeletePolicy, OpenOpt, StorageOptions};

pub mod block_file;
pub mod byte_utils;
pub mod error;
pub mod file_system;
pub mod file_utils;
pub mod options;
