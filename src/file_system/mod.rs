pub mod async_file;
pub mod file_manager;
pub(crate) mod os;

use std::io::Result;

use async_trait::async_trait;

pub use async_file::AsyncFile;

/// Positioned I/O over an exclusively owned descriptor. Reads and writes
/// never move a shared cursor, so callers are free to interleave them.
#[async_trait]
pub trait IFile: Send + Sync {
    async fn write_at(&self, pos: u64, data: &[u8]) -> Result<usize>;
    async fn read_at(&self, pos: u64, data: &mut [u8]) -> Result<usize>;
    async fn sync_data(&self) -> Result<()>;
    async fn truncate(&self, size: u64) -> Result<()>;
    fn file_size(&self) -> Result<u64>;
}
