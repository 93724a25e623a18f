use std::fs::{File, OpenOptions};
use std::io::{Error, ErrorKind, Result};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::spawn_blocking;

use super::os;
use crate::file_system::IFile;

#[derive(Debug, Clone)]
struct RawFile(Arc<File>);

impl RawFile {
    fn file_size(&self) -> Result<u64> {
        os::file_size(self.0.as_ref())
    }

    async fn pwrite(&self, pos: u64, data: &[u8]) -> Result<usize> {
        let len = data.len();
        let ptr = data.as_ptr() as u64;
        let file = self.0.clone();
        asyncify(move || os::pwrite(file.as_ref(), pos, len, ptr)).await
    }

    async fn pread(&self, pos: u64, data: &mut [u8]) -> Result<usize> {
        let len = data.len();
        let ptr = data.as_mut_ptr() as u64;
        let file = self.0.clone();
        asyncify(move || os::pread(file.as_ref(), pos, len, ptr)).await
    }

    async fn sync_data(&self) -> Result<()> {
        let file = self.0.clone();
        asyncify(move || file.sync_data()).await
    }

    async fn truncate(&self, size: u64) -> Result<()> {
        let file = self.0.clone();
        asyncify(move || file.set_len(size)).await
    }
}

pub(crate) async fn asyncify<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match spawn_blocking(f).await {
        Ok(res) => res,
        Err(e) => Err(Error::new(
            ErrorKind::Other,
            format!("background task failed: {:?}", e),
        )),
    }
}

/// A regular file doing its positioned I/O on the blocking pool.
#[derive(Debug, Clone)]
pub struct AsyncFile {
    inner: RawFile,
}

impl AsyncFile {
    pub async fn open<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<AsyncFile> {
        let path = path.as_ref().to_owned();
        let file = asyncify(move || options.open(path)).await?;
        Ok(AsyncFile {
            inner: RawFile(Arc::new(file)),
        })
    }
}

#[async_trait]
impl IFile for AsyncFile {
    async fn write_at(&self, pos: u64, data: &[u8]) -> Result<usize> {
        self.inner.pwrite(pos, data).await
    }

    async fn read_at(&self, pos: u64, data: &mut [u8]) -> Result<usize> {
        self.inner.pread(pos, data).await
    }

    async fn sync_data(&self) -> Result<()> {
        self.inner.sync_data().await
    }

    async fn truncate(&self, size: u64) -> Result<()> {
        self.inner.truncate(size).await
    }

    fn file_size(&self) -> Result<u64> {
        self.inner.file_size()
    }
}
