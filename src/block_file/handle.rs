//! One spawned task per open file. The task owns the descriptor and the
//! authoritative end-of-file cursor; its mailbox is the only source of
//! ordering, so requests from any number of handle clones execute strictly
//! serially and never interleave bytes.

use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, warn};

use super::block;
use super::chunk;
use super::header;
use super::{BLOCK_SIZE, CHUNK_MD5_LEN};
use crate::error::{self, Error, Result};
use crate::file_system::{file_manager, AsyncFile, IFile};
use crate::options::{OpenOpt, StorageOptions};

pub const FILE_REQ_CHANNEL_CAP: usize = 1024;

pub type ReplySender<T> = oneshot::Sender<Result<T>>;

pub enum FileTask {
    Append {
        parts: Vec<Vec<u8>>,
        with_md5: bool,
        call_back: ReplySender<(u64, u64)>,
    },
    AppendRaw {
        data: Vec<u8>,
        call_back: ReplySender<(u64, u64)>,
    },
    ReadChunk {
        pos: u64,
        call_back: ReplySender<(Vec<u8>, Option<[u8; CHUNK_MD5_LEN]>)>,
    },
    WriteHeader {
        data: Vec<u8>,
        call_back: ReplySender<()>,
    },
    ReadHeader {
        call_back: ReplySender<Option<Vec<u8>>>,
    },
    Truncate {
        pos: u64,
        call_back: ReplySender<()>,
    },
    Sync {
        call_back: ReplySender<()>,
    },
    Bytes {
        call_back: ReplySender<u64>,
    },
    Close {
        call_back: ReplySender<()>,
    },
    SetOwner {
        owner: Weak<()>,
        call_back: ReplySender<()>,
    },
}

/// Held by whatever opened the file. Dropping the last clone counts as the
/// owner dying: an idle file with a dead owner closes itself.
#[derive(Debug, Clone, Default)]
pub struct FileOwner {
    token: Arc<()>,
}

impl FileOwner {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Handle to an open chunk file. Cloning is cheap; every live clone counts
/// as an observer and keeps the owning task from idling out.
#[derive(Clone, Debug)]
pub struct ChunkFile {
    sender: mpsc::Sender<FileTask>,
    path: Arc<PathBuf>,
    _observer: Arc<()>,
}

impl ChunkFile {
    /// Opens `path` and spawns its owning task.
    ///
    /// With `create`, parent directories are made and an existing non-empty
    /// file fails with `AlreadyExists` unless `overwrite` truncates it.
    /// Without `create`, a read-only probe decides between `FileNotFound`
    /// and reopening in the effective mode.
    pub async fn open(
        path: impl AsRef<Path>,
        opt: OpenOpt,
        options: Arc<StorageOptions>,
    ) -> Result<ChunkFile> {
        let path = path.as_ref().to_path_buf();

        let (file, eof) = if opt.create {
            let file = file_manager::create_file(&path).await?;
            let size = file.file_size().context(error::OpenFileSnafu { path: &path })?;
            if size > 0 {
                if !opt.overwrite {
                    return error::AlreadyExistsSnafu { path }.fail();
                }
                file.truncate(0)
                    .await
                    .context(error::WriteFileSnafu { path: &path })?;
                file.sync_data().await.context(error::SyncFileSnafu)?;
            }
            (file, 0)
        } else {
            match file_manager::open_file_readonly(&path).await {
                Err(e) if e.is_file_not_found() => {
                    if !opt.no_log_if_missing {
                        warn!("File '{}' not found", path.display());
                    }
                    return error::FileNotFoundSnafu { path }.fail();
                }
                Err(e) => return Err(e),
                Ok(file) => {
                    let file = if opt.read_only {
                        file
                    } else {
                        drop(file);
                        file_manager::open_file(&path).await?
                    };
                    let size = file.file_size().context(error::OpenFileSnafu { path: &path })?;
                    (file, size)
                }
            }
        };

        let (sender, receiver) = mpsc::channel(FILE_REQ_CHANNEL_CAP);
        let observer = Arc::new(());
        let actor = FileActor {
            path: path.clone(),
            file,
            eof,
            is_sys: opt.sys,
            owner: None,
            observers: Arc::downgrade(&observer),
            options,
        };
        debug!(
            "Opened {} '{}' at eof {}",
            if opt.sys { "system file" } else { "file" },
            path.display(),
            eof
        );
        tokio::spawn(actor.run(receiver, sender.clone()));

        Ok(ChunkFile {
            sender,
            path: Arc::new(path),
            _observer: observer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `data` as a length-tagged chunk and returns
    /// `(position, bytes written)`; the position is the pre-write end of
    /// file and the count includes every block prefix spliced in.
    pub async fn append_chunk(&self, data: Vec<u8>) -> Result<(u64, u64)> {
        self.append_chunk_parts(vec![data]).await
    }

    /// Scatter-gather variant of [`append_chunk`](Self::append_chunk): the
    /// segments land on disk back to back as one chunk.
    pub async fn append_chunk_parts(&self, parts: Vec<Vec<u8>>) -> Result<(u64, u64)> {
        self.call(|call_back| FileTask::Append {
            parts,
            with_md5: false,
            call_back,
        })
        .await
    }

    /// Like [`append_chunk`](Self::append_chunk) with the payload's MD5
    /// embedded; reads of this chunk verify it.
    pub async fn append_chunk_md5(&self, data: Vec<u8>) -> Result<(u64, u64)> {
        self.call(|call_back| FileTask::Append {
            parts: vec![data],
            with_md5: true,
            call_back,
        })
        .await
    }

    /// Appends bytes that already carry their chunk encoding; only block
    /// framing is applied.
    pub async fn append_raw(&self, encoded: Vec<u8>) -> Result<(u64, u64)> {
        self.call(|call_back| FileTask::AppendRaw {
            data: encoded,
            call_back,
        })
        .await
    }

    /// Reads the chunk at absolute position `pos` (a position some append
    /// returned). The embedded MD5, when present, has been verified.
    pub async fn pread_chunk(&self, pos: u64) -> Result<(Vec<u8>, Option<[u8; CHUNK_MD5_LEN]>)> {
        self.call(|call_back| FileTask::ReadChunk { pos, call_back }).await
    }

    /// Writes `data` as the new current database header.
    pub async fn write_header(&self, data: Vec<u8>) -> Result<()> {
        self.call(|call_back| FileTask::WriteHeader { data, call_back })
            .await
    }

    /// Returns the newest valid header, or `None` when no block in the file
    /// holds one.
    pub async fn read_header(&self) -> Result<Option<Vec<u8>>> {
        self.call(|call_back| FileTask::ReadHeader { call_back }).await
    }

    /// Discards everything at and after `pos`; the end-of-file cursor moves
    /// to `pos`.
    pub async fn truncate(&self, pos: u64) -> Result<()> {
        self.call(|call_back| FileTask::Truncate { pos, call_back }).await
    }

    pub async fn sync(&self) -> Result<()> {
        self.call(|call_back| FileTask::Sync { call_back }).await
    }

    /// Physical size of the file right now.
    pub async fn bytes(&self) -> Result<u64> {
        self.call(|call_back| FileTask::Bytes { call_back }).await
    }

    /// Closes the file. Pending requests queued before this one still run.
    pub async fn close(&self) -> Result<()> {
        self.call(|call_back| FileTask::Close { call_back }).await
    }

    /// Couples the file's lifetime to `owner`: once every clone of the
    /// owner is gone and no observers remain, the file closes at the next
    /// idle check.
    pub async fn set_owner(&self, owner: &FileOwner) -> Result<()> {
        let weak = Arc::downgrade(&owner.token);
        self.call(|call_back| FileTask::SetOwner {
            owner: weak,
            call_back,
        })
        .await
    }

    async fn call<T>(&self, build: impl FnOnce(ReplySender<T>) -> FileTask) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| error::FileClosedSnafu.build())?;
        rx.await.map_err(|_| error::FileClosedSnafu.build())?
    }
}

enum Flow {
    Continue,
    Exit,
}

struct FileActor {
    path: PathBuf,
    file: AsyncFile,
    /// Authoritative end of file. Advanced only after a fully successful
    /// write, reset by truncate, bootstrapped from the descriptor at open
    /// and never re-derived from it afterwards.
    eof: u64,
    is_sys: bool,
    owner: Option<Weak<()>>,
    observers: Weak<()>,
    options: Arc<StorageOptions>,
}

impl FileActor {
    async fn run(mut self, mut receiver: mpsc::Receiver<FileTask>, self_sender: mpsc::Sender<FileTask>) {
        // Holding a sender keeps the mailbox open while handles come and
        // go; lifetime is governed by the idle checks below.
        let _self_sender = self_sender;
        let mut deadline = Instant::now() + self.options.idle_initial_wait;
        loop {
            tokio::select! {
                task = receiver.recv() => {
                    match task {
                        Some(task) => {
                            if let Flow::Exit = self.handle_task(task).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = time::sleep_until(deadline) => {
                    if self.is_idle() {
                        debug!("File '{}' closed after idling", self.path.display());
                        break;
                    }
                    deadline = Instant::now() + self.options.idle_monitor_check;
                }
            }
        }
        debug!(
            "File '{}' task finished (sys: {})",
            self.path.display(),
            self.is_sys
        );
    }

    async fn handle_task(&mut self, task: FileTask) -> Flow {
        match task {
            FileTask::Append {
                parts,
                with_md5,
                call_back,
            } => {
                let _ = call_back.send(self.append(&parts, with_md5).await);
            }
            FileTask::AppendRaw { data, call_back } => {
                let framed = block::frame(self.block_offset(), &[data]);
                let _ = call_back.send(self.write_at_eof(&framed).await);
            }
            FileTask::ReadChunk { pos, call_back } => {
                let res = chunk::read_chunk_verified(&self.file, &self.path, pos).await;
                let fatal = matches!(res, Err(Error::FileCorruption { .. }));
                let _ = call_back.send(res);
                if fatal {
                    // Verified reads are load-bearing for the layers above;
                    // a file that fails one is unusable.
                    error!("Closing corrupted file '{}'", self.path.display());
                    return Flow::Exit;
                }
            }
            FileTask::WriteHeader { data, call_back } => {
                let _ = call_back.send(self.write_header(&data).await);
            }
            FileTask::ReadHeader { call_back } => {
                let _ = call_back.send(header::find_header(&self.file, &self.path, self.eof).await);
            }
            FileTask::Truncate { pos, call_back } => {
                let _ = call_back.send(self.truncate(pos).await);
            }
            FileTask::Sync { call_back } => {
                let _ = call_back.send(self.file.sync_data().await.context(error::SyncFileSnafu));
            }
            FileTask::Bytes { call_back } => {
                let _ = call_back.send(self.file.file_size().context(error::IOSnafu));
            }
            FileTask::Close { call_back } => {
                let _ = self.file.sync_data().await;
                let _ = call_back.send(Ok(()));
                return Flow::Exit;
            }
            FileTask::SetOwner { owner, call_back } => {
                self.owner = Some(owner);
                let _ = call_back.send(Ok(()));
            }
        }
        Flow::Continue
    }

    fn block_offset(&self) -> usize {
        (self.eof % BLOCK_SIZE as u64) as usize
    }

    async fn append(&mut self, parts: &[Vec<u8>], with_md5: bool) -> Result<(u64, u64)> {
        let payload_len: u64 = parts.iter().map(|p| p.len() as u64).sum();
        let word = chunk::encode_len_word(payload_len, with_md5)?;
        let md5sum = if with_md5 {
            Some(chunk::compute_md5(parts))
        } else {
            None
        };

        let mut segments: Vec<&[u8]> = Vec::with_capacity(parts.len() + 2);
        segments.push(&word);
        if let Some(ref sum) = md5sum {
            segments.push(sum);
        }
        for p in parts {
            segments.push(p);
        }

        let framed = block::frame(self.block_offset(), &segments);
        self.write_at_eof(&framed).await
    }

    async fn write_header(&mut self, data: &[u8]) -> Result<()> {
        let buf = header::encode_header(self.eof, &[data])?;
        self.write_at_eof(&buf).await.map(|_| ())
    }

    /// All writes go through here: one positioned call at the cursor. On a
    /// short or failed write `eof` stays put, so the stray bytes sit past
    /// the cursor and the next write overwrites them.
    async fn write_at_eof(&mut self, framed: &[u8]) -> Result<(u64, u64)> {
        let written = self
            .file
            .write_at(self.eof, framed)
            .await
            .context(error::WriteFileSnafu { path: &self.path })?;
        if written != framed.len() {
            return Err(Error::WriteFile {
                path: self.path.clone(),
                source: IoError::new(ErrorKind::WriteZero, "short write"),
            });
        }
        let pos = self.eof;
        self.eof += framed.len() as u64;
        Ok((pos, framed.len() as u64))
    }

    async fn truncate(&mut self, pos: u64) -> Result<()> {
        self.file
            .truncate(pos)
            .await
            .context(error::WriteFileSnafu { path: &self.path })?;
        self.eof = pos;
        Ok(())
    }

    /// No live handles, and the owner (when one was registered) is gone.
    /// System files get no statistics tracker, so the same check covers
    /// both kinds; `is_sys` only matters to the open-descriptor accounting
    /// done outside this task.
    fn is_idle(&self) -> bool {
        if self.observers.strong_count() > 0 {
            return false;
        }
        match &self.owner {
            Some(owner) => owner.strong_count() == 0,
            None => true,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{ChunkFile, FileOwner};
    use crate::block_file::{block, chunk, BLOCK_SIZE, CHUNK_HEADER_LEN, CHUNK_MD5_LEN};
    use crate::error::Error;
    use crate::options::{OpenOpt, StorageOptions};

    fn test_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from("/tmp/test/docfile/handle").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn options() -> Arc<StorageOptions> {
        Arc::new(StorageOptions::default())
    }

    fn short_idle_options() -> Arc<StorageOptions> {
        Arc::new(StorageOptions {
            idle_initial_wait: Duration::from_millis(50),
            idle_monitor_check: Duration::from_millis(20),
            ..StorageOptions::default()
        })
    }

    #[tokio::test]
    async fn test_append_first_chunks() {
        let dir = test_dir("first_chunks");
        let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), options())
            .await
            .unwrap();

        // 1 block prefix + 4 length word + 5 payload bytes.
        let (pos, written) = file.append_chunk(b"hello".to_vec()).await.unwrap();
        assert_eq!((pos, written), (0, 10));
        assert_eq!(file.bytes().await.unwrap(), 10);

        // The length word fits in block 0, the payload tail crosses into
        // block 1 and pays one prefix byte there.
        let payload = vec![0x42_u8; 4090];
        let (pos, written) = file.append_chunk(payload.clone()).await.unwrap();
        assert_eq!(pos, 10);
        assert_eq!(written, 4095);

        let (read, md5sum) = file.pread_chunk(pos).await.unwrap();
        assert_eq!(read, payload);
        assert_eq!(md5sum, None);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = test_dir("round_trip");
        let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), options())
            .await
            .unwrap();

        for len in [0_usize, 1, 10, 4091, 4092, 4095, 4096, 5000, 1 << 20] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

            let (pos, _) = file.append_chunk(payload.clone()).await.unwrap();
            assert_eq!(file.pread_chunk(pos).await.unwrap(), (payload.clone(), None));

            let (pos, _) = file.append_chunk_md5(payload.clone()).await.unwrap();
            let expected_md5 = chunk::compute_md5(&[payload.as_slice()]);
            assert_eq!(
                file.pread_chunk(pos).await.unwrap(),
                (payload, Some(expected_md5))
            );
        }
    }

    #[tokio::test]
    async fn test_append_at_block_boundaries() {
        for eof in [0_u64, 1, 4095, 4096, 4097, 8191, 8192] {
            let dir = test_dir(&format!("boundaries_{}", eof));
            let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), options())
                .await
                .unwrap();
            // Position the cursor; truncate extends the file with zeros.
            file.truncate(eof).await.unwrap();

            let payload = vec![0xA5_u8; 5000];
            let (pos, written) = file.append_chunk_md5(payload.clone()).await.unwrap();
            assert_eq!(pos, eof, "eof={}", eof);

            // The bytes on disk are exactly the framed encoding.
            let encoded_len = (CHUNK_HEADER_LEN + CHUNK_MD5_LEN + payload.len()) as u64;
            let off = (eof % BLOCK_SIZE as u64) as usize;
            assert_eq!(written, block::raw_read_len(off, encoded_len), "eof={}", eof);
            assert_eq!(file.bytes().await.unwrap(), eof + written, "eof={}", eof);

            let (read, md5sum) = file.pread_chunk(pos).await.unwrap();
            assert_eq!(read, payload, "eof={}", eof);
            assert!(md5sum.is_some(), "eof={}", eof);
        }
    }

    #[tokio::test]
    async fn test_append_raw() {
        let dir = test_dir("append_raw");
        let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), options())
            .await
            .unwrap();

        let payload = b"pre-encoded payload".to_vec();
        let word = chunk::encode_len_word(payload.len() as u64, false).unwrap();
        let mut encoded = word.to_vec();
        encoded.extend_from_slice(&payload);

        let (pos, written) = file.append_raw(encoded).await.unwrap();
        assert_eq!((pos, written), (0, 1 + 4 + payload.len() as u64));
        assert_eq!(file.pread_chunk(pos).await.unwrap(), (payload, None));
    }

    #[tokio::test]
    async fn test_header_recovery() {
        let dir = test_dir("header_recovery");
        let path = dir.join("f.db");
        let file = ChunkFile::open(&path, OpenOpt::create(), options())
            .await
            .unwrap();

        file.write_header(b"header one".to_vec()).await.unwrap();
        let (chunk_pos, chunk_len) = file.append_chunk(vec![7_u8; 1 << 20]).await.unwrap();
        file.write_header(b"header two".to_vec()).await.unwrap();

        assert_eq!(
            file.read_header().await.unwrap().as_deref(),
            Some(&b"header two"[..])
        );

        // Everything after the chunk goes away, the older header remains.
        file.truncate(chunk_pos + chunk_len).await.unwrap();
        assert_eq!(
            file.read_header().await.unwrap().as_deref(),
            Some(&b"header one"[..])
        );

        file.truncate(0).await.unwrap();
        assert_eq!(file.read_header().await.unwrap(), None);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_header_survives_reopen() {
        let dir = test_dir("header_reopen");
        let path = dir.join("f.db");
        {
            let file = ChunkFile::open(&path, OpenOpt::create(), options())
                .await
                .unwrap();
            file.append_chunk(b"some data".to_vec()).await.unwrap();
            file.write_header(b"commit point".to_vec()).await.unwrap();
            file.sync().await.unwrap();
            file.close().await.unwrap();
        }

        let file = ChunkFile::open(&path, OpenOpt::default(), options())
            .await
            .unwrap();
        assert_eq!(
            file.read_header().await.unwrap().as_deref(),
            Some(&b"commit point"[..])
        );
        // Appends continue from the recovered end of file.
        let size = file.bytes().await.unwrap();
        let (pos, _) = file.append_chunk(b"more".to_vec()).await.unwrap();
        assert_eq!(pos, size);
    }

    #[tokio::test]
    async fn test_corruption_detected_and_fatal() {
        let dir = test_dir("corruption");
        let path = dir.join("f.db");
        let file = ChunkFile::open(&path, OpenOpt::create(), options())
            .await
            .unwrap();

        let (pos, _) = file.append_chunk_md5(vec![0xAA_u8; 5000]).await.unwrap();
        file.sync().await.unwrap();

        // Flip one payload byte behind the task's back.
        let flip_at = pos + 21 + 100;
        let mut f = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        f.seek(SeekFrom::Start(flip_at)).unwrap();
        let mut b = [0_u8; 1];
        f.read_exact(&mut b).unwrap();
        f.seek(SeekFrom::Start(flip_at)).unwrap();
        f.write_all(&[b[0] ^ 0xFF]).unwrap();
        drop(f);

        match file.pread_chunk(pos).await.unwrap_err() {
            Error::FileCorruption { pos: p, .. } => assert_eq!(p, pos),
            e => panic!("expected FileCorruption, got {:?}", e),
        }

        // The task treats the file as unusable and exits.
        let err = file.bytes().await.unwrap_err();
        assert!(matches!(err, Error::FileClosed));
    }

    #[tokio::test]
    async fn test_unflagged_chunk_is_returned_as_is() {
        let dir = test_dir("unflagged");
        let path = dir.join("f.db");
        let file = ChunkFile::open(&path, OpenOpt::create(), options())
            .await
            .unwrap();

        let (pos, _) = file.append_chunk(vec![0xAA_u8; 100]).await.unwrap();
        file.sync().await.unwrap();

        let flip_at = pos + 10;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap();
        f.seek(SeekFrom::Start(flip_at)).unwrap();
        f.write_all(&[0x55]).unwrap();
        drop(f);

        // No embedded md5, no verification: the damaged bytes come back.
        let (read, md5sum) = file.pread_chunk(pos).await.unwrap();
        assert_eq!(md5sum, None);
        assert_eq!(read[5], 0x55);
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialize() {
        let dir = test_dir("concurrent");
        let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), options())
            .await
            .unwrap();

        let mut joins = Vec::new();
        for i in 0_u8..8 {
            let file = file.clone();
            joins.push(tokio::spawn(async move {
                let payload = vec![i; 1000 * (i as usize + 1)];
                let (pos, written) = file.append_chunk(payload.clone()).await.unwrap();
                (pos, written, payload)
            }));
        }

        let mut intervals = Vec::new();
        for join in joins {
            let (pos, written, payload) = join.await.unwrap();
            let (read, _) = file.pread_chunk(pos).await.unwrap();
            assert_eq!(read, payload);
            intervals.push((pos, written));
        }

        // Distinct, non-overlapping, and covering [0, eof) with no holes.
        intervals.sort_unstable();
        let mut expect_pos = 0_u64;
        for (pos, written) in intervals {
            assert_eq!(pos, expect_pos);
            expect_pos = pos + written;
        }
        assert_eq!(file.bytes().await.unwrap(), expect_pos);
    }

    #[tokio::test]
    async fn test_open_missing_read_only() {
        let dir = test_dir("missing");
        let opt = OpenOpt {
            read_only: true,
            no_log_if_missing: true,
            ..OpenOpt::default()
        };
        let err = ChunkFile::open(dir.join("nope.db"), opt, options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_open_existing_without_overwrite() {
        let dir = test_dir("already_exists");
        let path = dir.join("f.db");
        {
            let file = ChunkFile::open(&path, OpenOpt::create(), options())
                .await
                .unwrap();
            file.append_chunk(b"occupied".to_vec()).await.unwrap();
            file.close().await.unwrap();
        }

        let err = ChunkFile::open(&path, OpenOpt::create(), options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_open_overwrite_resets_file() {
        let dir = test_dir("overwrite");
        let path = dir.join("f.db");
        {
            let file = ChunkFile::open(&path, OpenOpt::create(), options())
                .await
                .unwrap();
            file.append_chunk(b"old data".to_vec()).await.unwrap();
            file.write_header(b"old header".to_vec()).await.unwrap();
            file.close().await.unwrap();
        }

        let file = ChunkFile::open(&path, OpenOpt::create_overwrite(), options())
            .await
            .unwrap();
        assert_eq!(file.bytes().await.unwrap(), 0);
        assert_eq!(file.read_header().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_then_request_fails() {
        let dir = test_dir("closed");
        let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), options())
            .await
            .unwrap();
        file.close().await.unwrap();
        let err = file.append_chunk(b"late".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::FileClosed));
    }

    #[tokio::test]
    async fn test_idle_close() {
        let dir = test_dir("idle");
        let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), short_idle_options())
            .await
            .unwrap();
        let task_probe = file.sender.downgrade();

        drop(file);
        tokio::time::sleep(Duration::from_millis(300)).await;
        // The task dropped its own sender on exit.
        assert!(task_probe.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_owner_keeps_idle_file_open() {
        let dir = test_dir("owner");
        let file = ChunkFile::open(dir.join("f.db"), OpenOpt::create(), short_idle_options())
            .await
            .unwrap();
        let owner = FileOwner::new();
        file.set_owner(&owner).await.unwrap();
        let task_probe = file.sender.downgrade();

        // No observers left, but the owner is still alive.
        drop(file);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(task_probe.upgrade().is_some());

        // Owner dies while the file is idle.
        drop(owner);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(task_probe.upgrade().is_none());
    }
}
