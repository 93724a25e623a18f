//! Chunk encoding: a 4-byte big-endian word whose top bit flags an embedded
//! MD5 and whose low 31 bits carry the payload size, then the optional
//! 16-byte MD5, then the payload. The whole sequence is block-framed by the
//! caller.

use std::path::Path;

use md5::{Digest, Md5};
use snafu::{ensure, ResultExt};
use tracing::{debug, error};

use super::block::{self, raw_read_len};
use super::{BLOCK_SIZE, CHUNK_HEADER_LEN, CHUNK_MD5_LEN};
use crate::byte_utils::decode_be_u32;
use crate::error::{self, Result};
use crate::file_system::IFile;

/// Largest payload the 31-bit size field can carry.
pub const MAX_CHUNK_LEN: u64 = (1 << 31) - 1;

const MD5_FLAG: u32 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub len: u32,
    pub has_md5: bool,
}

pub fn encode_len_word(payload_len: u64, with_md5: bool) -> Result<[u8; CHUNK_HEADER_LEN]> {
    ensure!(
        payload_len <= MAX_CHUNK_LEN,
        error::ChunkTooLargeSnafu { len: payload_len }
    );
    let mut word = payload_len as u32;
    if with_md5 {
        word |= MD5_FLAG;
    }
    Ok(word.to_be_bytes())
}

pub fn decode_len_word(word: &[u8]) -> ChunkHeader {
    let word = decode_be_u32(word);
    ChunkHeader {
        len: word & !MD5_FLAG,
        has_md5: word & MD5_FLAG != 0,
    }
}

pub fn compute_md5<D: AsRef<[u8]>>(segments: &[D]) -> [u8; CHUNK_MD5_LEN] {
    let mut hasher = Md5::new();
    for segment in segments {
        hasher.update(segment.as_ref());
    }
    hasher.finalize().into()
}

/// Reads the chunk whose framed length word starts at absolute position
/// `pos`. Returns the payload and the embedded MD5 when the chunk carries
/// one; verification is [`read_chunk_verified`]'s job.
pub async fn read_chunk_at<F: IFile>(
    file: &F,
    path: &Path,
    pos: u64,
) -> Result<(Vec<u8>, Option<[u8; CHUNK_MD5_LEN]>)> {
    let off = (pos % BLOCK_SIZE as u64) as usize;
    let header_raw_len = raw_read_len(off, CHUNK_HEADER_LEN as u64) as usize;

    // Most chunks are small, so read ahead to the end of the next block and
    // usually finish in one pread. A failed read-ahead falls back to the
    // minimal probe; the decoded result is identical either way.
    let readahead_len = 2 * BLOCK_SIZE - off;
    let mut raw = vec![0_u8; readahead_len];
    let n = match file.read_at(pos, &mut raw).await {
        Ok(n) => n,
        Err(_) => {
            raw.truncate(header_raw_len);
            file.read_at(pos, &mut raw)
                .await
                .context(error::ReadFileSnafu { path })?
        }
    };
    ensure!(n >= header_raw_len, error::EofSnafu);
    raw.truncate(n);

    let mut payload = block::unframe(off, &raw);
    let header = decode_len_word(&payload[..CHUNK_HEADER_LEN]);
    let body_len = header.len as u64
        + if header.has_md5 {
            CHUNK_MD5_LEN as u64
        } else {
            0
        };
    let total_payload_len = CHUNK_HEADER_LEN as u64 + body_len;

    let total_raw_len = raw_read_len(off, total_payload_len);
    if (raw.len() as u64) < total_raw_len {
        let missing = (total_raw_len - raw.len() as u64) as usize;
        let rest_pos = pos + raw.len() as u64;
        let mut rest = vec![0_u8; missing];
        let m = file
            .read_at(rest_pos, &mut rest)
            .await
            .context(error::ReadFileSnafu { path })?;
        ensure!(m == missing, error::EofSnafu);
        let rest_off = (rest_pos % BLOCK_SIZE as u64) as usize;
        payload.extend(block::unframe(rest_off, &rest));
    }
    ensure!(payload.len() as u64 >= total_payload_len, error::EofSnafu);
    payload.truncate(total_payload_len as usize);

    let body = payload.split_off(CHUNK_HEADER_LEN);
    if header.has_md5 {
        let mut md5sum = [0_u8; CHUNK_MD5_LEN];
        md5sum.copy_from_slice(&body[..CHUNK_MD5_LEN]);
        Ok((body[CHUNK_MD5_LEN..].to_vec(), Some(md5sum)))
    } else {
        Ok((body, None))
    }
}

/// [`read_chunk_at`], plus verification of the embedded MD5 when the chunk
/// carries one. A mismatch means the file is damaged.
pub async fn read_chunk_verified<F: IFile>(
    file: &F,
    path: &Path,
    pos: u64,
) -> Result<(Vec<u8>, Option<[u8; CHUNK_MD5_LEN]>)> {
    let (payload, md5sum) = read_chunk_at(file, path, pos).await?;
    if let Some(expected) = md5sum {
        let actual: [u8; CHUNK_MD5_LEN] = Md5::digest(&payload).into();
        if actual != expected {
            error!(
                "File corruption in {} at position {}",
                path.display(),
                pos
            );
            debug!(
                "chunk md5 mismatch: embedded {}, computed {}",
                hex::encode(expected),
                hex::encode(actual)
            );
            return error::FileCorruptionSnafu { path, pos }.fail();
        }
    }
    Ok((payload, md5sum))
}
