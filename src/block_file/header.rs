//! Database headers: MD5-signed records that only ever start at a block
//! boundary, behind the `0x01` block prefix that data blocks never use.
//! Recovery scans blocks backward from the end of file and takes the first
//! header whose signature checks out, so a torn tail costs at most the
//! writes after the previous header.

use std::path::Path;

use md5::{Digest, Md5};
use snafu::{ensure, ResultExt};

use super::block::{self, raw_read_len};
use super::{BlockPrefix, BLOCK_SIZE, CHUNK_MD5_LEN, HEADER_PAYLOAD_OFFSET, HEADER_SIZE_LEN};
use crate::byte_utils::decode_be_u32;
use crate::error::{self, Result};
use crate::file_system::IFile;

/// Encodes a header for a file whose end is currently at `eof`: zero padding
/// up to the next block boundary, the `0x01` prefix, the 4-byte size of
/// `md5 ++ payload`, then those signed bytes block-framed from intra-block
/// offset 5. The caller writes the whole thing at `eof` in one call.
pub fn encode_header<D: AsRef<[u8]>>(eof: u64, payload: &[D]) -> Result<Vec<u8>> {
    let payload_len: u64 = payload.iter().map(|d| d.as_ref().len() as u64).sum();
    let signed_len = payload_len + CHUNK_MD5_LEN as u64;
    ensure!(
        signed_len <= u32::MAX as u64,
        error::HeaderTooLargeSnafu { len: signed_len }
    );

    let block_offset = (eof % BLOCK_SIZE as u64) as usize;
    let padding = if block_offset == 0 {
        0
    } else {
        BLOCK_SIZE - block_offset
    };

    let md5sum: [u8; CHUNK_MD5_LEN] = {
        let mut hasher = Md5::new();
        for d in payload {
            hasher.update(d.as_ref());
        }
        hasher.finalize().into()
    };

    let mut out = vec![0_u8; padding];
    out.push(BlockPrefix::Header.into());
    out.extend_from_slice(&(signed_len as u32).to_be_bytes());
    let mut segments: Vec<&[u8]> = Vec::with_capacity(payload.len() + 1);
    segments.push(&md5sum);
    for d in payload {
        segments.push(d.as_ref());
    }
    out.extend_from_slice(&block::frame(HEADER_PAYLOAD_OFFSET, &segments));
    Ok(out)
}

/// Scans blocks backward from `eof` for the newest valid header and returns
/// its payload. `Ok(None)` means the whole file holds no valid header.
pub async fn find_header<F: IFile>(file: &F, path: &Path, eof: u64) -> Result<Option<Vec<u8>>> {
    let mut block = eof / BLOCK_SIZE as u64;
    loop {
        if let Some(payload) = load_header(file, path, block).await? {
            return Ok(Some(payload));
        }
        if block == 0 {
            return Ok(None);
        }
        block -= 1;
    }
}

/// Tries to parse and verify a header record starting at block index
/// `block`. `Ok(None)` covers everything that merely disqualifies this
/// block: short reads, a data prefix, a nonsense size, a bad signature.
/// Only OS errors surface as `Err`.
async fn load_header<F: IFile>(file: &F, path: &Path, block: u64) -> Result<Option<Vec<u8>>> {
    let block_pos = block * BLOCK_SIZE as u64;
    let mut buf = vec![0_u8; BLOCK_SIZE];
    let n = file
        .read_at(block_pos, &mut buf)
        .await
        .context(error::ReadFileSnafu { path })?;
    if n < HEADER_PAYLOAD_OFFSET + 1 {
        return Ok(None);
    }
    if buf[0] != u8::from(BlockPrefix::Header) {
        return Ok(None);
    }

    let signed_len = decode_be_u32(&buf[1..1 + HEADER_SIZE_LEN]) as u64;
    if signed_len < CHUNK_MD5_LEN as u64 {
        return Ok(None);
    }

    let total_raw_len = raw_read_len(HEADER_PAYLOAD_OFFSET, signed_len) as usize;
    let mut raw = buf[HEADER_PAYLOAD_OFFSET..n.min(HEADER_PAYLOAD_OFFSET + total_raw_len)].to_vec();
    if raw.len() < total_raw_len {
        let missing = total_raw_len - raw.len();
        let mut rest = vec![0_u8; missing];
        let m = file
            .read_at(block_pos + n as u64, &mut rest)
            .await
            .context(error::ReadFileSnafu { path })?;
        if m < missing {
            return Ok(None);
        }
        raw.extend_from_slice(&rest);
    }

    let signed = block::unframe(HEADER_PAYLOAD_OFFSET, &raw);
    if (signed.len() as u64) < signed_len {
        return Ok(None);
    }
    let (md5sum, payload) = signed[..signed_len as usize].split_at(CHUNK_MD5_LEN);
    let actual: [u8; CHUNK_MD5_LEN] = Md5::digest(payload).into();
    if actual[..] != *md5sum {
        return Ok(None);
    }
    Ok(Some(payload.to_vec()))
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::{encode_header, find_header};
    use crate::block_file::BLOCK_SIZE;
    use crate::file_system::{file_manager, IFile};

    fn test_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from("/tmp/test/docfile/header").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_encode_pads_to_block_boundary() {
        let buf = encode_header(0, &[b"abc"]).unwrap();
        // prefix + size word + md5 + payload, no padding at offset 0.
        assert_eq!(buf.len(), 1 + 4 + 16 + 3);
        assert_eq!(buf[0], 0x01);
        assert_eq!(&buf[1..5], &19_u32.to_be_bytes());

        let buf = encode_header(10, &[b"abc"]).unwrap();
        assert_eq!(buf.len(), (BLOCK_SIZE - 10) + 1 + 4 + 16 + 3);
        assert!(buf[..BLOCK_SIZE - 10].iter().all(|b| *b == 0));
        assert_eq!(buf[BLOCK_SIZE - 10], 0x01);
    }

    #[tokio::test]
    async fn test_find_header_on_empty_file() {
        let dir = test_dir("empty");
        let path = dir.join("f.db");
        let file = file_manager::create_file(&path).await.unwrap();
        assert_eq!(find_header(&file, &path, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_header_returns_newest() {
        let dir = test_dir("newest");
        let path = dir.join("f.db");
        let file = file_manager::create_file(&path).await.unwrap();

        let mut eof = 0_u64;
        for name in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            let buf = encode_header(eof, &[name]).unwrap();
            file.write_at(eof, &buf).await.unwrap();
            eof += buf.len() as u64;
        }

        let found = find_header(&file, &path, eof).await.unwrap();
        assert_eq!(found.as_deref(), Some(&b"three"[..]));
    }

    #[tokio::test]
    async fn test_find_header_skips_torn_tail() {
        let dir = test_dir("torn");
        let path = dir.join("f.db");
        let file = file_manager::create_file(&path).await.unwrap();

        let first = encode_header(0, &[&b"good"[..]]).unwrap();
        file.write_at(0, &first).await.unwrap();
        let mut eof = first.len() as u64;

        // A header that spans blocks, then lose its tail.
        let big = vec![0x5A_u8; 2 * BLOCK_SIZE];
        let second = encode_header(eof, &[big.as_slice()]).unwrap();
        file.write_at(eof, &second).await.unwrap();
        eof += second.len() as u64;
        let torn_eof = eof - 100;
        file.truncate(torn_eof).await.unwrap();

        let found = find_header(&file, &path, torn_eof).await.unwrap();
        assert_eq!(found.as_deref(), Some(&b"good"[..]));
    }

    #[tokio::test]
    async fn test_find_header_spanning_blocks() {
        let dir = test_dir("spanning");
        let path = dir.join("f.db");
        let file = file_manager::create_file(&path).await.unwrap();

        let big: Vec<u8> = (0..3 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        let buf = encode_header(0, &[big.as_slice()]).unwrap();
        file.write_at(0, &buf).await.unwrap();

        let found = find_header(&file, &path, buf.len() as u64).await.unwrap();
        assert_eq!(found, Some(big));
    }
}
