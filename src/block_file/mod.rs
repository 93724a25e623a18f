//! # Chunk file
//!
//! An append-only file cut into 4 KiB blocks. Byte 0 of every block is a
//! prefix that upper layers never see: `0x00` for data, `0x01` for a block
//! that begins a database header.
//!
//! ```text
//! +--------------+---------------------+--------------+---------------------+-----
//! | 0x00         | 4095 payload bytes  | 0x00         | 4095 payload bytes  | ...
//! +--------------+---------------------+--------------+---------------------+-----
//! ```
//!
//! ## Chunk
//! ```text
//! +--------------------------------+----------------+--------------+
//! | 0: 4 bytes                     | 4: 16 bytes    | payload_size |
//! +--------------------------------+----------------+--------------+
//! | md5_flag(1 bit) + size(31 bit) | md5 (optional) |   payload    |
//! +--------------------------------+----------------+--------------+
//! ```
//! Chunks are laid down at the current end of file, spliced across block
//! boundaries by the block codec; prefix bytes never count toward the size
//! field.
//!
//! ## Header
//! ```text
//! +---------------+------------+------------+-------------+--------------+
//! | padding_zeros | 0: 1 byte  | 1: 4 bytes | 5: 16 bytes | payload_size |
//! +---------------+------------+------------+-------------+--------------+
//! | to next block | 0x01       | size       | md5         |   payload    |
//! +---------------+------------+------------+-------------+--------------+
//! ```
//! Headers only ever start at a block boundary, `size` covers `md5 ++
//! payload`, and the signed bytes are block-framed from intra-block offset
//! 5. The newest valid header is found by scanning blocks backward from the
//! end of file.

pub mod block;
pub mod chunk;
pub mod handle;
pub mod header;

pub use handle::{ChunkFile, FileOwner};

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const BLOCK_SIZE: usize = 4096;
/// Payload bytes per block, the prefix byte excluded.
pub const BLOCK_PAYLOAD_SIZE: usize = BLOCK_SIZE - 1;

pub const CHUNK_HEADER_LEN: usize = 4;
pub const CHUNK_MD5_LEN: usize = 16;

pub const HEADER_SIZE_LEN: usize = 4;
/// Intra-block offset of a header's framed payload: prefix(1) + size(4).
pub const HEADER_PAYLOAD_OFFSET: usize = 1 + HEADER_SIZE_LEN;

#[derive(Debug, Eq, PartialEq, Clone, Copy, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum BlockPrefix {
    Data = 0x00,
    Header = 0x01,
}
