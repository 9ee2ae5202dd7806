//! Member body codec.
//!
//! A *whole* body is the uncompressed length followed by one LZ frame over
//! the entire content. A *sharded* body splits the content into fixed-size
//! uncompressed windows, compresses each window independently, and prefixes
//! the concatenated frames with a cumulative compressed-offset array, which
//! is what makes ranged reads touch only the shards they overlap.

use byteorder::{ByteOrder, LittleEndian};

use crate::access::ByteSource;
use crate::codec;
use crate::container::Entry;
use crate::error::{Result, VarkError};

pub const SHARD_MAGIC: &[u8; 4] = b"VSHF";
/// Uncompressed window size used when the caller does not pick one.
pub const DEFAULT_SHARD_SIZE: u32 = 128 * 1024;
/// magic(4) + shard_count(4) + total_uncompressed(8)
const SHARD_HEADER_SIZE: u64 = 16;

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Encode a whole-layout body: `u64` uncompressed length, then one frame.
pub fn encode_whole(src: &[u8]) -> Vec<u8> {
    let frame = codec::compress(src);
    let mut body = Vec::with_capacity(8 + frame.len());
    body.extend_from_slice(&(src.len() as u64).to_le_bytes());
    body.extend_from_slice(&frame);
    body
}

/// Encode a sharded-layout body. An empty source still carries the header
/// and a one-element offset array.
pub fn encode_sharded(src: &[u8], shard_size: u32) -> Vec<u8> {
    let window = shard_size as usize;
    let shard_count = src.len().div_ceil(window);

    let mut offsets: Vec<u64> = Vec::with_capacity(shard_count + 1);
    let mut frames: Vec<Vec<u8>> = Vec::with_capacity(shard_count);
    offsets.push(0);
    let mut compressed_total = 0u64;
    for window_bytes in src.chunks(window) {
        let frame = codec::compress(window_bytes);
        compressed_total += frame.len() as u64;
        offsets.push(compressed_total);
        frames.push(frame);
    }

    let mut body =
        Vec::with_capacity(SHARD_HEADER_SIZE as usize + 8 * offsets.len() + compressed_total as usize);
    body.extend_from_slice(SHARD_MAGIC);
    body.extend_from_slice(&(shard_count as u32).to_le_bytes());
    body.extend_from_slice(&(src.len() as u64).to_le_bytes());
    for off in &offsets {
        body.extend_from_slice(&off.to_le_bytes());
    }
    for frame in &frames {
        body.extend_from_slice(frame);
    }
    body
}

// ── Decoding ─────────────────────────────────────────────────────────────────

struct ShardedHeader {
    shard_count: u32,
    total_uncompressed: u64,
}

impl ShardedHeader {
    /// File offset of the first compressed frame.
    fn data_start(&self, entry: &Entry) -> u64 {
        entry.offset + SHARD_HEADER_SIZE + (u64::from(self.shard_count) + 1) * 8
    }
}

/// Parse the sharded header and copy the cumulative offset array into
/// `offsets`. The copy happens in mapped mode too, so downstream code works
/// from one owned table regardless of backend.
fn read_sharded_header(
    src: &mut ByteSource,
    entry: &Entry,
    shard_size: u32,
    scratch: &mut Vec<u8>,
    offsets: &mut Vec<u64>,
) -> Result<ShardedHeader> {
    if entry.size < SHARD_HEADER_SIZE {
        return Err(VarkError::Corrupt("sharded body shorter than its header"));
    }
    let head = src.slice(entry.offset, SHARD_HEADER_SIZE as usize, scratch)?;
    if &head[0..4] != SHARD_MAGIC {
        return Err(VarkError::Corrupt("bad shard magic"));
    }
    let shard_count = LittleEndian::read_u32(&head[4..8]);
    let total_uncompressed = LittleEndian::read_u64(&head[8..16]);

    let expected_count = total_uncompressed.div_ceil(u64::from(shard_size));
    if u64::from(shard_count) != expected_count {
        return Err(VarkError::Corrupt("shard count disagrees with member size"));
    }

    let table_len = (u64::from(shard_count) + 1) * 8;
    if entry.size < SHARD_HEADER_SIZE + table_len {
        return Err(VarkError::Corrupt("shard offset table truncated"));
    }
    let table = src.slice(entry.offset + SHARD_HEADER_SIZE, table_len as usize, scratch)?;
    offsets.clear();
    offsets.reserve(shard_count as usize + 1);
    for i in 0..=shard_count as usize {
        offsets.push(LittleEndian::read_u64(&table[i * 8..i * 8 + 8]));
    }

    if offsets[0] != 0 || offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(VarkError::Corrupt("shard offsets are not monotonic"));
    }
    if entry.size != SHARD_HEADER_SIZE + table_len + offsets[shard_count as usize] {
        return Err(VarkError::Corrupt("member size disagrees with shard table"));
    }

    Ok(ShardedHeader {
        shard_count,
        total_uncompressed,
    })
}

/// Decode a whole-layout body in full.
pub fn decode_whole(src: &mut ByteSource, entry: &Entry, scratch: &mut Vec<u8>) -> Result<Vec<u8>> {
    if entry.size < 8 {
        return Err(VarkError::Corrupt("member body shorter than its size header"));
    }
    let head = src.slice(entry.offset, 8, scratch)?;
    let uncompressed = LittleEndian::read_u64(head);

    let frame_len = (entry.size - 8) as usize;
    let mut out = vec![0u8; uncompressed as usize];
    if uncompressed > 0 {
        let frame = src.slice(entry.offset + 8, frame_len, scratch)?;
        let produced = codec::decompress_into(frame, &mut out)?;
        if produced as u64 != uncompressed {
            return Err(VarkError::Corrupt("decoder output length mismatch"));
        }
    }
    Ok(out)
}

/// Decode a sharded-layout body in full.
pub fn decode_sharded(
    src: &mut ByteSource,
    entry: &Entry,
    shard_size: u32,
    scratch: &mut Vec<u8>,
    offsets: &mut Vec<u64>,
) -> Result<Vec<u8>> {
    let header = read_sharded_header(src, entry, shard_size, scratch, offsets)?;
    let total = header.total_uncompressed;
    decode_shards(src, entry, &header, shard_size, 0, total, scratch, offsets)
}

/// Decode `[offset, offset + length)` of the uncompressed stream, touching
/// only the shards that overlap the range.
pub fn decode_sharded_range(
    src: &mut ByteSource,
    entry: &Entry,
    shard_size: u32,
    offset: u64,
    length: u64,
    scratch: &mut Vec<u8>,
    offsets: &mut Vec<u64>,
) -> Result<Vec<u8>> {
    let header = read_sharded_header(src, entry, shard_size, scratch, offsets)?;
    let total = header.total_uncompressed;
    if offset.checked_add(length).map_or(true, |end| end > total) {
        return Err(VarkError::OutOfRange {
            offset,
            length,
            size: total,
        });
    }
    decode_shards(src, entry, &header, shard_size, offset, length, scratch, offsets)
}

#[allow(clippy::too_many_arguments)]
fn decode_shards(
    src: &mut ByteSource,
    entry: &Entry,
    header: &ShardedHeader,
    shard_size: u32,
    offset: u64,
    length: u64,
    scratch: &mut Vec<u8>,
    offsets: &[u64],
) -> Result<Vec<u8>> {
    if length == 0 {
        return Ok(Vec::new());
    }
    let total = header.total_uncompressed;
    let window = u64::from(shard_size);
    let first = offset / window;
    let last = (offset + length - 1) / window;
    let slice_start = (offset - first * window) as usize;
    // Covers whole shards from the start of `first` to the end of `last`;
    // the requested range is cut out of it at the end.
    let oversized = (((last + 1) * window).min(total) - first * window) as usize;
    let data_start = header.data_start(entry);

    let mut out = vec![0u8; oversized];
    for i in first..=last {
        let idx = i as usize;
        let compressed_start = offsets[idx];
        let compressed_len = (offsets[idx + 1] - compressed_start) as usize;
        let shard_start = i * window;
        let shard_len = (((i + 1) * window).min(total) - shard_start) as usize;
        let dst = ((i - first) * window) as usize;

        let frame = src.slice(data_start + compressed_start, compressed_len, scratch)?;
        let produced = codec::decompress_into(frame, &mut out[dst..dst + shard_len])?;
        if produced != shard_len {
            return Err(VarkError::Corrupt("shard decoded to the wrong length"));
        }
    }

    if slice_start > 0 {
        out.copy_within(slice_start.., 0);
    }
    out.truncate(length as usize);
    Ok(out)
}

/// Report the member's uncompressed length without touching frame bytes or
/// the offset table.
pub fn uncompressed_size(
    src: &mut ByteSource,
    entry: &Entry,
    scratch: &mut Vec<u8>,
) -> Result<u64> {
    if entry.shard_size == 0 {
        if entry.size < 8 {
            return Err(VarkError::Corrupt("member body shorter than its size header"));
        }
        let head = src.slice(entry.offset, 8, scratch)?;
        Ok(LittleEndian::read_u64(head))
    } else {
        if entry.size < SHARD_HEADER_SIZE {
            return Err(VarkError::Corrupt("sharded body shorter than its header"));
        }
        let head = src.slice(entry.offset, SHARD_HEADER_SIZE as usize, scratch)?;
        if &head[0..4] != SHARD_MAGIC {
            return Err(VarkError::Corrupt("bad shard magic"));
        }
        Ok(LittleEndian::read_u64(&head[8..16]))
    }
}
