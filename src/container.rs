//! On-disk container codec: fixed header, trailer entry table, and the
//! shard-size extension block.
//!
//! All integers are little-endian. The header records the absolute offset
//! of the trailer; the append protocol overwrites the old trailer with the
//! new member body and flips the header pointer last.

use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, VarkError};

pub const MAGIC: &[u8; 4] = b"VARK";
pub const EXT_MAGIC: &[u8; 4] = b"VSHD";
/// magic(4) + trailer_offset(8)
pub const HEADER_SIZE: u64 = 12;

/// Catalog record for one member.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Portable (forward-slash) member path, unique within the archive.
    pub path: String,
    /// Absolute file offset of the member body.
    pub offset: u64,
    /// Total body length in bytes, inline header included.
    pub size: u64,
    /// FNV-1a 64 of the uncompressed member bytes.
    pub content_hash: u64,
    /// Uncompressed window size; 0 for whole-layout members.
    pub shard_size: u32,
}

pub fn write_header<W: Write>(mut w: W, trailer_offset: u64) -> Result<()> {
    w.write_all(MAGIC)?;
    w.write_u64::<LittleEndian>(trailer_offset)?;
    Ok(())
}

/// Verify the magic and return the trailer offset.
pub fn read_header<R: Read>(mut r: R) -> Result<u64> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(VarkError::Corrupt("bad archive magic"));
    }
    Ok(r.read_u64::<LittleEndian>()?)
}

pub fn write_trailer<W: Write>(mut w: W, entries: &[Entry]) -> Result<()> {
    w.write_u64::<LittleEndian>(entries.len() as u64)?;
    for entry in entries {
        w.write_u32::<LittleEndian>(entry.path.len() as u32)?;
        w.write_all(entry.path.as_bytes())?;
        w.write_u64::<LittleEndian>(entry.offset)?;
        w.write_u64::<LittleEndian>(entry.size)?;
        w.write_u64::<LittleEndian>(entry.content_hash)?;
    }
    // Shard sizes ride in an extension block so readers predating it still
    // load the entry table. Emitted on every trailer rewrite, which upgrades
    // a legacy archive on its first append.
    w.write_all(EXT_MAGIC)?;
    w.write_u64::<LittleEndian>(entries.len() as u64)?;
    for entry in entries {
        w.write_u32::<LittleEndian>(entry.shard_size)?;
    }
    Ok(())
}

/// Read the entry table and, when present, the shard-size extension block.
/// Archives written before the extension carry no block; every shard_size
/// then defaults to 0 (whole layout).
pub fn read_trailer<R: Read>(mut r: R) -> Result<Vec<Entry>> {
    let count = r.read_u64::<LittleEndian>()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let path_len = r.read_u32::<LittleEndian>()?;
        let mut path_bytes = vec![0u8; path_len as usize];
        r.read_exact(&mut path_bytes)?;
        let path = String::from_utf8(path_bytes)
            .map_err(|_| VarkError::Corrupt("entry path is not UTF-8"))?;
        let offset = r.read_u64::<LittleEndian>()?;
        let size = r.read_u64::<LittleEndian>()?;
        let content_hash = r.read_u64::<LittleEndian>()?;
        entries.push(Entry {
            path,
            offset,
            size,
            content_hash,
            shard_size: 0,
        });
    }

    let mut ext_magic = [0u8; 4];
    let ext_present = match r.read_exact(&mut ext_magic) {
        Ok(()) => &ext_magic == EXT_MAGIC,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e.into()),
    };
    if ext_present {
        let ext_count = match r.read_u64::<LittleEndian>() {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        if ext_count == count {
            for entry in &mut entries {
                entry.shard_size = r.read_u32::<LittleEndian>()?;
            }
        }
    }
    Ok(entries)
}

/// Convert a path to its archived form: forward slashes only, `.` and empty
/// components dropped. Parent components are refused rather than resolved.
/// Storage and lookup both go through here, so the two always agree.
pub fn portable_path(path: &Path) -> Result<String> {
    let raw = path.to_string_lossy();
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(VarkError::Unsupported("parent components in member paths")),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(VarkError::Unsupported("empty member path"));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trip() {
        let mut buf = Vec::new();
        write_header(&mut buf, 0xDEAD_BEEF).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE as usize);
        assert_eq!(read_header(Cursor::new(&buf)).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let buf = b"NOPE\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            read_header(Cursor::new(&buf[..])),
            Err(VarkError::Corrupt(_))
        ));
    }

    #[test]
    fn trailer_round_trip_with_extension() {
        let entries = vec![
            Entry {
                path: "a/x.bin".into(),
                offset: 12,
                size: 40,
                content_hash: 7,
                shard_size: 0,
            },
            Entry {
                path: "b/y.bin".into(),
                offset: 52,
                size: 99,
                content_hash: 8,
                shard_size: 131072,
            },
        ];
        let mut buf = Vec::new();
        write_trailer(&mut buf, &entries).unwrap();
        let back = read_trailer(Cursor::new(&buf)).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].path, "a/x.bin");
        assert_eq!(back[0].shard_size, 0);
        assert_eq!(back[1].shard_size, 131072);
        assert_eq!(back[1].content_hash, 8);
    }

    #[test]
    fn trailer_without_extension_defaults_shard_size() {
        // A legacy trailer ends right after the entry records.
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(1).unwrap();
        buf.write_u32::<LittleEndian>(5).unwrap();
        buf.write_all(b"a.txt").unwrap();
        buf.write_u64::<LittleEndian>(12).unwrap();
        buf.write_u64::<LittleEndian>(20).unwrap();
        buf.write_u64::<LittleEndian>(42).unwrap();
        let back = read_trailer(Cursor::new(&buf)).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].path, "a.txt");
        assert_eq!(back[0].shard_size, 0);
    }

    #[test]
    fn portable_paths() {
        assert_eq!(portable_path(Path::new("a/b/c.txt")).unwrap(), "a/b/c.txt");
        assert_eq!(portable_path(Path::new("./a/b.txt")).unwrap(), "a/b.txt");
        assert_eq!(portable_path(Path::new("a\\b\\c.bin")).unwrap(), "a/b/c.bin");
        assert_eq!(portable_path(Path::new("a//b/./c")).unwrap(), "a/b/c");
        assert!(matches!(
            portable_path(Path::new("../evil")),
            Err(VarkError::Unsupported(_))
        ));
        assert!(matches!(
            portable_path(Path::new(".")),
            Err(VarkError::Unsupported(_))
        ));
    }
}
