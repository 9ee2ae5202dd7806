//! Byte access over the archive: buffered reads through a seekable
//! descriptor or zero-copy borrows out of a read-only mapping, plus the
//! descriptor handling shared with the write path.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use memmap2::Mmap;

use crate::error::{Result, VarkError};

// ── Descriptor handle ────────────────────────────────────────────────────────

/// A descriptor for one operation: either a borrow of the engine's
/// persistent descriptor or one opened just for this call. Owned handles
/// close on drop, so release happens on every exit path.
pub enum FileHandle<'a> {
    Borrowed(&'a mut File),
    Owned(File),
}

impl FileHandle<'_> {
    pub fn file(&mut self) -> &mut File {
        match self {
            FileHandle::Borrowed(f) => f,
            FileHandle::Owned(f) => f,
        }
    }

    /// Seek to `offset` and fill `buf` completely.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let f = self.file();
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)?;
        Ok(())
    }
}

// ── Read source ──────────────────────────────────────────────────────────────

/// One operation's view of the archive bytes. A mapped source hands out
/// borrows into the mapping; a buffered source reads into `scratch`.
pub enum ByteSource<'a> {
    Mapped(&'a [u8]),
    Buffered(FileHandle<'a>),
}

impl<'a> ByteSource<'a> {
    /// Return `len` bytes starting at `offset`. Both backends produce the
    /// same bytes for the same archive; only the storage of the result
    /// differs.
    pub fn slice<'s>(
        &'s mut self,
        offset: u64,
        len: usize,
        scratch: &'s mut Vec<u8>,
    ) -> Result<&'s [u8]> {
        match self {
            ByteSource::Mapped(map) => {
                let start = usize::try_from(offset)
                    .map_err(|_| VarkError::Corrupt("offset exceeds address space"))?;
                let end = start
                    .checked_add(len)
                    .ok_or(VarkError::Corrupt("range overflow"))?;
                map.get(start..end)
                    .ok_or(VarkError::Corrupt("range past end of mapping"))
            }
            ByteSource::Buffered(handle) => {
                scratch.resize(len, 0);
                handle.read_at(offset, scratch)?;
                Ok(&scratch[..])
            }
        }
    }
}

/// Map the whole archive read-only.
///
/// The mapping stays valid because write mode and mapped mode are mutually
/// exclusive on one engine, and the caller contract forbids a concurrent
/// writer on the same file.
pub fn map_archive(file: &File) -> Result<Mmap> {
    Ok(unsafe { Mmap::map(file)? })
}
