//! High-level [`Archive`] API — the primary embedding surface.
//!
//! ```no_run
//! use vark::{AppendOptions, Archive, OpenFlags};
//!
//! // Write
//! let mut ar = Archive::create("out.vark", OpenFlags::writing())?;
//! ar.append_bytes("readme.txt", b"Hello, world!", AppendOptions::whole())?;
//! ar.close();
//!
//! // Read
//! let mut ar = Archive::load("out.vark", OpenFlags::reading())?;
//! let data = ar.decompress("readme.txt")?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok::<(), vark::VarkError>(())
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use tracing::debug;

use crate::access::{map_archive, ByteSource, FileHandle};
use crate::codec::fnv1a_64;
use crate::container::{self, Entry, HEADER_SIZE};
use crate::error::{Result, VarkError};
use crate::member::{self, DEFAULT_SHARD_SIZE};

// ── OpenFlags ─────────────────────────────────────────────────────────────────

/// How an archive instance accesses its file. `write` and `mmap` are
/// mutually exclusive; the conflict is rejected before the file is touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Append mode. Disables every decompress/lookup operation.
    pub write: bool,
    /// Serve reads from a read-only mapping instead of a descriptor.
    pub mmap: bool,
    /// Keep one descriptor open across operations instead of opening one
    /// per call.
    pub persistent_handle: bool,
}

impl OpenFlags {
    /// Buffered read-only access, one descriptor per operation.
    pub fn reading() -> Self {
        Self::default()
    }

    pub fn writing() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub fn mapped() -> Self {
        Self {
            mmap: true,
            ..Self::default()
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent_handle = true;
        self
    }
}

// ── AppendOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`Archive::append`].
#[derive(Debug, Clone, Copy)]
pub struct AppendOptions {
    pub sharded: bool,
    /// Uncompressed window size for sharded members.
    pub shard_size: u32,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            sharded: false,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

impl AppendOptions {
    /// One frame over the entire member; no ranged reads.
    pub fn whole() -> Self {
        Self::default()
    }

    /// Independently compressed windows; enables [`Archive::decompress_range`].
    pub fn sharded() -> Self {
        Self {
            sharded: true,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }

    pub fn shard_size(mut self, size: u32) -> Self {
        self.shard_size = size;
        self
    }
}

// ── Archive ───────────────────────────────────────────────────────────────────

pub struct Archive {
    path:    PathBuf,
    flags:   OpenFlags,
    entries: Vec<Entry>,
    lookup:  HashMap<String, usize>,
    /// Persistent descriptor, when `persistent_handle` is set.
    file:    Option<File>,
    /// Read-only mapping, when `mmap` is set.
    map:     Option<Mmap>,
    /// On-disk archive length.
    size:    u64,
    /// Compressed bytes read in buffered mode; reused across operations.
    scratch: Vec<u8>,
    /// Copied shard-offset table; reused across operations.
    offsets: Vec<u64>,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Create a new archive: fixed header plus an empty trailer.
    pub fn create<P: AsRef<Path>>(path: P, flags: OpenFlags) -> Result<Self> {
        let path = path.as_ref().to_owned();
        if flags.write && flags.mmap {
            return Err(VarkError::ModeViolation("write and mmap are mutually exclusive"));
        }

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let mut initial = Vec::new();
        container::write_header(&mut initial, HEADER_SIZE)?;
        container::write_trailer(&mut initial, &[])?;
        file.write_all(&initial)?;
        let size = initial.len() as u64;

        debug!(path = %path.display(), "created archive");
        let map = if flags.mmap { Some(map_archive(&file)?) } else { None };
        let file = if flags.persistent_handle { Some(file) } else { None };
        Ok(Self {
            path,
            flags,
            entries: Vec::new(),
            lookup: HashMap::new(),
            file,
            map,
            size,
            scratch: Vec::new(),
            offsets: Vec::new(),
        })
    }

    /// Load an existing archive. The whole catalog is read into memory; no
    /// member bodies are touched.
    pub fn load<P: AsRef<Path>>(path: P, flags: OpenFlags) -> Result<Self> {
        let path = path.as_ref().to_owned();
        if flags.write && flags.mmap {
            return Err(VarkError::ModeViolation("write and mmap are mutually exclusive"));
        }

        let mut file = if flags.write {
            std::fs::OpenOptions::new().read(true).write(true).open(&path)?
        } else {
            File::open(&path)?
        };
        let trailer_offset = container::read_header(&mut file)?;
        file.seek(SeekFrom::Start(trailer_offset))?;
        let entries = container::read_trailer(std::io::BufReader::new(&mut file))?;
        let size = file.seek(SeekFrom::End(0))?;

        for entry in &entries {
            if entry.offset.checked_add(entry.size).map_or(true, |end| end > trailer_offset) {
                return Err(VarkError::Corrupt("member body overlaps the trailer"));
            }
        }

        let mut lookup = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            lookup.insert(entry.path.clone(), i);
        }

        debug!(path = %path.display(), members = entries.len(), "loaded archive");
        let map = if flags.mmap { Some(map_archive(&file)?) } else { None };
        let file = if flags.persistent_handle { Some(file) } else { None };
        Ok(Self {
            path,
            flags,
            entries,
            lookup,
            file,
            map,
            size,
            scratch: Vec::new(),
            offsets: Vec::new(),
        })
    }

    /// Release the mapping, any persistent descriptor, and the scratch
    /// buffers' capacity. Dropping the archive has the same effect.
    pub fn close(self) {
        drop(self);
    }

    // ── Write ─────────────────────────────────────────────────────────────────

    /// Read `source` from the filesystem, compress it, and append it under
    /// its portable path.
    pub fn append<P: AsRef<Path>>(&mut self, source: P, opts: AppendOptions) -> Result<()> {
        self.ensure_writable()?;
        let source = source.as_ref();
        let data = std::fs::read(source)?;
        let name = source.to_string_lossy().into_owned();
        self.append_bytes(&name, &data, opts)
    }

    /// Compress `data` and append it as member `name`.
    ///
    /// The new body overwrites the old trailer in place, a fresh trailer is
    /// written after it, and the header pointer flips last; a failure before
    /// that final write leaves the previous on-disk catalog intact.
    pub fn append_bytes(&mut self, name: &str, data: &[u8], opts: AppendOptions) -> Result<()> {
        self.ensure_writable()?;
        let key = container::portable_path(Path::new(name))?;
        if self.lookup.contains_key(&key) {
            return Err(VarkError::Unsupported("member paths must be unique"));
        }

        let shard_size = if opts.sharded {
            if opts.shard_size == 0 { DEFAULT_SHARD_SIZE } else { opts.shard_size }
        } else {
            0
        };
        let body = if opts.sharded {
            member::encode_sharded(data, shard_size)
        } else {
            member::encode_whole(data)
        };
        let content_hash = fnv1a_64(data);

        let mut handle = match self.file.as_mut() {
            Some(f) => FileHandle::Borrowed(f),
            None => FileHandle::Owned(
                std::fs::OpenOptions::new().read(true).write(true).open(&self.path)?,
            ),
        };
        let file = handle.file();

        file.seek(SeekFrom::Start(4))?;
        let trailer_offset = file.read_u64::<LittleEndian>()?;
        file.seek(SeekFrom::Start(trailer_offset))?;
        file.write_all(&body)?;

        self.entries.push(Entry {
            path: key.clone(),
            offset: trailer_offset,
            size: body.len() as u64,
            content_hash,
            shard_size,
        });
        self.lookup.insert(key, self.entries.len() - 1);

        let new_trailer_offset = trailer_offset + body.len() as u64;
        let mut trailer = Vec::new();
        container::write_trailer(&mut trailer, &self.entries)?;
        file.write_all(&trailer)?;

        // Commit point: the header pointer moves only once the body and the
        // new trailer are both on disk.
        file.seek(SeekFrom::Start(4))?;
        file.write_u64::<LittleEndian>(new_trailer_offset)?;
        file.flush()?;

        self.size = new_trailer_offset + trailer.len() as u64;
        debug!(
            member = %self.entries[self.entries.len() - 1].path,
            bytes = data.len(),
            sharded = opts.sharded,
            "appended member"
        );
        Ok(())
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    /// Return the full uncompressed contents of a member and verify them
    /// against the stored content hash.
    pub fn decompress(&mut self, name: &str) -> Result<Vec<u8>> {
        self.ensure_readable()?;
        let idx = self.entry_index(name)?;
        let entry = &self.entries[idx];
        let mut src = open_source(&self.map, &mut self.file, &self.path)?;
        let data = if entry.shard_size == 0 {
            member::decode_whole(&mut src, entry, &mut self.scratch)?
        } else {
            member::decode_sharded(
                &mut src,
                entry,
                entry.shard_size,
                &mut self.scratch,
                &mut self.offsets,
            )?
        };
        if fnv1a_64(&data) != entry.content_hash {
            return Err(VarkError::Corrupt("content hash mismatch"));
        }
        Ok(data)
    }

    /// Return `[offset, offset + length)` of a sharded member's uncompressed
    /// stream, decoding only the shards the range overlaps.
    pub fn decompress_range(&mut self, name: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.ensure_readable()?;
        let idx = self.entry_index(name)?;
        let entry = &self.entries[idx];
        if entry.shard_size == 0 {
            return Err(VarkError::Unsupported("ranged reads need a sharded member"));
        }
        let mut src = open_source(&self.map, &mut self.file, &self.path)?;
        member::decode_sharded_range(
            &mut src,
            entry,
            entry.shard_size,
            offset,
            length,
            &mut self.scratch,
            &mut self.offsets,
        )
    }

    /// Return a member's uncompressed length from its body header alone.
    pub fn uncompressed_size(&mut self, name: &str) -> Result<u64> {
        self.ensure_readable()?;
        let idx = self.entry_index(name)?;
        let entry = &self.entries[idx];
        let mut src = open_source(&self.map, &mut self.file, &self.path)?;
        member::uncompressed_size(&mut src, entry, &mut self.scratch)
    }

    // ── Catalog ──────────────────────────────────────────────────────────────

    /// Catalog records in append order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On-disk archive length in bytes.
    pub fn archive_size(&self) -> u64 {
        self.size
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    fn entry_index(&self, name: &str) -> Result<usize> {
        let key = container::portable_path(Path::new(name))?;
        self.lookup
            .get(&key)
            .copied()
            .ok_or(VarkError::NotFound(key))
    }

    fn ensure_readable(&self) -> Result<()> {
        if self.flags.write {
            return Err(VarkError::ModeViolation("archive is opened for writing"));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if !self.flags.write {
            return Err(VarkError::ModeViolation("archive is opened read-only"));
        }
        Ok(())
    }
}

/// Build one operation's byte source from the engine's backing state: the
/// mapping when present, otherwise the persistent descriptor, otherwise a
/// descriptor owned by the operation.
fn open_source<'a>(
    map: &'a Option<Mmap>,
    file: &'a mut Option<File>,
    path: &Path,
) -> Result<ByteSource<'a>> {
    if let Some(map) = map {
        return Ok(ByteSource::Mapped(&map[..]));
    }
    Ok(ByteSource::Buffered(match file.as_mut() {
        Some(f) => FileHandle::Borrowed(f),
        None => FileHandle::Owned(File::open(path)?),
    }))
}
