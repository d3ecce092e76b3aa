//! Named POSIX shared-memory segments with a small object directory.
//!
//! A segment starts with a directory of up to [`MAX_ENTRIES`] named
//! structures, followed by the structures themselves, each aligned to
//! [`OBJECT_ALIGN`] bytes:
//!
//! ```text
//!   +-----------+---------+----------+-----+
//!   | directory | object0 | object1  | ... |
//!   +-----------+---------+----------+-----+
//! ```
//!
//! The creating process holds an [`OwnedSegment`], constructs structures in
//! place and unlinks the segment when dropped. Every other process opens an
//! [`Attachment`], which only unmaps. Both dereference to [`Segment`], whose
//! [`Segment::find`] resolves a structure by name and checks its size.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::mem::{align_of, size_of};
use std::ops::Deref;
use std::os::fd::FromRawFd;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::Zeroable;
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Maximum number of named structures in one segment.
pub const MAX_ENTRIES: usize = 16;

/// Size of a directory name field, including the terminating NUL.
pub const NAME_LEN: usize = 32;

/// Alignment of every structure in the segment.
pub const OBJECT_ALIGN: usize = 64;

/// Smallest segment the manager creates.
pub const MIN_SEGMENT_SIZE: usize = 1 << 20;

#[repr(C)]
#[derive(Clone, Copy)]
struct Entry {
    name: [u8; NAME_LEN],
    offset: u64,
    len: u64,
    count: u64,
}

#[repr(C)]
struct Directory {
    /// Number of published entries.
    published: AtomicU32,
    _pad: u32,
    size: u64,
    entries: [Entry; MAX_ENTRIES],
}

/// Bytes reserved for the directory at the start of every segment.
pub const DIRECTORY_SIZE: usize = align_up(size_of::<Directory>(), OBJECT_ALIGN);

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Bytes needed to hold `count` values of `T` after `used` bytes, including
/// alignment padding.
pub const fn footprint<T>(used: usize, count: usize) -> usize {
    let align = if align_of::<T>() > OBJECT_ALIGN {
        align_of::<T>()
    } else {
        OBJECT_ALIGN
    };
    align_up(used, align) + count * size_of::<T>()
}

fn shm_path(name: &str) -> Result<CString> {
    CString::new(format!("/{name}"))
        .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))
}

fn encode_name(name: &str) -> Result<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= NAME_LEN || bytes.contains(&0) {
        return Err(TransportError::NameTooLong(name.to_string()));
    }
    let mut out = [0u8; NAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn decode_name(raw: &[u8; NAME_LEN]) -> &[u8] {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    &raw[..end]
}

/// A mapped segment. Shared by [`OwnedSegment`] and [`Attachment`].
pub struct Segment {
    name: String,
    base: NonNull<u8>,
    len: usize,
    _map: MmapMut,
}

// SAFETY: the mapping is process-shared memory. Every structure handed out by
// `find` is `Sync` and mediates its own mutation.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    fn map(name: &str, file: &File, len: usize) -> Result<Self> {
        // SAFETY: the file is a shared-memory object of at least `len` bytes.
        // Concurrent modification by other processes is the point of the
        // mapping and is mediated by the atomics in the mapped structures.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(file)? };
        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| TransportError::Io(io::Error::other("mmap returned null")))?;
        Ok(Segment {
            name: name.to_string(),
            base,
            len,
            _map: map,
        })
    }

    /// Segment name, without the leading slash.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn directory(&self) -> *mut Directory {
        self.base.as_ptr().cast()
    }

    /// Size the creator wrote into the directory; zero until it has.
    fn recorded_size(&self) -> usize {
        // SAFETY: the directory lies at the start of every mapping and the
        // size is written once, before any structure is published.
        unsafe { ptr::addr_of!((*self.directory()).size).read_volatile() as usize }
    }

    fn published(&self) -> usize {
        // SAFETY: the directory lies at the start of every mapping.
        let published = unsafe { &(*self.directory()).published };
        (published.load(Ordering::Acquire) as usize).min(MAX_ENTRIES)
    }

    fn entry(&self, index: usize) -> Entry {
        debug_assert!(index < MAX_ENTRIES);
        // SAFETY: in bounds. Entries below the published count are never
        // written again, and the Acquire load of the count orders this read
        // after the owner's write.
        unsafe { ptr::addr_of!((*self.directory()).entries[index]).read() }
    }

    fn lookup(&self, name: &str) -> Option<Entry> {
        (0..self.published())
            .map(|i| self.entry(i))
            .find(|e| decode_name(&e.name) == name.as_bytes())
    }

    /// Names of all published structures, in construction order.
    pub fn structure_names(&self) -> Vec<String> {
        (0..self.published())
            .map(|i| String::from_utf8_lossy(decode_name(&self.entry(i).name)).into_owned())
            .collect()
    }

    /// Resolves a structure by name as a slice of `T`.
    ///
    /// Fails with [`TransportError::StructureMissing`] if no such structure
    /// has been published, or [`TransportError::LayoutMismatch`] if its byte
    /// length is not a whole number of `T`.
    pub fn find<T: Zeroable + Sync>(&self, name: &str) -> Result<&[T]> {
        let entry = self
            .lookup(name)
            .ok_or_else(|| TransportError::StructureMissing(name.to_string()))?;

        let offset = entry.offset as usize;
        let len = entry.len as usize;
        let count = entry.count as usize;
        let expected = count * size_of::<T>();
        if len != expected
            || offset % align_of::<T>() != 0
            || offset.checked_add(len).is_none_or(|end| end > self.len)
        {
            return Err(TransportError::LayoutMismatch {
                name: name.to_string(),
                expected,
                found: len,
            });
        }

        // SAFETY: the range lies inside the mapping, is aligned for `T`, and
        // was initialised before its entry was published.
        let data = unsafe { self.base.as_ptr().add(offset) }.cast::<T>();
        Ok(unsafe { std::slice::from_raw_parts(data, count) })
    }

    /// Resolves a structure that holds exactly one `T`.
    pub fn find_one<T: Zeroable + Sync>(&self, name: &str) -> Result<&T> {
        match self.find::<T>(name)? {
            [one] => Ok(one),
            other => Err(TransportError::LayoutMismatch {
                name: name.to_string(),
                expected: size_of::<T>(),
                found: std::mem::size_of_val(other),
            }),
        }
    }
}

/// A segment created by this process. Unlinked on drop.
pub struct OwnedSegment {
    segment: Segment,
    cursor: usize,
}

impl OwnedSegment {
    /// Creates a new segment of at least `size` bytes.
    ///
    /// Fails with [`TransportError::SegmentExists`] if the name is taken.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let path = shm_path(name)?;
        let size = size.max(DIRECTORY_SIZE);

        // SAFETY: `path` is a valid NUL-terminated string.
        let fd = unsafe {
            libc::shm_open(
                path.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600 as libc::mode_t,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EEXIST) => TransportError::SegmentExists(name.to_string()),
                _ => TransportError::Io(err),
            });
        }
        // SAFETY: `fd` is a freshly opened descriptor we own.
        let file = unsafe { File::from_raw_fd(fd) };

        let segment = file
            .set_len(size as u64)
            .map_err(TransportError::from)
            .and_then(|()| Segment::map(name, &file, size));
        let segment = match segment {
            Ok(segment) => segment,
            Err(err) => {
                // SAFETY: valid path; the segment is ours and must not leak.
                unsafe { libc::shm_unlink(path.as_ptr()) };
                return Err(err);
            }
        };

        // SAFETY: the mapping is zero-filled and exclusively ours until
        // another process opens it.
        unsafe { (*segment.directory()).size = size as u64 };
        debug!(name, size, "created shared memory segment");

        Ok(OwnedSegment {
            segment,
            cursor: DIRECTORY_SIZE,
        })
    }

    /// Removes any existing segment with this name, then creates a new one.
    pub fn create_fresh(name: &str, size: usize) -> Result<Self> {
        if Self::remove(name)? {
            warn!(name, "removed stale shared memory segment");
        }
        Self::create(name, size)
    }

    /// Unlinks a segment by name. Returns `false` if it did not exist.
    pub fn remove(name: &str) -> Result<bool> {
        let path = shm_path(name)?;
        // SAFETY: `path` is a valid NUL-terminated string.
        if unsafe { libc::shm_unlink(path.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOENT) => Ok(false),
            _ => Err(err.into()),
        }
    }

    /// Bytes not yet used by constructed structures.
    pub fn remaining(&self) -> usize {
        self.segment.len.saturating_sub(self.cursor)
    }

    /// Places `count` values of `T` under `name`, letting `fill` initialise
    /// them in place, then publishes the entry.
    ///
    /// The values start out zeroed. Attachments cannot see the structure
    /// until `fill` has returned.
    pub fn construct_with<T: Zeroable + Sync>(
        &mut self,
        name: &str,
        count: usize,
        fill: impl FnOnce(&mut [T]),
    ) -> Result<()> {
        let encoded = encode_name(name)?;
        let index = self.segment.published();
        if index >= MAX_ENTRIES {
            return Err(TransportError::DirectoryFull(MAX_ENTRIES));
        }

        let end = footprint::<T>(self.cursor, count);
        let bytes = count * size_of::<T>();
        let offset = end - bytes;
        if end > self.segment.len {
            return Err(TransportError::OutOfSpace {
                requested: end - self.cursor,
                available: self.remaining(),
            });
        }

        // SAFETY: the range is inside the mapping, aligned, not part of any
        // published structure, and zero-filled, which is a valid `T`.
        let values = unsafe {
            let data = self.segment.base.as_ptr().add(offset).cast::<T>();
            std::slice::from_raw_parts_mut(data, count)
        };
        fill(values);

        let entry = Entry {
            name: encoded,
            offset: offset as u64,
            len: bytes as u64,
            count: count as u64,
        };
        // SAFETY: entry `index` is unpublished, so no reader looks at it.
        unsafe {
            let directory = self.segment.directory();
            ptr::addr_of_mut!((*directory).entries[index]).write(entry);
            (*directory).published.store(index as u32 + 1, Ordering::Release);
        }
        self.cursor = end;

        debug!(name, offset, bytes, count, "constructed structure");
        Ok(())
    }

    /// Places `count` values produced by `init(i)` under `name`.
    pub fn construct<T: Zeroable + Sync>(
        &mut self,
        name: &str,
        count: usize,
        mut init: impl FnMut(usize) -> T,
    ) -> Result<()> {
        self.construct_with::<T>(name, count, |values| {
            for (i, value) in values.iter_mut().enumerate() {
                *value = init(i);
            }
        })
    }
}

impl Deref for OwnedSegment {
    type Target = Segment;

    fn deref(&self) -> &Segment {
        &self.segment
    }
}

impl Drop for OwnedSegment {
    fn drop(&mut self) {
        match Self::remove(&self.segment.name) {
            Ok(_) => debug!(name = %self.segment.name, "unlinked shared memory segment"),
            Err(err) => warn!(name = %self.segment.name, %err, "failed to unlink segment"),
        }
    }
}

/// A non-owning view of a segment created elsewhere. Unmaps on drop.
pub struct Attachment {
    segment: Segment,
}

impl Attachment {
    /// Opens an existing segment by name.
    ///
    /// Fails with [`TransportError::SegmentMissing`] if it does not exist.
    pub fn open(name: &str) -> Result<Self> {
        let path = shm_path(name)?;
        // SAFETY: `path` is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(path.as_ptr(), libc::O_RDWR, 0 as libc::mode_t) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::ENOENT) => TransportError::SegmentMissing(name.to_string()),
                _ => TransportError::Io(err),
            });
        }
        // SAFETY: `fd` is a freshly opened descriptor we own.
        let file = unsafe { File::from_raw_fd(fd) };

        let len = file.metadata()?.len() as usize;
        if len < DIRECTORY_SIZE {
            return Err(TransportError::LayoutMismatch {
                name: "directory".to_string(),
                expected: DIRECTORY_SIZE,
                found: len,
            });
        }

        let segment = Segment::map(name, &file, len)?;
        let recorded = segment.recorded_size();
        if recorded != len {
            return Err(TransportError::LayoutMismatch {
                name: "segment".to_string(),
                expected: recorded,
                found: len,
            });
        }
        debug!(name, len, "attached to shared memory segment");
        Ok(Attachment { segment })
    }
}

impl Deref for Attachment {
    type Target = Segment;

    fn deref(&self) -> &Segment {
        &self.segment
    }
}
