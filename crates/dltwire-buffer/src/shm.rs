//! Ring in a memory-mapped file shared between the daemon and applications.
//!
//! The file is the region; an exclusive `flock` on it serialises access.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::ops::{Deref, DerefMut};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::error::{BufferError, Result};
use crate::ring::{Region, RingBuffer, BLOCK_HEADER_SIZE, HEAD_SIZE};

impl Region for MmapMut {
    fn bytes(&self) -> &[u8] {
        &self[..]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self[..]
    }
}

/// A static ring backed by a mapped file.
///
/// The ring is only reachable through [`SharedRing::lock`] or
/// [`SharedRing::try_lock`].
pub struct SharedRing {
    file: File,
    path: PathBuf,
    ring: RingBuffer<MmapMut>,
    owner: bool,
}

impl SharedRing {
    /// Create (or truncate) the file at `path`, size it and initialise an
    /// empty ring. The file is removed again when the ring is dropped.
    pub fn create(path: impl AsRef<Path>, size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if size <= HEAD_SIZE + BLOCK_HEADER_SIZE {
            return Err(BufferError::WrongParameter("shared ring too small"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(size as u64)?;
        let map = map_file(&file, size)?;

        flock(&file, libc::LOCK_EX)?;
        let ring = RingBuffer::init_static(map);
        release(&file);
        let ring = ring?;

        debug!(path = %path.display(), size, "shared ring created");
        Ok(Self {
            file,
            path,
            ring,
            owner: true,
        })
    }

    /// Map an existing ring file without touching its contents.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = usize::try_from(file.metadata()?.len())
            .map_err(|_| BufferError::WrongParameter("shared ring file too large"))?;
        if size <= HEAD_SIZE {
            return Err(BufferError::WrongParameter("shared ring file too small"));
        }
        let map = map_file(&file, size)?;
        let ring = RingBuffer::attach_static(map)?;

        debug!(path = %path.display(), size, "shared ring opened");
        Ok(Self {
            file,
            path,
            ring,
            owner: false,
        })
    }

    /// Wait for the exclusive lock.
    pub fn lock(&mut self) -> Result<ShmGuard<'_>> {
        flock(&self.file, libc::LOCK_EX)?;
        Ok(ShmGuard {
            ring: &mut self.ring,
            file: &self.file,
        })
    }

    /// Take the lock if nobody else holds it.
    pub fn try_lock(&mut self) -> Result<Option<ShmGuard<'_>>> {
        match flock(&self.file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(Some(ShmGuard {
                ring: &mut self.ring,
                file: &self.file,
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(BufferError::Io(err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the mapped file.
    pub fn total_size(&self) -> usize {
        self.ring.total_size()
    }
}

impl Drop for SharedRing {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "shared ring removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to remove shared ring")
            }
        }
    }
}

/// Exclusive access to a [`SharedRing`]; the lock is released on drop.
pub struct ShmGuard<'a> {
    ring: &'a mut RingBuffer<MmapMut>,
    file: &'a File,
}

impl Deref for ShmGuard<'_> {
    type Target = RingBuffer<MmapMut>;

    fn deref(&self) -> &Self::Target {
        &*self.ring
    }
}

impl DerefMut for ShmGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ring
    }
}

impl Drop for ShmGuard<'_> {
    fn drop(&mut self) {
        release(self.file);
    }
}

fn map_file(file: &File, size: usize) -> Result<MmapMut> {
    // SAFETY: the mapping is only modified through a `RingBuffer` while the
    // flock is held, and the file outlives the map inside `SharedRing`.
    let map = unsafe { MmapOptions::new().len(size).map_mut(file)? };
    Ok(map)
}

fn flock(file: &File, operation: libc::c_int) -> std::io::Result<()> {
    loop {
        // SAFETY: `file` owns an open descriptor for the duration of the call.
        if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn release(file: &File) {
    if let Err(err) = flock(file, libc::LOCK_UN) {
        warn!(error = %err, "failed to release shared ring lock");
    }
}
