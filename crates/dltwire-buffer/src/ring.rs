use tracing::{debug, warn};

use crate::error::{BufferError, Result};

/// Size of the ring head: write offset, read offset, record count.
pub const HEAD_SIZE: usize = 12;
/// Size of the header in front of every record.
pub const BLOCK_HEADER_SIZE: usize = 9;

const BLOCK_MAGIC: [u8; 4] = *b"SHM\0";
const STATUS_COMPLETE: u8 = 2;
const MAX_CHUNKS: usize = 3;

/// Memory a ring lives in.
///
/// Only heap regions can be reallocated, so only they back dynamic rings.
pub trait Region {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];

    /// A zeroed region of `len` bytes of the same kind, if this kind can grow.
    fn allocate(&self, _len: usize) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

impl Region for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self.as_slice()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }

    fn allocate(&self, len: usize) -> Option<Self> {
        Some(vec![0; len])
    }
}

impl Region for &mut [u8] {
    fn bytes(&self) -> &[u8] {
        &self[..]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self[..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sizing {
    Static,
    Dynamic {
        min: usize,
        max: usize,
        step: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct Head {
    write: i32,
    read: i32,
    count: i32,
}

/// FIFO of variable-length records in a contiguous region.
///
/// Records may straddle the end of the data area. A push needs strictly more
/// free space than the record occupies, so `read == write` always means the
/// ring is empty.
pub struct RingBuffer<R> {
    region: R,
    sizing: Sizing,
}

impl RingBuffer<Vec<u8>> {
    /// Heap ring starting at `min_size` bytes, growing by `step_size` up to
    /// `max_size` and shrinking back to `min_size` whenever it empties.
    pub fn dynamic(min_size: usize, max_size: usize, step_size: usize) -> Result<Self> {
        if min_size == 0 || max_size == 0 || step_size == 0 {
            return Err(BufferError::WrongParameter("ring sizes must be non-zero"));
        }
        if min_size > max_size {
            return Err(BufferError::WrongParameter(
                "minimum size exceeds maximum size",
            ));
        }
        if step_size > max_size {
            return Err(BufferError::WrongParameter("step size exceeds maximum size"));
        }
        if min_size <= HEAD_SIZE {
            return Err(BufferError::WrongParameter(
                "minimum size must exceed the ring head",
            ));
        }
        if max_size > i32::MAX as usize {
            return Err(BufferError::WrongParameter("maximum size out of range"));
        }

        debug!(min_size, max_size, step_size, "dynamic ring created");
        Ok(Self {
            region: vec![0; min_size],
            sizing: Sizing::Dynamic {
                min: min_size,
                max: max_size,
                step: step_size,
            },
        })
    }
}

impl<R: Region> RingBuffer<R> {
    /// Take ownership of `region` and clear it (the side that creates the ring).
    pub fn init_static(mut region: R) -> Result<Self> {
        check_region_len(region.bytes().len())?;
        region.bytes_mut().fill(0);
        debug!(size = region.bytes().len(), "static ring initialised");
        Ok(Self {
            region,
            sizing: Sizing::Static,
        })
    }

    /// Use `region` as-is (the side that attaches to an existing ring).
    pub fn attach_static(region: R) -> Result<Self> {
        check_region_len(region.bytes().len())?;
        Ok(Self {
            region,
            sizing: Sizing::Static,
        })
    }

    /// Append one record made of up to three chunks.
    ///
    /// Dynamic rings grow step by step until the record fits. If it cannot
    /// fit, the ring is left untouched and `CapacityExceeded` is returned.
    pub fn push(&mut self, chunks: &[&[u8]]) -> Result<()> {
        if chunks.len() > MAX_CHUNKS {
            return Err(BufferError::WrongParameter("at most three chunks per record"));
        }
        let payload: usize = chunks.iter().map(|chunk| chunk.len()).sum();
        if payload > i32::MAX as usize - BLOCK_HEADER_SIZE {
            return Err(BufferError::WrongParameter("record too large"));
        }
        let needed = BLOCK_HEADER_SIZE + payload;

        let (mut write, mut read, mut count) = self.checked_offsets()?;
        let free = self.free_size(write, read, count);
        if free <= needed {
            let reachable = free + self.growth_room();
            if reachable <= needed {
                warn!(needed, free, "ring full, record dropped");
                return Err(BufferError::CapacityExceeded { needed, free });
            }
            while self.free_size(write, read, count) <= needed {
                if !self.grow(write, read, count) {
                    return Err(BufferError::CapacityExceeded { needed, free });
                }
                (write, read, count) = self.checked_offsets()?;
            }
        }

        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[..4].copy_from_slice(&BLOCK_MAGIC);
        header[4] = STATUS_COMPLETE;
        header[5..].copy_from_slice(&(payload as i32).to_ne_bytes());

        let data = self.data_mut();
        let mut pos = write_wrapped(data, write, &header);
        for chunk in chunks {
            pos = write_wrapped(data, pos, chunk);
        }
        self.set_head(Head {
            write: pos as i32,
            read: read as i32,
            count: count as i32 + 1,
        });
        Ok(())
    }

    /// Remove and return the oldest record.
    pub fn pull(&mut self) -> Result<Option<Vec<u8>>> {
        let Some((pos, len)) = self.next_record()? else {
            return Ok(None);
        };
        let mut out = vec![0; len];
        let next = read_wrapped(self.data(), pos, &mut out);
        self.consume(next);
        Ok(Some(out))
    }

    /// Return the oldest record without removing it.
    pub fn copy(&mut self) -> Result<Option<Vec<u8>>> {
        let Some((pos, len)) = self.next_record()? else {
            return Ok(None);
        };
        let mut out = vec![0; len];
        read_wrapped(self.data(), pos, &mut out);
        Ok(Some(out))
    }

    /// Drop the oldest record. Returns `false` when the ring was empty.
    pub fn remove(&mut self) -> Result<bool> {
        let Some((pos, len)) = self.next_record()? else {
            return Ok(false);
        };
        let next = (pos + len) % self.size();
        self.consume(next);
        Ok(true)
    }

    /// Move the oldest record into `dest` and return its length.
    ///
    /// A record longer than `dest` is left in place.
    pub fn pull_into(&mut self, dest: &mut [u8]) -> Result<Option<usize>> {
        let Some((pos, len)) = self.next_record()? else {
            return Ok(None);
        };
        if len > dest.len() {
            return Err(BufferError::WrongParameter(
                "destination smaller than record",
            ));
        }
        let next = read_wrapped(self.data(), pos, &mut dest[..len]);
        self.consume(next);
        Ok(Some(len))
    }

    /// Clear offsets, count and data.
    pub fn reset(&mut self) {
        debug!(size = self.total_size(), "ring reset");
        self.region.bytes_mut().fill(0);
    }

    /// Bytes occupied by records including their headers.
    pub fn used_size(&self) -> usize {
        let head = self.head();
        if head.count <= 0 {
            return 0;
        }
        let size = self.size() as i64;
        let (write, read) = (i64::from(head.write), i64::from(head.read));
        let used = if write > read {
            write - read
        } else {
            size - read + write
        };
        used.clamp(0, size) as usize
    }

    pub fn message_count(&self) -> usize {
        self.head().count.max(0) as usize
    }

    /// Size of the whole region, head included.
    pub fn total_size(&self) -> usize {
        self.region.bytes().len()
    }

    /// Size of the data area.
    pub fn size(&self) -> usize {
        self.total_size() - HEAD_SIZE
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.sizing, Sizing::Dynamic { .. })
    }

    pub fn log_status(&self) {
        let head = self.head();
        debug!(
            write = head.write,
            read = head.read,
            count = head.count,
            size = self.size(),
            used = self.used_size(),
            "ring status"
        );
    }

    fn data(&self) -> &[u8] {
        &self.region.bytes()[HEAD_SIZE..]
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.region.bytes_mut()[HEAD_SIZE..]
    }

    fn head(&self) -> Head {
        let bytes = self.region.bytes();
        Head {
            write: read_i32(bytes, 0),
            read: read_i32(bytes, 4),
            count: read_i32(bytes, 8),
        }
    }

    fn set_head(&mut self, head: Head) {
        let bytes = self.region.bytes_mut();
        bytes[0..4].copy_from_slice(&head.write.to_ne_bytes());
        bytes[4..8].copy_from_slice(&head.read.to_ne_bytes());
        bytes[8..12].copy_from_slice(&head.count.to_ne_bytes());
    }

    fn corrupt(&mut self, reason: &'static str) -> BufferError {
        self.log_status();
        warn!(reason, "ring corrupted, resetting");
        self.reset();
        BufferError::CorruptState(reason)
    }

    /// Head offsets reduced into the data area, or `CorruptState` after a reset.
    fn checked_offsets(&mut self) -> Result<(usize, usize, usize)> {
        let head = self.head();
        let size = self.size();
        if head.write < 0
            || head.read < 0
            || head.count < 0
            || head.write as usize > size
            || head.read as usize > size
        {
            return Err(self.corrupt("offsets out of range"));
        }
        Ok((
            head.write as usize % size,
            head.read as usize % size,
            head.count as usize,
        ))
    }

    fn free_size(&self, write: usize, read: usize, count: usize) -> usize {
        if read > write {
            read - write
        } else if count > 0 && write == read {
            0
        } else {
            self.size() - write + read
        }
    }

    fn used_bytes(&self, write: usize, read: usize, count: usize) -> usize {
        if count == 0 {
            0
        } else if write > read {
            write - read
        } else {
            self.size() - read + write
        }
    }

    /// Bytes a dynamic ring can still add in whole steps.
    fn growth_room(&self) -> usize {
        match self.sizing {
            Sizing::Dynamic { max, step, .. } => {
                let total = self.total_size();
                if max > total {
                    (max - total) / step * step
                } else {
                    0
                }
            }
            Sizing::Static => 0,
        }
    }

    /// Reallocate one step larger, moving the records to the start of the
    /// new data area.
    fn grow(&mut self, write: usize, read: usize, count: usize) -> bool {
        let Sizing::Dynamic { max, step, .. } = self.sizing else {
            return false;
        };
        let total = self.total_size();
        if total + step > max {
            return false;
        }
        let Some(mut grown) = self.region.allocate(total + step) else {
            return false;
        };

        let used = self.used_bytes(write, read, count);
        let dest = &mut grown.bytes_mut()[HEAD_SIZE..HEAD_SIZE + used];
        read_wrapped(self.data(), read, dest);
        self.region = grown;
        self.set_head(Head {
            write: used as i32,
            read: 0,
            count: count as i32,
        });
        debug!(from = total, to = total + step, used, "ring grown");
        true
    }

    fn minimize(&mut self) {
        let Sizing::Dynamic { min, .. } = self.sizing else {
            return;
        };
        if self.total_size() == min {
            return;
        }
        if let Some(region) = self.region.allocate(min) {
            debug!(from = self.total_size(), to = min, "ring minimized");
            self.region = region;
        }
    }

    /// Validate the oldest record and return its payload position and length.
    fn next_record(&mut self) -> Result<Option<(usize, usize)>> {
        let (write, read, count) = self.checked_offsets()?;
        if count == 0 {
            if write != read {
                return Err(self.corrupt("empty ring with unequal offsets"));
            }
            return Ok(None);
        }

        let used = if write > read {
            write - read
        } else {
            self.size() - read + write
        };
        if used < BLOCK_HEADER_SIZE {
            return Err(self.corrupt("record header truncated"));
        }

        let mut header = [0u8; BLOCK_HEADER_SIZE];
        let pos = read_wrapped(self.data(), read, &mut header);
        if header[..4] != BLOCK_MAGIC {
            return Err(self.corrupt("record magic mismatch"));
        }
        if header[4] != STATUS_COMPLETE {
            return Err(self.corrupt("record not complete"));
        }
        let len = read_i32(&header, 5);
        if len < 0 || used < BLOCK_HEADER_SIZE + len as usize {
            return Err(self.corrupt("record length exceeds used space"));
        }
        Ok(Some((pos, len as usize)))
    }

    fn consume(&mut self, next_read: usize) {
        let mut head = self.head();
        head.read = next_read as i32;
        head.count -= 1;
        self.set_head(head);
        if head.count == 0 {
            self.minimize();
        }
    }

    /// Borrow the underlying region.
    pub fn get_ref(&self) -> &R {
        &self.region
    }

    /// Consume the ring and return its region.
    pub fn into_inner(self) -> R {
        self.region
    }
}

fn check_region_len(len: usize) -> Result<()> {
    if len <= HEAD_SIZE {
        return Err(BufferError::WrongParameter("region too small for a ring"));
    }
    if len > i32::MAX as usize {
        return Err(BufferError::WrongParameter("region too large for a ring"));
    }
    Ok(())
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    i32::from_ne_bytes(raw)
}

/// Copy `src` into `mem` at `pos`, wrapping at the end. Returns the next offset.
fn write_wrapped(mem: &mut [u8], pos: usize, src: &[u8]) -> usize {
    let size = mem.len();
    let pos = pos % size;
    let first = src.len().min(size - pos);
    mem[pos..pos + first].copy_from_slice(&src[..first]);
    let rest = src.len() - first;
    mem[..rest].copy_from_slice(&src[first..]);
    (pos + src.len()) % size
}

/// Fill `out` from `mem` at `pos`, wrapping at the end. Returns the next offset.
fn read_wrapped(mem: &[u8], pos: usize, out: &mut [u8]) -> usize {
    let size = mem.len();
    let pos = pos % size;
    let first = out.len().min(size - pos);
    out[..first].copy_from_slice(&mem[pos..pos + first]);
    let rest = out.len() - first;
    out[first..].copy_from_slice(&mem[..rest]);
    (pos + out.len()) % size
}
