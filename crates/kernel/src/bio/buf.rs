//! The buffer — one cached block of device-backed (or anonymous) data.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use bitflags::bitflags;
use fos_utils::Mutex;

use crate::dev::{BlockDevice, BlockError};

use super::BLOCK_GRANULARITY;

bitflags! {
    /// Buffer state flags.
    ///
    /// The bit values are part of the driver-visible contract — drivers
    /// inspect `BUSY` directly when deciding whether I/O is needed — so
    /// they are fixed, not incidental.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u32 {
        /// Contents are up to date with the device
        const VALID  = 0x0002;
        /// Last I/O on this buffer failed
        const ERROR  = 0x0004;
        /// Exclusively held by one caller
        const BUSY   = 0x0008;
        /// Contents modified and not yet written back
        const DIRTY  = 0x0020;
        /// Writeback deferred until eviction or an explicit flush
        const DELWRI = 0x4000;
    }
}

/// Reference to a buffer.
pub type BufRef = Arc<Buf>;

/// Mutable part of a buffer, behind one short-held lock.
struct BufState {
    flags: BufFlags,
    /// Allocated capacity; always >= bcount
    bufsize: usize,
    /// Requested/valid data length
    bcount: usize,
    /// Backing storage, `bufsize` bytes long
    data: Vec<u8>,
    /// Error left by the last failed I/O
    error: Option<BlockError>,
}

/// A block-granularity cache buffer.
///
/// Either free (claimable through the cache) or busy (exactly one holder).
/// Only the busy holder may touch the data. The `(dev_id, blkno)` key is
/// immutable; reusing storage for another key means evicting this buffer
/// and allocating a fresh one.
pub struct Buf {
    dev: Option<Arc<dyn BlockDevice>>,
    dev_id: u64,
    blkno: u64,
    state: Mutex<BufState>,
}

fn round_bufsize(size: usize) -> usize {
    size.div_ceil(BLOCK_GRANULARITY) * BLOCK_GRANULARITY
}

impl Buf {
    /// Anonymous buffer: no device, zeroed, born busy.
    pub(super) fn new_anon(size: usize) -> Self {
        let bufsize = round_bufsize(size);
        Self {
            dev: None,
            dev_id: 0,
            blkno: 0,
            state: Mutex::new(BufState {
                flags: BufFlags::BUSY,
                bufsize,
                bcount: size,
                data: vec![0; bufsize],
                error: None,
            }),
        }
    }

    /// Keyed buffer: bound to `(dev_id, blkno)`, born busy and **not**
    /// valid — the claimant fills it (usually via `bread`).
    pub(super) fn new_keyed(dev: Arc<dyn BlockDevice>, dev_id: u64, blkno: u64, size: usize) -> Self {
        let bufsize = round_bufsize(size);
        Self {
            dev: Some(dev),
            dev_id,
            blkno,
            state: Mutex::new(BufState {
                flags: BufFlags::BUSY,
                bufsize,
                bcount: size,
                data: vec![0; bufsize],
                error: None,
            }),
        }
    }

    pub fn is_anon(&self) -> bool {
        self.dev.is_none()
    }

    pub fn dev_id(&self) -> u64 {
        self.dev_id
    }

    pub fn blkno(&self) -> u64 {
        self.blkno
    }

    pub fn flags(&self) -> BufFlags {
        self.state.lock().flags
    }

    pub fn is_busy(&self) -> bool {
        self.flags().contains(BufFlags::BUSY)
    }

    /// Valid data length.
    pub fn bcount(&self) -> usize {
        self.state.lock().bcount
    }

    /// Allocated capacity; `bufsize() >= bcount()` always.
    pub fn bufsize(&self) -> usize {
        self.state.lock().bufsize
    }

    /// Error left by the last failed I/O, if any.
    pub fn error(&self) -> Option<BlockError> {
        self.state.lock().error
    }

    /// Run `f` over the valid data region `[0, bcount)`.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let st = self.state.lock();
        f(&st.data[..st.bcount])
    }

    /// Run `f` over the valid data region, mutably. Caller must hold the
    /// buffer busy and is responsible for marking it dirty afterwards
    /// (`bdwrite`/`bwrite`).
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut st = self.state.lock();
        let n = st.bcount;
        f(&mut st.data[..n])
    }

    /// Copy out of the valid region at `off`; returns bytes copied (short
    /// at the end of the region).
    pub fn read_at(&self, off: usize, dst: &mut [u8]) -> usize {
        let st = self.state.lock();
        if off >= st.bcount {
            return 0;
        }
        let n = core::cmp::min(dst.len(), st.bcount - off);
        dst[..n].copy_from_slice(&st.data[off..off + n]);
        n
    }

    /// Copy into the valid region at `off`; returns bytes copied.
    pub fn write_at(&self, off: usize, src: &[u8]) -> usize {
        let mut st = self.state.lock();
        if off >= st.bcount {
            return 0;
        }
        let n = core::cmp::min(src.len(), st.bcount - off);
        st.data[off..off + n].copy_from_slice(&src[..n]);
        n
    }

    /// Zero the valid data region.
    pub fn clear(&self) {
        let mut st = self.state.lock();
        let n = st.bcount;
        st.data[..n].fill(0);
    }

    // ========================================================================
    // Cache internals
    // ========================================================================

    /// Claim the buffer if free. Called with the cache lock held.
    pub(super) fn try_claim(&self) -> bool {
        let mut st = self.state.lock();
        if st.flags.contains(BufFlags::BUSY) {
            false
        } else {
            st.flags.insert(BufFlags::BUSY);
            true
        }
    }

    /// Drop the busy flag. Called with the cache lock held.
    pub(super) fn unbusy(&self) {
        let mut st = self.state.lock();
        debug_assert!(st.flags.contains(BufFlags::BUSY), "brelse of a free buffer");
        st.flags.remove(BufFlags::BUSY);
    }

    pub(super) fn set_flags(&self, flags: BufFlags) {
        self.state.lock().flags.insert(flags);
    }

    /// Read the device block(s) into the buffer, marking it VALID on
    /// success and ERROR on failure.
    pub(super) fn fill_from_dev(&self) -> Result<(), BlockError> {
        let dev = self.dev.as_ref().ok_or(BlockError::ReadFailed)?;
        let mut st = self.state.lock();
        let n = st.bcount;
        match dev.read_blocks(self.blkno, &mut st.data[..n]) {
            Ok(()) => {
                st.flags.insert(BufFlags::VALID);
                st.flags.remove(BufFlags::ERROR);
                st.error = None;
                Ok(())
            }
            Err(e) => {
                st.flags.insert(BufFlags::ERROR);
                st.flags.remove(BufFlags::VALID);
                st.error = Some(e);
                Err(e)
            }
        }
    }

    /// Write the buffer out to its device, clearing the dirty state on
    /// success.
    pub(super) fn flush_to_dev(&self) -> Result<(), BlockError> {
        let dev = self.dev.as_ref().ok_or(BlockError::WriteFailed)?;
        let mut st = self.state.lock();
        let n = st.bcount;
        match dev.write_blocks(self.blkno, &st.data[..n]) {
            Ok(()) => {
                st.flags.remove(BufFlags::DIRTY | BufFlags::DELWRI);
                st.flags.insert(BufFlags::VALID);
                st.error = None;
                Ok(())
            }
            Err(e) => {
                st.flags.insert(BufFlags::ERROR);
                st.error = Some(e);
                Err(e)
            }
        }
    }

    /// Grow or shrink the valid length. Growth extends the allocation in
    /// `BLOCK_GRANULARITY` steps and zero-fills the newly exposed bytes;
    /// shrinking just truncates the valid region (the data is lost).
    pub(super) fn resize(&self, size: usize) {
        let mut st = self.state.lock();
        if size > st.bufsize {
            let bufsize = round_bufsize(size);
            st.data.resize(bufsize, 0);
            st.bufsize = bufsize;
        }
        let old = st.bcount;
        st.bcount = size;
        if size > old {
            st.data[old..size].fill(0);
        }
    }
}

impl core::fmt::Debug for Buf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("Buf")
            .field("dev_id", &self.dev_id)
            .field("blkno", &self.blkno)
            .field("flags", &st.flags)
            .field("bufsize", &st.bufsize)
            .field("bcount", &st.bcount)
            .finish()
    }
}
