//! Block buffer cache.
//!
//! The single mediator between filesystem drivers and block devices:
//! filesystems never touch a device directly, they borrow buffers keyed by
//! `(device, block)` and the cache takes care of reads, deferred writeback
//! and reuse. Mutual exclusion per buffer is the busy flag: a buffer is
//! either free in the cache or exclusively held by one caller.
//!
//! The surface is the classic quartet — `geteblk`, `getblk`, `bread`,
//! `brelse` — plus the writeback helpers `bwrite`/`bdwrite`, the read-ahead
//! variant `breadn`, and the `incore`/`allocbuf` utilities.
//!
//! Policy decisions (documented, swappable):
//! - a `getblk` on a busy buffer blocks by yield-spinning through
//!   [`crate::sched`]; `slptimeo` bounds the wait in yield iterations
//!   (0 = wait forever) and expiry fails with [`BioError::Busy`];
//! - eviction is strict LRU by release order, dirty victims are written
//!   back before their storage is given up; busy buffers are never
//!   candidates. Victim selection lives in one place (`evict_locked`).

extern crate alloc;

mod buf;

pub use buf::{Buf, BufFlags, BufRef};

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use fos_error::define_kernel_error;
use fos_utils::{HashMap, Lazy, Mutex};

use crate::dev::{BlockDevice, BlockError, DevSpec};
use crate::fs::vfs::vnode::Vnode;
use crate::sched;

define_kernel_error! {
    /// Buffer cache error type. Error codes in range 0x07xx (bio subsystem).
    pub enum BioError(0x07) {
        /// Bounded wait for a busy buffer expired
        Busy = 0x01 => "Buffer busy",
        /// The vnode does not reference a block device
        NotADevice = 0x02 => "Not a device vnode",
        /// Zero size, not block-aligned, or past the end of the device
        InvalidSize = 0x03 => "Invalid buffer size",
        /// Block device error
        Device(BlockError) = 0x04 => "Block device I/O failed",
    }
}

/// Allocation rounding granularity for buffer storage.
pub const BLOCK_GRANULARITY: usize = 512;

/// Keyed buffers the cache will hold before evicting.
pub const NR_BUFS: usize = 64;

struct BufCache {
    /// `(dev_id, blkno)` -> buffer
    hash: HashMap<(u64, u64), BufRef>,
    /// Non-busy keyed buffers in release order; front is the LRU victim
    freelist: VecDeque<(u64, u64)>,
}

static BCACHE: Lazy<Mutex<BufCache>> = Lazy::new(|| {
    Mutex::new(BufCache {
        hash: HashMap::new(),
        freelist: VecDeque::new(),
    })
});

/// Resolve the device behind a device vnode.
fn devspec_of(vn: &Vnode) -> Result<(Arc<dyn BlockDevice>, u64), BioError> {
    let spec = vn.specinfo::<DevSpec>().ok_or(BioError::NotADevice)?;
    Ok((Arc::clone(&spec.dev), spec.dev_id))
}

/// Pick the least-recently-released free buffer as the eviction victim.
///
/// The victim is claimed (busy) but left in the hash so a concurrent
/// `getblk` of the same key waits instead of racing the writeback; the
/// caller flushes it outside the cache lock and then removes it. Returns
/// `None` when every buffer is busy.
fn evict_locked(cache: &mut BufCache) -> Option<((u64, u64), BufRef)> {
    let key = cache.freelist.pop_front()?;
    let victim = cache.hash.get(&key).cloned()?;
    let claimed = victim.try_claim();
    debug_assert!(claimed, "free-list buffer was busy");
    Some((key, victim))
}

/// Write an eviction victim back if it carries deferred data.
fn flush_victim(victim: &BufRef) -> Result<(), BioError> {
    if victim
        .flags()
        .intersects(BufFlags::DIRTY | BufFlags::DELWRI)
    {
        victim.flush_to_dev().inspect_err(|e| {
            log::error!(
                "bio: writeback of evicted buffer (dev {} blk {}) failed: {}",
                victim.dev_id(),
                victim.blkno(),
                e
            );
        })?;
    }
    Ok(())
}

/// Allocate an anonymous (not device-backed) buffer of `size` bytes.
///
/// The buffer is busy and zeroed; `bcount` is exactly `size` even though
/// the allocation is rounded up to [`BLOCK_GRANULARITY`].
pub fn geteblk(size: usize) -> Result<BufRef, BioError> {
    if size == 0 {
        return Err(BioError::InvalidSize);
    }
    Ok(Arc::new(Buf::new_anon(size)))
}

/// Get the buffer for `(devvn, blkno)`, marking it busy.
///
/// A cached free buffer is claimed without I/O; a cached busy buffer makes
/// the caller wait (see module policy notes); a miss allocates a fresh
/// buffer with **unvalidated** contents — use [`bread`] when the data must
/// come from the device.
pub fn getblk(devvn: &Vnode, blkno: u64, size: usize, slptimeo: usize) -> Result<BufRef, BioError> {
    let (dev, dev_id) = devspec_of(devvn)?;
    let bsize = dev.block_size();
    if size == 0 || size % bsize != 0 {
        return Err(BioError::InvalidSize);
    }
    if blkno + (size / bsize) as u64 > dev.num_blocks() {
        return Err(BioError::InvalidSize);
    }

    let key = (dev_id, blkno);
    let mut waited = 0usize;
    loop {
        {
            let mut cache = BCACHE.lock();
            if let Some(bp) = cache.hash.get(&key).cloned() {
                if bp.try_claim() {
                    cache.freelist.retain(|k| *k != key);
                    return Ok(bp);
                }
                // Busy in another thread; wait below with the lock dropped.
            } else {
                if cache.hash.len() >= NR_BUFS {
                    match evict_locked(&mut cache) {
                        Some((victim_key, victim)) => {
                            drop(cache);
                            let res = flush_victim(&victim);
                            BCACHE.lock().hash.remove(&victim_key);
                            res?;
                            continue;
                        }
                        // Every buffer is busy; wait for a release.
                        None => {}
                    }
                } else {
                    let bp = Arc::new(Buf::new_keyed(Arc::clone(&dev), dev_id, blkno, size));
                    cache.hash.insert(key, Arc::clone(&bp));
                    return Ok(bp);
                }
            }
        }

        waited += 1;
        if slptimeo != 0 && waited >= slptimeo {
            return Err(BioError::Busy);
        }
        sched::yield_now();
    }
}

/// Read the block at `(devvn, blkno)`: `getblk` plus a device read unless
/// the buffer is already valid.
///
/// On a device failure the buffer is released back to the cache — free and
/// not valid — and the error propagates.
pub fn bread(devvn: &Vnode, blkno: u64, size: usize) -> Result<BufRef, BioError> {
    let bp = getblk(devvn, blkno, size, 0)?;
    if bp.flags().contains(BufFlags::VALID) {
        return Ok(bp);
    }
    match bp.fill_from_dev() {
        Ok(()) => Ok(bp),
        Err(e) => {
            brelse(&bp);
            Err(BioError::Device(e))
        }
    }
}

/// `bread` plus best-effort read-ahead of `rablks`.
///
/// Read-ahead blocks are filled, marked valid, and released so later
/// `bread`s hit in core; a contended or failing read-ahead block is simply
/// skipped.
pub fn breadn(devvn: &Vnode, blkno: u64, size: usize, rablks: &[u64]) -> Result<BufRef, BioError> {
    let bp = bread(devvn, blkno, size)?;
    for &ra in rablks {
        if incore(devvn, ra).is_some() {
            continue;
        }
        let Ok(rb) = getblk(devvn, ra, size, 1) else {
            continue;
        };
        if !rb.flags().contains(BufFlags::VALID) {
            let _ = rb.fill_from_dev(); // failure recorded in the buffer
        }
        brelse(&rb);
    }
    Ok(bp)
}

/// Release a buffer: clear busy and make it claimable again.
///
/// Deferred-write data stays in the buffer; it is written back when the
/// buffer is evicted (or explicitly via [`bwrite`] before releasing).
pub fn brelse(bp: &BufRef) {
    let mut cache = BCACHE.lock();
    bp.unbusy();
    if !bp.is_anon() {
        let key = (bp.dev_id(), bp.blkno());
        if cache.hash.contains_key(&key) && !cache.freelist.contains(&key) {
            cache.freelist.push_back(key);
        }
    }
}

/// Synchronous writeback: flush to the device, then release.
pub fn bwrite(bp: &BufRef) -> Result<(), BioError> {
    let res = bp.flush_to_dev();
    brelse(bp);
    res.map_err(BioError::Device)
}

/// Delayed write: mark the contents authoritative and release; writeback
/// happens before the buffer's storage is reused for another key.
pub fn bdwrite(bp: &BufRef) {
    bp.set_flags(BufFlags::VALID | BufFlags::DIRTY | BufFlags::DELWRI);
    brelse(bp);
}

/// Is the block in core? Returns the buffer without claiming it.
pub fn incore(devvn: &Vnode, blkno: u64) -> Option<BufRef> {
    let (_, dev_id) = devspec_of(devvn).ok()?;
    BCACHE.lock().hash.get(&(dev_id, blkno)).cloned()
}

/// Expand or contract a busy buffer's valid length.
///
/// Growth zero-fills; shrinking loses the truncated data, so the caller
/// must have written it out first if it mattered.
pub fn allocbuf(bp: &BufRef, size: usize) {
    bp.resize(size);
}

/// Number of keyed buffers currently cached (sysctl introspection).
pub fn nbuf() -> usize {
    BCACHE.lock().hash.len()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::dev::{self, Ramdisk};
    use crate::fs::vfs::vnode::VnodeRef;

    fn fixture(blocks: u64) -> (Arc<Ramdisk>, VnodeRef) {
        crate::sched::set_yield_hook(std::thread::yield_now);
        let rd = Ramdisk::new(512, blocks);
        let vn = dev::make_dev_vnode(rd.clone());
        (rd, vn)
    }

    #[test]
    fn test_geteblk_basics() {
        let bp = geteblk(4096).unwrap();
        assert_eq!(bp.bcount(), 4096);
        assert!(bp.bufsize() >= 4096);
        assert!(bp.flags().contains(BufFlags::BUSY));
        bp.with_data(|d| assert!(d.iter().all(|&b| b == 0)));

        brelse(&bp);
        assert!(!bp.flags().contains(BufFlags::BUSY));

        // Rounding keeps the requested count, not the allocation size.
        let bp = geteblk(100).unwrap();
        assert_eq!(bp.bcount(), 100);
        assert_eq!(bp.bufsize() % BLOCK_GRANULARITY, 0);
        assert!(bp.bufsize() >= 100);
        brelse(&bp);

        assert_eq!(geteblk(0).map(|_| ()), Err(BioError::InvalidSize));
    }

    #[test]
    fn test_getblk_claims_and_excludes() {
        let (_rd, vn) = fixture(8);

        let bp = getblk(&vn, 3, 512, 0).unwrap();
        assert!(bp.flags().contains(BufFlags::BUSY));

        // Second claim on the same key must not succeed while busy.
        assert_eq!(getblk(&vn, 3, 512, 4).map(|_| ()), Err(BioError::Busy));

        // While busy the buffer is visible but never an eviction victim.
        let seen = incore(&vn, 3).unwrap();
        assert!(Arc::ptr_eq(&seen, &bp));

        brelse(&bp);
        let again = getblk(&vn, 3, 512, 0).unwrap();
        assert_eq!(again.blkno(), 3);
        assert!(again.flags().contains(BufFlags::BUSY));
        brelse(&again);
    }

    #[test]
    fn test_getblk_validates_parameters() {
        let (_rd, vn) = fixture(8);
        assert_eq!(getblk(&vn, 0, 0, 0).map(|_| ()), Err(BioError::InvalidSize));
        assert_eq!(getblk(&vn, 0, 100, 0).map(|_| ()), Err(BioError::InvalidSize));
        assert_eq!(getblk(&vn, 8, 512, 0).map(|_| ()), Err(BioError::InvalidSize));
        assert_eq!(
            getblk(&vn, 7, 1024, 0).map(|_| ()),
            Err(BioError::InvalidSize)
        );
    }

    #[test]
    fn test_getblk_blocks_until_release() {
        use std::time::{Duration, Instant};
        let (_rd, vn) = fixture(8);

        let bp = getblk(&vn, 5, 512, 0).unwrap();
        let vn2 = vn.clone();
        let start = Instant::now();
        let waiter = std::thread::spawn(move || {
            let bp = getblk(&vn2, 5, 512, 0).unwrap();
            let waited = start.elapsed();
            brelse(&bp);
            waited
        });

        std::thread::sleep(Duration::from_millis(100));
        brelse(&bp);
        let waited = waiter.join().unwrap();
        assert!(waited >= Duration::from_millis(100));
    }

    #[test]
    fn test_bread_zero_device() {
        let (_rd, vn) = fixture(8);
        let bp = bread(&vn, 2, 512).unwrap();
        assert!(bp.flags().contains(BufFlags::VALID));
        bp.with_data(|d| {
            assert_eq!(d.len(), 512);
            assert!(d.iter().all(|&b| b == 0));
        });
        brelse(&bp);
    }

    #[test]
    fn test_bwrite_reaches_device() {
        let (rd, vn) = fixture(8);
        let bp = getblk(&vn, 6, 512, 0).unwrap();
        bp.with_data_mut(|d| d[..4].copy_from_slice(b"sync"));
        bwrite(&bp).unwrap();
        assert!(!bp.flags().contains(BufFlags::BUSY));
        assert!(!bp.flags().contains(BufFlags::DIRTY));

        let mut block = [0u8; 512];
        rd.read_blocks(6, &mut block).unwrap();
        assert_eq!(&block[..4], b"sync");
    }

    #[test]
    fn test_bdwrite_defers_until_eviction() {
        // Dirty data written with bdwrite must survive arbitrary cache
        // pressure: the pool never exceeds NR_BUFS and every evicted dirty
        // buffer is flushed to its device first.
        let blocks = (NR_BUFS + 8) as u64;
        let (_rd, vn) = fixture(blocks);

        for blkno in 0..blocks {
            let bp = getblk(&vn, blkno, 512, 0).unwrap();
            bp.with_data_mut(|d| {
                d[0] = blkno as u8;
                d[1] = 0xFE;
            });
            bdwrite(&bp);
            assert!(nbuf() <= NR_BUFS);
        }

        for blkno in 0..blocks {
            let bp = bread(&vn, blkno, 512).unwrap();
            bp.with_data(|d| {
                assert_eq!(d[0], blkno as u8);
                assert_eq!(d[1], 0xFE);
            });
            brelse(&bp);
        }
    }

    #[test]
    fn test_bread_error_leaves_buffer_free() {
        struct BrokenDisk;
        impl BlockDevice for BrokenDisk {
            fn block_size(&self) -> usize {
                512
            }
            fn num_blocks(&self) -> u64 {
                4
            }
            fn read_blocks(&self, _blkno: u64, _buf: &mut [u8]) -> Result<(), BlockError> {
                Err(BlockError::ReadFailed)
            }
            fn write_blocks(&self, _blkno: u64, _buf: &[u8]) -> Result<(), BlockError> {
                Err(BlockError::WriteFailed)
            }
        }

        crate::sched::set_yield_hook(std::thread::yield_now);
        let vn = dev::make_dev_vnode(Arc::new(BrokenDisk));

        assert_eq!(
            bread(&vn, 0, 512).map(|_| ()),
            Err(BioError::Device(BlockError::ReadFailed))
        );

        // The failed buffer is free (claimable) and not valid.
        let bp = getblk(&vn, 0, 512, 4).unwrap();
        assert!(!bp.flags().contains(BufFlags::VALID));
        assert!(bp.flags().contains(BufFlags::ERROR));
        assert_eq!(bp.error(), Some(BlockError::ReadFailed));
        brelse(&bp);
    }

    #[test]
    fn test_breadn_read_ahead() {
        let (rd, vn) = fixture(16);
        let mut block = [0u8; 512];
        block[0] = 0x5A;
        rd.write_blocks(11, &block).unwrap();

        let bp = breadn(&vn, 10, 512, &[11, 12]).unwrap();
        brelse(&bp);

        // Read-ahead blocks are in core and already valid.
        let ra = incore(&vn, 11).unwrap();
        assert!(ra.flags().contains(BufFlags::VALID));
        assert!(!ra.flags().contains(BufFlags::BUSY));
        ra.read_at(0, &mut block);
        assert_eq!(block[0], 0x5A);
    }

    #[test]
    fn test_allocbuf_grow_and_shrink() {
        let bp = geteblk(100).unwrap();
        bp.with_data_mut(|d| d.fill(0xAA));

        allocbuf(&bp, 2000);
        assert_eq!(bp.bcount(), 2000);
        assert!(bp.bufsize() >= 2000);
        bp.with_data(|d| {
            assert!(d[..100].iter().all(|&b| b == 0xAA)); // old data kept
            assert!(d[100..].iter().all(|&b| b == 0)); // growth zero-filled
        });

        allocbuf(&bp, 50);
        assert_eq!(bp.bcount(), 50);
        assert!(bp.bufsize() >= 50);
        brelse(&bp);
    }
}
