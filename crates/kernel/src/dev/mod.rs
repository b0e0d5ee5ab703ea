//! Block device contract.
//!
//! Device drivers are external collaborators; the core sees them only
//! through [`BlockDevice`]: block-granularity reads and writes addressed by
//! block number. Filesystem drivers never call a device directly — all
//! device I/O funnels through the buffer cache ([`crate::bio`]).

extern crate alloc;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use fos_error::define_kernel_error;

use crate::bio;
use crate::fs::mode;
use crate::fs::vfs::error::{VfsError, VfsResult};
use crate::fs::vfs::ops::VnodeOps;
use crate::fs::vfs::vnode::{Vnode, VnodeRef};

mod ramdisk;

pub use ramdisk::Ramdisk;

define_kernel_error! {
    /// Block device error type. Error codes in range 0x06xx (dev subsystem).
    pub enum BlockError(0x06) {
        /// Read operation failed
        ReadFailed = 0x01 => "Block read failed",
        /// Write operation failed
        WriteFailed = 0x02 => "Block write failed",
        /// Buffer length is not a multiple of the block size
        InvalidBufferSize = 0x03 => "Invalid buffer size",
        /// Access past the end of the device
        OutOfRange = 0x04 => "Block number out of range",
    }
}

/// The contract every block device driver implements.
///
/// `buf` lengths must be a whole number of blocks; partial-block transfers
/// are the buffer cache's job, not the driver's.
pub trait BlockDevice: Send + Sync {
    /// Transfer granularity in bytes.
    fn block_size(&self) -> usize;

    /// Device capacity in blocks.
    fn num_blocks(&self) -> u64;

    /// Read whole blocks starting at `blkno` into `buf`.
    fn read_blocks(&self, blkno: u64, buf: &mut [u8]) -> Result<(), BlockError>;

    /// Write whole blocks starting at `blkno` from `buf`.
    fn write_blocks(&self, blkno: u64, buf: &[u8]) -> Result<(), BlockError>;
}

/// Driver-private state of a device vnode: the device identity plus the
/// driver handle. Stored as the vnode's specinfo.
pub struct DevSpec {
    pub dev_id: u64,
    pub dev: Arc<dyn BlockDevice>,
}

impl DevSpec {
    /// Bind a device to a freshly allocated device id. The result is what
    /// `mknod` expects as the spec argument for a block device node.
    pub fn new(dev: Arc<dyn BlockDevice>) -> Arc<Self> {
        Arc::new(Self {
            dev_id: alloc_dev_id(),
            dev,
        })
    }
}

/// Device identifier allocator, shared with virtual (device-less) mounts.
static NEXT_DEV_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn alloc_dev_id() -> u64 {
    NEXT_DEV_ID.fetch_add(1, Ordering::SeqCst)
}

/// Look up the device behind a vnode, if it is a device vnode.
pub fn device_of(vn: &Vnode) -> Option<Arc<dyn BlockDevice>> {
    vn.specinfo::<DevSpec>().map(|s| Arc::clone(&s.dev))
}

/// Wrap a device in an anonymous device vnode.
///
/// The vnode's number is the allocated device id and its `read`/`write`
/// operations go through the buffer cache. The vnode belongs to no
/// superblock; filesystems that want it visible hang it into a directory
/// with `mknod`.
pub fn make_dev_vnode(dev: Arc<dyn BlockDevice>) -> VnodeRef {
    let bytes = dev.num_blocks() * dev.block_size() as u64;
    let spec = DevSpec::new(dev);
    let vn = Vnode::new(
        spec.dev_id,
        mode::make_mode(mode::S_IFBLK, 0o600),
        &DEV_VNODE_OPS,
        None,
        spec,
        || {},
    );
    vn.len.store(bytes, Ordering::Relaxed);
    vn
}

/// Operations of a device vnode: positioned raw I/O through the cache.
pub struct DevVnodeOps;

pub static DEV_VNODE_OPS: DevVnodeOps = DevVnodeOps;

impl VnodeOps for DevVnodeOps {
    fn read(&self, vn: &Vnode, off: &mut u64, buf: &mut [u8]) -> VfsResult<usize> {
        let dev = device_of(vn).ok_or(VfsError::IoError)?;
        let bsize = dev.block_size();
        let total = dev.num_blocks() * bsize as u64;
        if *off >= total {
            return Ok(0); // EOF
        }
        let want = core::cmp::min(buf.len() as u64, total - *off) as usize;

        let mut done = 0;
        while done < want {
            let pos = *off + done as u64;
            let blkno = pos / bsize as u64;
            let boff = (pos % bsize as u64) as usize;
            let n = core::cmp::min(bsize - boff, want - done);

            let bp = bio::bread(vn, blkno, bsize)?;
            bp.with_data(|d| buf[done..done + n].copy_from_slice(&d[boff..boff + n]));
            bio::brelse(&bp);
            done += n;
        }
        *off += done as u64;
        Ok(done)
    }

    fn write(&self, vn: &Vnode, off: &mut u64, buf: &[u8]) -> VfsResult<usize> {
        let dev = device_of(vn).ok_or(VfsError::IoError)?;
        let bsize = dev.block_size();
        let total = dev.num_blocks() * bsize as u64;
        if *off >= total {
            return Err(VfsError::NoSpace);
        }
        let want = core::cmp::min(buf.len() as u64, total - *off) as usize;

        let mut done = 0;
        while done < want {
            let pos = *off + done as u64;
            let blkno = pos / bsize as u64;
            let boff = (pos % bsize as u64) as usize;
            let n = core::cmp::min(bsize - boff, want - done);

            // A full-block overwrite needs no prior read.
            let bp = if boff == 0 && n == bsize {
                bio::getblk(vn, blkno, bsize, 0)?
            } else {
                bio::bread(vn, blkno, bsize)?
            };
            bp.with_data_mut(|d| d[boff..boff + n].copy_from_slice(&buf[done..done + n]));
            bio::bdwrite(&bp);
            done += n;
        }
        *off += done as u64;
        Ok(done)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
