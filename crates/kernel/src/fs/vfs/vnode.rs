//! Vnode — the in-memory handle to a file-like object.
//!
//! A vnode couples the embedded [`Kobj`] (existence), an immutable
//! operations table (capabilities), and driver-private state. Vnodes are
//! only ever produced by filesystem drivers; callers receive them from
//! `lookup`/`create`/`get_vnode` and dispatch everything through the
//! delegation methods below.

extern crate alloc;

use alloc::sync::{Arc, Weak};
use core::any::Any;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use fos_utils::Mutex;

use crate::fs::mode;
use crate::kobj::Kobj;

use super::error::VfsResult;
use super::ops::{DirEntry, VnodeOps};
use super::stat::Stat;
use super::superblock::Superblock;

/// Reference to a vnode.
///
/// The `Arc` keeps the allocation alive; liveness is governed by
/// `vn.kobj` — a holder that parks a reference across a suspension point
/// must `kobj.acquire()` it first and `release()` it after.
pub type VnodeRef = Arc<Vnode>;

pub struct Vnode {
    /// Vnode number, unique within its filesystem
    pub num: u64,
    /// Existence management; destructor is the superblock's `delete_vnode`
    pub kobj: Kobj,
    /// File type and permission bits
    pub mode: AtomicU32,
    /// Length of the file in bytes
    pub len: AtomicU64,
    /// Number of hard links
    pub nlink: AtomicU32,
    /// Driver critical-section lock backing the `lock`/`release` ops
    pub(crate) vn_lock: Mutex<()>,
    /// Owning superblock; `None` for anonymous vnodes (devices)
    sb: Option<Weak<dyn Superblock>>,
    /// Operations table; never changes after construction
    ops: &'static dyn VnodeOps,
    /// Driver-private state
    specinfo: Arc<dyn Any + Send + Sync>,
}

impl Vnode {
    /// Construct a vnode. Only filesystem drivers call this.
    ///
    /// `dtor` becomes the kobj destructor and normally routes to the
    /// superblock's `delete_vnode`; it must capture the superblock weakly or
    /// the mount can never be dropped.
    pub fn new(
        num: u64,
        file_mode: u32,
        ops: &'static dyn VnodeOps,
        sb: Option<Weak<dyn Superblock>>,
        specinfo: Arc<dyn Any + Send + Sync>,
        dtor: impl Fn() + Send + Sync + 'static,
    ) -> VnodeRef {
        Arc::new(Self {
            num,
            kobj: Kobj::new(dtor),
            mode: AtomicU32::new(file_mode),
            len: AtomicU64::new(0),
            nlink: AtomicU32::new(1),
            vn_lock: Mutex::new(()),
            sb,
            ops,
            specinfo,
        })
    }

    /// The owning superblock, if this vnode belongs to a mount.
    pub fn sb(&self) -> Option<Arc<dyn Superblock>> {
        self.sb.as_ref().and_then(Weak::upgrade)
    }

    /// Downcast the driver-private state.
    pub fn specinfo<T: 'static>(&self) -> Option<&T> {
        self.specinfo.downcast_ref::<T>()
    }

    pub fn is_dir(&self) -> bool {
        mode::is_dir(self.mode.load(Ordering::Relaxed))
    }

    pub fn is_reg(&self) -> bool {
        mode::is_reg(self.mode.load(Ordering::Relaxed))
    }

    pub fn is_blk(&self) -> bool {
        mode::is_blk(self.mode.load(Ordering::Relaxed))
    }

    /// Build the default metadata record from the vnode's own fields.
    pub fn to_stat(&self) -> Stat {
        let size = self.len.load(Ordering::Relaxed);
        Stat {
            dev: self.sb().map_or(self.num, |sb| sb.dev_id()),
            ino: self.num,
            mode: self.mode.load(Ordering::Relaxed),
            nlink: self.nlink.load(Ordering::Relaxed),
            size,
            blksize: 4096,
            blocks: size.div_ceil(512),
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }

    // ========================================================================
    // Operations delegation
    // ========================================================================

    /// Enter the driver's critical section for this vnode.
    pub fn lock(&self) -> VfsResult<()> {
        self.ops.lock(self)
    }

    /// Leave the driver's critical section.
    pub fn release(&self) -> VfsResult<()> {
        self.ops.release(self)
    }

    /// Read from this vnode at `*off`.
    pub fn read(&self, off: &mut u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.ops.read(self, off, buf)
    }

    /// Write to this vnode at `*off`.
    pub fn write(&self, off: &mut u64, buf: &[u8]) -> VfsResult<usize> {
        self.ops.write(self, off, buf)
    }

    /// Create a regular file in this directory.
    pub fn create(&self, name: &[u8], file_mode: u32) -> VfsResult<VnodeRef> {
        self.ops.create(self, name, file_mode)
    }

    /// Create a special vnode in this directory.
    pub fn mknod(
        &self,
        name: &[u8],
        file_mode: u32,
        spec: Arc<dyn Any + Send + Sync>,
    ) -> VfsResult<VnodeRef> {
        self.ops.mknod(self, name, file_mode, spec)
    }

    /// Look up a child in this directory.
    pub fn lookup(&self, name: &[u8]) -> VfsResult<VnodeRef> {
        self.ops.lookup(self, name)
    }

    /// Create a hard link to `vn` in this directory.
    pub fn link(&self, vn: &VnodeRef, name: &[u8]) -> VfsResult<()> {
        self.ops.link(self, vn, name)
    }

    /// Remove a hard link from this directory.
    pub fn unlink(&self, name: &[u8]) -> VfsResult<()> {
        self.ops.unlink(self, name)
    }

    /// Create a directory in this directory.
    pub fn mkdir(&self, name: &[u8], file_mode: u32) -> VfsResult<VnodeRef> {
        self.ops.mkdir(self, name, file_mode)
    }

    /// Remove an empty directory from this directory.
    pub fn rmdir(&self, name: &[u8]) -> VfsResult<()> {
        self.ops.rmdir(self, name)
    }

    /// Read one directory entry and advance the cursor.
    pub fn readdir(&self, cursor: &mut u64) -> VfsResult<Option<DirEntry>> {
        self.ops.readdir(self, cursor)
    }

    /// Get file status.
    pub fn stat(&self) -> VfsResult<Stat> {
        self.ops.stat(self)
    }
}

impl core::fmt::Debug for Vnode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Vnode")
            .field("num", &self.num)
            .field("mode", &self.mode.load(Ordering::Relaxed))
            .field("len", &self.len.load(Ordering::Relaxed))
            .field("refcount", &self.kobj.refcount())
            .finish()
    }
}
