//! Vnode operation table.
//!
//! The capability set a filesystem driver installs on its vnodes. Every
//! method has a default body returning [`VfsError::NotSupported`], so "slot
//! absent" is a typed condition a driver opts out of, never a crash. Only
//! `stat` has a working default — every vnode can report metadata.
//!
//! Conventions shared by all implementations:
//! - names are byte strings with explicit length (`&[u8]`), binary-safe;
//! - `read`/`write` take the offset by mutable reference and advance it by
//!   the number of bytes actually transferred (short transfers at EOF are
//!   normal, not an error);
//! - `readdir` yields one entry per call and advances the caller-held
//!   cursor; `Ok(None)` is end-of-directory.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

use super::error::{VfsError, VfsResult};
use super::stat::Stat;
use super::vnode::{Vnode, VnodeRef};

/// Directory entry produced by `readdir`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    /// Vnode number of the entry
    pub ino: u64,
    /// Entry name (byte string)
    pub name: Vec<u8>,
    /// File type bits (`S_IFMT` part of the mode)
    pub file_type: u32,
}

/// Vnode operations trait.
///
/// `lock`/`release` are the driver's critical-section helpers around a
/// compound operation on driver-private state. They are distinct from the
/// existence management on `Vnode::kobj`: take a kobj reference to keep a
/// vnode alive across a suspension point, take the driver lock to mutate
/// its state.
pub trait VnodeOps: Send + Sync {
    // ========================================================================
    // Critical-section helpers
    // ========================================================================

    /// Enter the driver's critical section for this vnode.
    fn lock(&self, _vn: &Vnode) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Leave the driver's critical section. Must pair with a prior `lock`.
    fn release(&self, _vn: &Vnode) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    // ========================================================================
    // File operations
    // ========================================================================

    /// Transfer bytes from the file at `*off` into `buf`.
    fn read(&self, _vn: &Vnode, _off: &mut u64, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    /// Transfer bytes from `buf` into the file at `*off`, extending it when
    /// the write runs past the current end.
    fn write(&self, _vn: &Vnode, _off: &mut u64, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    // ========================================================================
    // Directory operations
    // ========================================================================

    /// Create a regular file named `name` in `dir`.
    fn create(&self, _dir: &Vnode, _name: &[u8], _mode: u32) -> VfsResult<VnodeRef> {
        Err(VfsError::NotSupported)
    }

    /// Create a special vnode (device node etc.) carrying `spec` as its
    /// driver-private state.
    fn mknod(
        &self,
        _dir: &Vnode,
        _name: &[u8],
        _mode: u32,
        _spec: Arc<dyn Any + Send + Sync>,
    ) -> VfsResult<VnodeRef> {
        Err(VfsError::NotSupported)
    }

    /// Look up the child named `name` in `dir`.
    fn lookup(&self, _dir: &Vnode, _name: &[u8]) -> VfsResult<VnodeRef> {
        Err(VfsError::NotSupported)
    }

    /// Create a hard link to `vn` named `name` in `dir`.
    fn link(&self, _dir: &Vnode, _vn: &VnodeRef, _name: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Remove the hard link named `name` from `dir`.
    fn unlink(&self, _dir: &Vnode, _name: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Create a directory named `name` in `dir`.
    fn mkdir(&self, _dir: &Vnode, _name: &[u8], _mode: u32) -> VfsResult<VnodeRef> {
        Err(VfsError::NotSupported)
    }

    /// Remove the empty directory named `name` from `dir`.
    fn rmdir(&self, _dir: &Vnode, _name: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Read the directory entry at `*cursor` and advance the cursor.
    fn readdir(&self, _dir: &Vnode, _cursor: &mut u64) -> VfsResult<Option<DirEntry>> {
        Err(VfsError::NotSupported)
    }

    // ========================================================================
    // Operations supported by any file type
    // ========================================================================

    /// Get file status. The default builds it from the vnode's own fields.
    fn stat(&self, vn: &Vnode) -> VfsResult<Stat> {
        Ok(vn.to_stat())
    }
}
