//! ramfs — the in-memory filesystem driver.
//!
//! Directory structure lives in an inode table inside the superblock; file
//! contents live in anonymous buffer-cache buffers, grown on demand. The
//! driver exists both as the always-available scratch filesystem and as the
//! reference implementation of the driver contract: vnode de-duplication,
//! kobj-driven teardown, read-only enforcement, and mount parameter
//! validation.

extern crate alloc;

mod dir_ops;
mod file_ops;
mod node;
mod superblock;

pub use superblock::RamfsSuperblock;

use alloc::sync::Arc;

use crate::fs::registry::{FsDriver, MountError, MountFlags};
use crate::fs::vfs::error::{VfsError, VfsResult};
use crate::fs::vfs::ops::VnodeOps;
use crate::fs::vfs::superblock::SuperblockRef;
use crate::fs::vfs::vnode::Vnode;

/// Capacity when the mount parameter blob is empty.
pub const RAMFS_DEFAULT_CAPACITY: usize = 16 * 1024 * 1024;

/// Operations table for special vnodes that are not block devices: only
/// the universal `stat` slot is populated.
struct RamfsNoneOps;

static RAMFS_NONE_OPS: RamfsNoneOps = RamfsNoneOps;

impl VnodeOps for RamfsNoneOps {}

/// Enter the driver critical section for a vnode (the `lock` op).
fn vn_lock_enter(vn: &Vnode) -> VfsResult<()> {
    core::mem::forget(vn.vn_lock.lock());
    Ok(())
}

/// Leave the driver critical section (the `release` op).
fn vn_lock_exit(vn: &Vnode) -> VfsResult<()> {
    // SAFETY: pairs with the guard forgotten in `vn_lock_enter`; the ops
    // contract requires release only after a successful lock.
    unsafe {
        vn.vn_lock.force_unlock();
    }
    Ok(())
}

/// Resolve a vnode's superblock as ramfs state.
fn sb_of(vn: &Vnode) -> VfsResult<Arc<RamfsSuperblock>> {
    let sb = vn.sb().ok_or(VfsError::StaleHandle)?;
    sb.as_any()
        .downcast_ref::<RamfsSuperblock>()
        .and_then(RamfsSuperblock::self_arc)
        .ok_or(VfsError::IoError)
}

/// The ramfs driver descriptor.
pub struct RamfsDriver;

impl FsDriver for RamfsDriver {
    fn name(&self) -> &'static str {
        "ramfs"
    }

    fn mount(
        &self,
        mountpoint: &str,
        flags: MountFlags,
        parm: &[u8],
    ) -> Result<SuperblockRef, MountError> {
        // The parameter blob is either empty (defaults) or a little-endian
        // u64 capacity cap; anything else is rejected before any state is
        // built.
        let capacity = match parm.len() {
            0 => RAMFS_DEFAULT_CAPACITY,
            8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(parm);
                u64::from_le_bytes(raw) as usize
            }
            _ => return Err(MountError::InvalidParameter),
        };
        if capacity == 0 {
            return Err(MountError::InvalidParameter);
        }

        Ok(RamfsSuperblock::new(mountpoint, flags, capacity))
    }

    fn umount(&self, sb: &SuperblockRef) -> Result<(), MountError> {
        let rsb = sb
            .as_any()
            .downcast_ref::<RamfsSuperblock>()
            .ok_or(MountError::InvalidParameter)?;
        rsb.shutdown()
    }
}
