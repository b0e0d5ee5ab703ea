//! Superblock — one mounted filesystem instance.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;

use crate::fs::registry::MountFlags;

use super::error::VfsResult;
use super::vnode::VnodeRef;

/// Reference to a superblock.
pub type SuperblockRef = Arc<dyn Superblock>;

/// Superblock trait.
///
/// Produced by a driver's `mount`; destroyed by its `umount`. The
/// superblock owns the root vnode for the whole mount lifetime and is the
/// de-duplication authority for vnodes: `get_vnode` hands out the same live
/// instance for the same number while any reference is outstanding.
pub trait Superblock: Send + Sync {
    /// Filesystem type name ("ramfs", ...).
    fn fs_name(&self) -> &'static str;

    /// Device id backing this mount (virtual for memory filesystems).
    fn dev_id(&self) -> u64;

    /// Mount mode flags.
    fn mode_flags(&self) -> MountFlags;

    /// Path this instance is mounted on.
    fn mountpoint(&self) -> String;

    /// The root vnode. Valid for the superblock's whole lifetime; the
    /// returned reference borrows the mount's own kobj reference, so a
    /// caller keeping it across a suspension point must `kobj.acquire()` it.
    fn root(&self) -> VnodeRef;

    /// Get the vnode for `num`, materializing it from the driver on a miss.
    ///
    /// On a hit the same instance is returned with its kobj refcount
    /// incremented — never a duplicate for a live number. The caller owns
    /// one reference either way and releases it through `kobj.release()`.
    fn get_vnode(&self, num: u64) -> VfsResult<VnodeRef>;

    /// Finalize a vnode whose refcount reached zero.
    ///
    /// Installed as the vnode's kobj destructor: drops the cache entry and
    /// reclaims driver-private storage once neither links nor references
    /// keep the node alive. Idempotent for already-gone numbers.
    fn delete_vnode(&self, num: u64) -> VfsResult<()>;

    /// Flush filesystem state to its backing store.
    fn sync(&self) -> VfsResult<()> {
        Ok(())
    }

    /// Cast to `Any` for driver downcasts.
    fn as_any(&self) -> &dyn core::any::Any;
}
