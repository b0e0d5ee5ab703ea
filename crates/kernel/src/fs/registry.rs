//! Filesystem driver registry and mount table.
//!
//! Drivers register under a short name; mounting binds a driver instance
//! (superblock) to a mount-point path. The registry owns both collections
//! outright — there is no global linked list threaded through driver
//! structs — and serializes mount/unmount by holding the mount-table lock
//! across the whole operation.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use fos_utils::{HashMap, Lazy, Mutex, RwLock};

use super::vfs::superblock::SuperblockRef;

bitflags! {
    /// Mount mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MountFlags: u32 {
        /// Read-only mount
        const RDONLY = 0x01;
        /// Don't maintain access times
        const NOATIME = 0x02;
    }
}

/// Mount/registry error type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountError {
    /// Something is already mounted at this path
    AlreadyMounted,
    /// Nothing is mounted at this path
    NotMounted,
    /// No driver registered under that name
    UnknownFs,
    /// A driver is already registered under that name
    AlreadyRegistered,
    /// Live references keep the superblock busy
    Busy,
    /// Malformed mount parameter blob
    InvalidParameter,
    /// Driver ran out of backing storage
    NoSpace,
}

/// Filesystem driver descriptor.
///
/// `mount` must validate the opaque `parm` blob before mutating anything
/// and fail without leaving a partial superblock reachable. `umount` is
/// only ever handed superblocks this driver produced.
pub trait FsDriver: Send + Sync {
    /// Short filesystem type name, unique in the registry.
    fn name(&self) -> &'static str;

    /// Create a new mounted instance.
    fn mount(
        &self,
        mountpoint: &str,
        flags: MountFlags,
        parm: &[u8],
    ) -> Result<SuperblockRef, MountError>;

    /// Tear a mounted instance down.
    ///
    /// Fails with [`MountError::Busy`] — mount state unchanged — while any
    /// vnode under the superblock holds a live external reference.
    fn umount(&self, sb: &SuperblockRef) -> Result<(), MountError>;
}

struct MountEntry {
    mountpoint: String,
    sb: SuperblockRef,
    driver: Arc<dyn FsDriver>,
}

/// The filesystem registry: driver names and active mounts.
pub struct FsRegistry {
    drivers: RwLock<HashMap<&'static str, Arc<dyn FsDriver>>>,
    /// Held across whole mount/umount operations; that is what makes two
    /// mounts of the same mount point impossible to interleave.
    mounts: Mutex<Vec<MountEntry>>,
}

impl FsRegistry {
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            mounts: Mutex::new(Vec::new()),
        }
    }

    /// Register a driver. At most one driver per name.
    pub fn register(&self, driver: Arc<dyn FsDriver>) -> Result<(), MountError> {
        let mut drivers = self.drivers.write();
        if drivers.contains_key(driver.name()) {
            return Err(MountError::AlreadyRegistered);
        }
        log::debug!("fs: registered driver '{}'", driver.name());
        drivers.insert(driver.name(), driver);
        Ok(())
    }

    /// Remove a driver. Fails while it still has active mounts.
    pub fn unregister(&self, name: &str) -> Result<(), MountError> {
        let mounts = self.mounts.lock();
        if mounts.iter().any(|m| m.driver.name() == name) {
            return Err(MountError::Busy);
        }
        match self.drivers.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(MountError::UnknownFs),
        }
    }

    /// Find a registered driver by name.
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn FsDriver>> {
        self.drivers.read().get(name).cloned()
    }

    /// Mount filesystem `fsname` at `mountpoint`.
    pub fn mount(
        &self,
        fsname: &str,
        mountpoint: &str,
        flags: MountFlags,
        parm: &[u8],
    ) -> Result<SuperblockRef, MountError> {
        let driver = self.by_name(fsname).ok_or(MountError::UnknownFs)?;

        let mut mounts = self.mounts.lock();
        if mounts.iter().any(|m| m.mountpoint == mountpoint) {
            return Err(MountError::AlreadyMounted);
        }

        let sb = driver.mount(mountpoint, flags, parm)?;
        log::info!("fs: mounted {} on {}", fsname, mountpoint);
        mounts.push(MountEntry {
            mountpoint: String::from(mountpoint),
            sb: Arc::clone(&sb),
            driver,
        });
        Ok(sb)
    }

    /// Unmount whatever is mounted at `mountpoint`.
    pub fn umount(&self, mountpoint: &str) -> Result<(), MountError> {
        let mut mounts = self.mounts.lock();
        let idx = mounts
            .iter()
            .position(|m| m.mountpoint == mountpoint)
            .ok_or(MountError::NotMounted)?;

        // Busy failures leave the entry in place.
        mounts[idx].driver.umount(&mounts[idx].sb)?;
        let entry = mounts.remove(idx);
        log::info!(
            "fs: unmounted {} from {}",
            entry.driver.name(),
            entry.mountpoint
        );
        Ok(())
    }

    /// The superblock mounted at exactly `mountpoint`.
    pub fn lookup(&self, mountpoint: &str) -> Option<SuperblockRef> {
        self.mounts
            .lock()
            .iter()
            .find(|m| m.mountpoint == mountpoint)
            .map(|m| Arc::clone(&m.sb))
    }

    /// Number of active mounts.
    pub fn mount_count(&self) -> usize {
        self.mounts.lock().len()
    }
}

impl Default for FsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Global registry
// ============================================================================

static REGISTRY: Lazy<FsRegistry> = Lazy::new(FsRegistry::new);

/// The kernel's filesystem registry.
pub fn registry() -> &'static FsRegistry {
    &REGISTRY
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::fs::ramfs::RamfsDriver;

    fn reg() -> &'static FsRegistry {
        let r = registry();
        let _ = r.register(Arc::new(RamfsDriver));
        r
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let r = reg();
        assert_eq!(
            r.register(Arc::new(RamfsDriver)),
            Err(MountError::AlreadyRegistered)
        );
        assert!(r.by_name("ramfs").is_some());
        assert!(r.by_name("nofs").is_none());
    }

    #[test]
    fn test_mount_umount_cycle() {
        let r = reg();
        let sb = r
            .mount("ramfs", "/mnt/reg-cycle", MountFlags::empty(), &[])
            .unwrap();
        assert_eq!(sb.fs_name(), "ramfs");
        assert!(r.lookup("/mnt/reg-cycle").is_some());

        // Same mount point can't be mounted twice.
        assert_eq!(
            r.mount("ramfs", "/mnt/reg-cycle", MountFlags::empty(), &[])
                .map(|_| ()),
            Err(MountError::AlreadyMounted)
        );

        drop(sb);
        r.umount("/mnt/reg-cycle").unwrap();
        assert!(r.lookup("/mnt/reg-cycle").is_none());
        assert_eq!(r.umount("/mnt/reg-cycle"), Err(MountError::NotMounted));
    }

    #[test]
    fn test_mount_unknown_fs() {
        let r = reg();
        assert_eq!(
            r.mount("nofs", "/mnt/reg-nofs", MountFlags::empty(), &[])
                .map(|_| ()),
            Err(MountError::UnknownFs)
        );
    }

    #[test]
    fn test_unregister_busy_with_mounts() {
        let r = reg();
        let _sb = r
            .mount("ramfs", "/mnt/reg-unreg", MountFlags::empty(), &[])
            .unwrap();
        assert_eq!(r.unregister("ramfs"), Err(MountError::Busy));
        r.umount("/mnt/reg-unreg").unwrap();
        // Leave the driver registered for the other tests.
    }
}
