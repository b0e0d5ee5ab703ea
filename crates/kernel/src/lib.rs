//! Ferrite OS kernel core.
//!
//! The resource-management machinery shared by every kernel subsystem:
//! reference-counted kernel objects ([`kobj`]), the virtual filesystem and
//! its mount registry ([`fs`]), the block buffer cache ([`bio`]), and the
//! sysctl MIB the core publishes its tunables through ([`sysctl`]).
//!
//! Architecture bring-up, the scheduler, and real device drivers live
//! elsewhere and are reached only through narrow seams: [`sched::yield_now`],
//! the [`dev::BlockDevice`] contract, and the console hook in [`klog`].

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod bio;
pub mod dev;
pub mod fs;
pub mod klog;
pub mod kobj;
pub mod sched;
pub mod sysctl;

mod mib;

use alloc::sync::Arc;
use fos_utils::Once;

static KINIT: Once<()> = Once::new();

/// Bring the kernel core up: logger, sysctl tree, filesystem drivers.
///
/// Idempotent; later calls are no-ops.
pub fn kinit() {
    KINIT.call_once(|| {
        klog::init(log::LevelFilter::Info);
        mib::register();
        if fs::registry()
            .register(Arc::new(fs::ramfs::RamfsDriver))
            .is_err()
        {
            log::warn!("ramfs driver already registered");
        }
        log::info!("kernel core initialized");
    });
}

/// Tear the core's sysctl surface down again (module fini).
///
/// Mounted filesystems are left alone; unmounting is the caller's decision.
pub fn kfini() {
    mib::unregister();
}
