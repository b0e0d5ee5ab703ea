//! Filesystem layer.
//!
//! [`vfs`] defines the filesystem-independent vnode abstraction, [`registry`]
//! binds filesystem drivers to mount points, and [`ramfs`] is the in-memory
//! driver that ships with the core. On-disk filesystem drivers plug in
//! through the same [`registry::FsDriver`] seam.

extern crate alloc;

pub mod mode;
pub mod ramfs;
pub mod registry;
pub mod vfs;

pub use registry::{FsRegistry, MountFlags, registry};
