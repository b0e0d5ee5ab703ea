//! Uniform file metadata record.

/// The metadata record every vnode can produce, whatever its type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stat {
    /// Device id of the containing filesystem (or the device itself)
    pub dev: u64,
    /// Vnode number, unique within the filesystem
    pub ino: u64,
    /// File type and permission bits
    pub mode: u32,
    /// Number of hard links
    pub nlink: u32,
    /// Size in bytes
    pub size: u64,
    /// Preferred I/O block size
    pub blksize: u32,
    /// Allocated 512-byte units
    pub blocks: u64,
    /// Access time (seconds)
    pub atime: u64,
    /// Modification time (seconds)
    pub mtime: u64,
    /// Status change time (seconds)
    pub ctime: u64,
}
