//! Filesystem-independent vnode abstraction.
//!
//! A vnode is a reference-counted handle to a file-like object; everything
//! callers can do with one goes through its [`ops::VnodeOps`] table, which a
//! filesystem driver installs at construction. Drivers expose mounted
//! instances through the [`superblock::Superblock`] trait.

extern crate alloc;

pub mod error;
pub mod ops;
pub mod stat;
pub mod superblock;
pub mod vnode;

pub use error::{VfsError, VfsResult};
pub use ops::{DirEntry, VnodeOps};
pub use stat::Stat;
pub use superblock::{Superblock, SuperblockRef};
pub use vnode::{Vnode, VnodeRef};

/// Longest accepted component name, in bytes.
pub const NAME_MAX: usize = 255;

/// Validate a directory-entry name.
///
/// Names are byte strings (no NUL-termination anywhere in the VFS), so the
/// only outlawed shapes are the empty name, over-long names, and an
/// embedded path separator.
pub fn check_name(name: &[u8]) -> VfsResult<()> {
    if name.is_empty() {
        return Err(VfsError::InvalidArgument);
    }
    if name.len() > NAME_MAX {
        return Err(VfsError::NameTooLong);
    }
    if name.contains(&b'/') {
        return Err(VfsError::InvalidArgument);
    }
    Ok(())
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_check_name() {
        assert!(check_name(b"file.txt").is_ok());
        assert!(check_name(b"binary\xffname\x01ok").is_ok());
        assert_eq!(check_name(b""), Err(VfsError::InvalidArgument));
        assert_eq!(check_name(b"a/b"), Err(VfsError::InvalidArgument));
        assert_eq!(check_name(&[b'x'; 256]), Err(VfsError::NameTooLong));
        assert!(check_name(&[b'x'; 255]).is_ok());
    }
}
