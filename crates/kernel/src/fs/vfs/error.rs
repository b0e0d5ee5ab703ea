//! VFS error types.
//!
//! The error type every vnode operation returns. Variants map to standard
//! POSIX errno values so the syscall layer can translate them mechanically.

use core::fmt;

use crate::bio::BioError;
use crate::dev::BlockError;
use crate::fs::registry::MountError;
use crate::kobj::KobjError;

/// VFS error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VfsError {
    /// No such file or directory (ENOENT = 2)
    NotFound,
    /// I/O error (EIO = 5)
    IoError,
    /// Device or resource busy (EBUSY = 16)
    Busy,
    /// File exists (EEXIST = 17)
    AlreadyExists,
    /// Invalid cross-device link (EXDEV = 18)
    CrossDevice,
    /// Not a directory (ENOTDIR = 20)
    NotADirectory,
    /// Is a directory (EISDIR = 21)
    IsADirectory,
    /// Invalid argument (EINVAL = 22)
    InvalidArgument,
    /// File too large (EFBIG = 27)
    FileTooLarge,
    /// No space left on device (ENOSPC = 28)
    NoSpace,
    /// Read-only file system (EROFS = 30)
    ReadOnlyFs,
    /// Too many links (EMLINK = 31)
    TooManyLinks,
    /// Name too long (ENAMETOOLONG = 36)
    NameTooLong,
    /// Directory not empty (ENOTEMPTY = 39)
    DirectoryNotEmpty,
    /// Operation not supported (EOPNOTSUPP = 95)
    NotSupported,
    /// Stale file handle (ESTALE = 116) — the vnode was torn down
    StaleHandle,
}

impl VfsError {
    /// Convert to POSIX errno value (negative).
    pub fn to_errno(self) -> i64 {
        match self {
            VfsError::NotFound => -2,
            VfsError::IoError => -5,
            VfsError::Busy => -16,
            VfsError::AlreadyExists => -17,
            VfsError::CrossDevice => -18,
            VfsError::NotADirectory => -20,
            VfsError::IsADirectory => -21,
            VfsError::InvalidArgument => -22,
            VfsError::FileTooLarge => -27,
            VfsError::NoSpace => -28,
            VfsError::ReadOnlyFs => -30,
            VfsError::TooManyLinks => -31,
            VfsError::NameTooLong => -36,
            VfsError::DirectoryNotEmpty => -39,
            VfsError::NotSupported => -95,
            VfsError::StaleHandle => -116,
        }
    }

    /// Get error name.
    pub fn name(&self) -> &'static str {
        match self {
            VfsError::NotFound => "ENOENT",
            VfsError::IoError => "EIO",
            VfsError::Busy => "EBUSY",
            VfsError::AlreadyExists => "EEXIST",
            VfsError::CrossDevice => "EXDEV",
            VfsError::NotADirectory => "ENOTDIR",
            VfsError::IsADirectory => "EISDIR",
            VfsError::InvalidArgument => "EINVAL",
            VfsError::FileTooLarge => "EFBIG",
            VfsError::NoSpace => "ENOSPC",
            VfsError::ReadOnlyFs => "EROFS",
            VfsError::TooManyLinks => "EMLINK",
            VfsError::NameTooLong => "ENAMETOOLONG",
            VfsError::DirectoryNotEmpty => "ENOTEMPTY",
            VfsError::NotSupported => "EOPNOTSUPP",
            VfsError::StaleHandle => "ESTALE",
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VfsError::NotFound => "No such file or directory",
            VfsError::IoError => "I/O error",
            VfsError::Busy => "Device or resource busy",
            VfsError::AlreadyExists => "File exists",
            VfsError::CrossDevice => "Invalid cross-device link",
            VfsError::NotADirectory => "Not a directory",
            VfsError::IsADirectory => "Is a directory",
            VfsError::InvalidArgument => "Invalid argument",
            VfsError::FileTooLarge => "File too large",
            VfsError::NoSpace => "No space left on device",
            VfsError::ReadOnlyFs => "Read-only file system",
            VfsError::TooManyLinks => "Too many links",
            VfsError::NameTooLong => "File name too long",
            VfsError::DirectoryNotEmpty => "Directory not empty",
            VfsError::NotSupported => "Operation not supported",
            VfsError::StaleHandle => "Stale file handle",
        };
        write!(f, "{} ({})", msg, self.name())
    }
}

// Error mappings from the lower layers.

impl From<BlockError> for VfsError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::ReadFailed | BlockError::WriteFailed => VfsError::IoError,
            BlockError::InvalidBufferSize | BlockError::OutOfRange => VfsError::InvalidArgument,
        }
    }
}

impl From<BioError> for VfsError {
    fn from(err: BioError) -> Self {
        match err {
            BioError::Busy => VfsError::Busy,
            BioError::NotADevice => VfsError::IoError,
            BioError::InvalidSize => VfsError::InvalidArgument,
            BioError::Device(e) => e.into(),
        }
    }
}

impl From<KobjError> for VfsError {
    fn from(err: KobjError) -> Self {
        match err {
            KobjError::Defunct => VfsError::StaleHandle,
        }
    }
}

impl From<MountError> for VfsError {
    fn from(err: MountError) -> Self {
        match err {
            MountError::Busy => VfsError::Busy,
            MountError::AlreadyMounted | MountError::AlreadyRegistered => VfsError::AlreadyExists,
            MountError::NotMounted | MountError::UnknownFs => VfsError::NotFound,
            MountError::InvalidParameter => VfsError::InvalidArgument,
            MountError::NoSpace => VfsError::NoSpace,
        }
    }
}

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;
