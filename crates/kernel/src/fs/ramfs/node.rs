//! ramfs node types.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

use crate::bio::BufRef;
use crate::fs::mode;
use crate::fs::vfs::error::{VfsError, VfsResult};

/// Directory entry: a name bound to an inode number. Names are byte
/// strings; embedded anything (except `/`) is legal.
pub(super) struct RamfsDirEntry {
    pub name: Vec<u8>,
    pub ino: u64,
}

pub(super) enum RamfsNodeKind {
    /// Regular file; contents live in an anonymous cache buffer once the
    /// first byte is written.
    File { data: Option<BufRef> },
    /// Directory with its child list and a parent for `..`.
    Directory {
        parent: u64,
        children: Vec<RamfsDirEntry>,
    },
    /// Special node (device etc.); `spec` becomes the vnode's specinfo.
    Special { spec: Arc<dyn Any + Send + Sync> },
}

pub(super) struct RamfsNode {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    /// File length in bytes (0 for non-files)
    pub len: usize,
    pub kind: RamfsNodeKind,
}

impl RamfsNode {
    pub fn new_file(ino: u64, perms: u32) -> Self {
        Self {
            ino,
            mode: mode::make_mode(mode::S_IFREG, perms),
            nlink: 1,
            len: 0,
            kind: RamfsNodeKind::File { data: None },
        }
    }

    /// Directories start at nlink 2: the parent's entry plus their own `.`.
    pub fn new_dir(ino: u64, perms: u32, parent: u64) -> Self {
        Self {
            ino,
            mode: mode::make_mode(mode::S_IFDIR, perms),
            nlink: 2,
            len: 0,
            kind: RamfsNodeKind::Directory {
                parent,
                children: Vec::new(),
            },
        }
    }

    pub fn new_special(ino: u64, file_mode: u32, spec: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            ino,
            mode: file_mode,
            nlink: 1,
            len: 0,
            kind: RamfsNodeKind::Special { spec },
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, RamfsNodeKind::Directory { .. })
    }

    pub fn children(&self) -> VfsResult<&Vec<RamfsDirEntry>> {
        match &self.kind {
            RamfsNodeKind::Directory { children, .. } => Ok(children),
            _ => Err(VfsError::NotADirectory),
        }
    }

    pub fn children_mut(&mut self) -> VfsResult<&mut Vec<RamfsDirEntry>> {
        match &mut self.kind {
            RamfsNodeKind::Directory { children, .. } => Ok(children),
            _ => Err(VfsError::NotADirectory),
        }
    }

    pub fn parent(&self) -> VfsResult<u64> {
        match &self.kind {
            RamfsNodeKind::Directory { parent, .. } => Ok(*parent),
            _ => Err(VfsError::NotADirectory),
        }
    }

    pub fn find_child(&self, name: &[u8]) -> VfsResult<Option<u64>> {
        Ok(self
            .children()?
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.ino))
    }
}
