//! ramfs directory operations.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

use crate::fs::mode;
use crate::fs::vfs::error::{VfsError, VfsResult};
use crate::fs::vfs::ops::{DirEntry, VnodeOps};
use crate::fs::vfs::stat::Stat;
use crate::fs::vfs::superblock::Superblock;
use crate::fs::vfs;
use crate::fs::vfs::vnode::{Vnode, VnodeRef};

use super::node::{RamfsDirEntry, RamfsNode};
use super::{sb_of, vn_lock_enter, vn_lock_exit};

pub(super) struct RamfsDirOps;

pub(super) static RAMFS_DIR_OPS: RamfsDirOps = RamfsDirOps;

impl VnodeOps for RamfsDirOps {
    fn lock(&self, vn: &Vnode) -> VfsResult<()> {
        vn_lock_enter(vn)
    }

    fn release(&self, vn: &Vnode) -> VfsResult<()> {
        vn_lock_exit(vn)
    }

    fn lookup(&self, dir: &Vnode, name: &[u8]) -> VfsResult<VnodeRef> {
        let sb = sb_of(dir)?;
        if name == b"." {
            return sb.get_vnode(dir.num);
        }
        let ino = if name == b".." {
            sb.with_node(dir.num, RamfsNode::parent)?
        } else {
            sb.with_node(dir.num, |n| n.find_child(name))?
                .ok_or(VfsError::NotFound)?
        };
        sb.get_vnode(ino)
    }

    fn create(&self, dir: &Vnode, name: &[u8], file_mode: u32) -> VfsResult<VnodeRef> {
        let sb = sb_of(dir)?;
        if sb.readonly() {
            return Err(VfsError::ReadOnlyFs);
        }
        vfs::check_name(name)?;

        let ino = sb.alloc_ino();
        sb.with_nodes(|nodes| {
            let dir_node = nodes.get_mut(&dir.num).ok_or(VfsError::NotFound)?;
            if dir_node.find_child(name)?.is_some() {
                return Err(VfsError::AlreadyExists);
            }
            dir_node.children_mut()?.push(RamfsDirEntry {
                name: Vec::from(name),
                ino,
            });
            nodes.insert(ino, RamfsNode::new_file(ino, mode::permissions(file_mode)));
            Ok(())
        })?;
        sb.get_vnode(ino)
    }

    fn mknod(
        &self,
        dir: &Vnode,
        name: &[u8],
        file_mode: u32,
        spec: Arc<dyn Any + Send + Sync>,
    ) -> VfsResult<VnodeRef> {
        let sb = sb_of(dir)?;
        if sb.readonly() {
            return Err(VfsError::ReadOnlyFs);
        }
        vfs::check_name(name)?;

        let ino = sb.alloc_ino();
        sb.with_nodes(|nodes| {
            let dir_node = nodes.get_mut(&dir.num).ok_or(VfsError::NotFound)?;
            if dir_node.find_child(name)?.is_some() {
                return Err(VfsError::AlreadyExists);
            }
            dir_node.children_mut()?.push(RamfsDirEntry {
                name: Vec::from(name),
                ino,
            });
            nodes.insert(ino, RamfsNode::new_special(ino, file_mode, spec));
            Ok(())
        })?;
        sb.get_vnode(ino)
    }

    fn mkdir(&self, dir: &Vnode, name: &[u8], file_mode: u32) -> VfsResult<VnodeRef> {
        let sb = sb_of(dir)?;
        if sb.readonly() {
            return Err(VfsError::ReadOnlyFs);
        }
        vfs::check_name(name)?;
        if name == b"." || name == b".." {
            return Err(VfsError::AlreadyExists);
        }

        let ino = sb.alloc_ino();
        sb.with_nodes(|nodes| {
            let dir_node = nodes.get_mut(&dir.num).ok_or(VfsError::NotFound)?;
            if dir_node.find_child(name)?.is_some() {
                return Err(VfsError::AlreadyExists);
            }
            dir_node.children_mut()?.push(RamfsDirEntry {
                name: Vec::from(name),
                ino,
            });
            // The new directory's `..` adds a link to the parent.
            dir_node.nlink += 1;
            let parent_nlink = dir_node.nlink;
            nodes.insert(
                ino,
                RamfsNode::new_dir(ino, mode::permissions(file_mode), dir.num),
            );
            Ok(parent_nlink)
        })
        .map(|parent_nlink| {
            dir.nlink.store(parent_nlink, core::sync::atomic::Ordering::Relaxed);
        })?;
        sb.get_vnode(ino)
    }

    fn link(&self, dir: &Vnode, vn: &VnodeRef, name: &[u8]) -> VfsResult<()> {
        let sb = sb_of(dir)?;
        if sb.readonly() {
            return Err(VfsError::ReadOnlyFs);
        }
        vfs::check_name(name)?;
        // Hard links never cross filesystems and never target directories.
        match vn.sb() {
            Some(other) if other.dev_id() == sb.dev_id() => {}
            _ => return Err(VfsError::CrossDevice),
        }
        if vn.is_dir() {
            return Err(VfsError::IsADirectory);
        }

        let nlink = sb.with_nodes(|nodes| {
            if nodes
                .get(&dir.num)
                .ok_or(VfsError::NotFound)?
                .find_child(name)?
                .is_some()
            {
                return Err(VfsError::AlreadyExists);
            }
            let target = nodes.get_mut(&vn.num).ok_or(VfsError::StaleHandle)?;
            target.nlink += 1;
            let nlink = target.nlink;
            let dir_node = nodes.get_mut(&dir.num).ok_or(VfsError::NotFound)?;
            dir_node.children_mut()?.push(RamfsDirEntry {
                name: Vec::from(name),
                ino: vn.num,
            });
            Ok(nlink)
        })?;
        sb.sync_vnode_nlink(vn.num, nlink);
        Ok(())
    }

    fn unlink(&self, dir: &Vnode, name: &[u8]) -> VfsResult<()> {
        let sb = sb_of(dir)?;
        if sb.readonly() {
            return Err(VfsError::ReadOnlyFs);
        }
        if name == b"." || name == b".." {
            return Err(VfsError::InvalidArgument);
        }

        let (ino, nlink) = sb.with_nodes(|nodes| {
            let dir_node = nodes.get_mut(&dir.num).ok_or(VfsError::NotFound)?;
            let ino = dir_node.find_child(name)?.ok_or(VfsError::NotFound)?;
            if nodes.get(&ino).ok_or(VfsError::NotFound)?.is_dir() {
                return Err(VfsError::IsADirectory);
            }
            let dir_node = nodes.get_mut(&dir.num).ok_or(VfsError::NotFound)?;
            dir_node.children_mut()?.retain(|e| e.name != name);
            let target = nodes.get_mut(&ino).ok_or(VfsError::NotFound)?;
            target.nlink -= 1;
            Ok((ino, target.nlink))
        })?;

        sb.sync_vnode_nlink(ino, nlink);
        if nlink == 0 {
            // Storage goes away now unless an open reference keeps the node
            // alive; then delete_vnode finishes the job later.
            sb.maybe_reclaim(ino);
        }
        Ok(())
    }

    fn rmdir(&self, dir: &Vnode, name: &[u8]) -> VfsResult<()> {
        let sb = sb_of(dir)?;
        if sb.readonly() {
            return Err(VfsError::ReadOnlyFs);
        }
        if name == b"." || name == b".." {
            return Err(VfsError::InvalidArgument);
        }

        let (ino, parent_nlink) = sb.with_nodes(|nodes| {
            let dir_node = nodes.get(&dir.num).ok_or(VfsError::NotFound)?;
            let ino = dir_node.find_child(name)?.ok_or(VfsError::NotFound)?;
            let victim = nodes.get(&ino).ok_or(VfsError::NotFound)?;
            if !victim.is_dir() {
                return Err(VfsError::NotADirectory);
            }
            if !victim.children()?.is_empty() {
                return Err(VfsError::DirectoryNotEmpty);
            }

            let dir_node = nodes.get_mut(&dir.num).ok_or(VfsError::NotFound)?;
            dir_node.children_mut()?.retain(|e| e.name != name);
            // The victim's `..` link to the parent goes with it.
            dir_node.nlink -= 1;
            let parent_nlink = dir_node.nlink;
            let victim = nodes.get_mut(&ino).ok_or(VfsError::NotFound)?;
            victim.nlink = 0;
            Ok((ino, parent_nlink))
        })?;

        dir.nlink
            .store(parent_nlink, core::sync::atomic::Ordering::Relaxed);
        sb.sync_vnode_nlink(ino, 0);
        sb.maybe_reclaim(ino);
        Ok(())
    }

    fn readdir(&self, dir: &Vnode, cursor: &mut u64) -> VfsResult<Option<DirEntry>> {
        let sb = sb_of(dir)?;
        let entry = sb.with_nodes(|nodes| {
            let dir_node = nodes.get(&dir.num).ok_or(VfsError::NotFound)?;
            match *cursor {
                0 => Ok(Some(DirEntry {
                    ino: dir_node.ino,
                    name: Vec::from(&b"."[..]),
                    file_type: mode::S_IFDIR,
                })),
                1 => Ok(Some(DirEntry {
                    ino: dir_node.parent()?,
                    name: Vec::from(&b".."[..]),
                    file_type: mode::S_IFDIR,
                })),
                c => {
                    let idx = (c - 2) as usize;
                    let children = dir_node.children()?;
                    match children.get(idx) {
                        None => Ok(None),
                        Some(e) => {
                            let ftype = nodes
                                .get(&e.ino)
                                .map_or(mode::S_IFREG, |n| mode::file_type(n.mode));
                            Ok(Some(DirEntry {
                                ino: e.ino,
                                name: e.name.clone(),
                                file_type: ftype,
                            }))
                        }
                    }
                }
            }
        })?;
        if entry.is_some() {
            *cursor += 1;
        }
        Ok(entry)
    }

    fn stat(&self, vn: &Vnode) -> VfsResult<Stat> {
        let sb = sb_of(vn)?;
        sb.with_node(vn.num, |node| {
            Ok(Stat {
                dev: sb.dev_id(),
                ino: node.ino,
                mode: node.mode,
                nlink: node.nlink,
                size: node.len as u64,
                blksize: 4096,
                blocks: (node.len as u64).div_ceil(512),
                atime: 0,
                mtime: 0,
                ctime: 0,
            })
        })
    }
}
