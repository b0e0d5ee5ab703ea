//! ramfs regular-file operations.
//!
//! File bodies are anonymous buffer-cache buffers: allocated from
//! `bio::geteblk` on first write and grown in place with `bio::allocbuf`.

extern crate alloc;

use crate::bio;
use crate::fs::vfs::error::{VfsError, VfsResult};
use crate::fs::vfs::ops::VnodeOps;
use crate::fs::vfs::stat::Stat;
use crate::fs::vfs::superblock::Superblock;
use crate::fs::vfs::vnode::Vnode;

use super::node::RamfsNodeKind;
use super::{sb_of, vn_lock_enter, vn_lock_exit};

pub(super) struct RamfsFileOps;

pub(super) static RAMFS_FILE_OPS: RamfsFileOps = RamfsFileOps;

impl VnodeOps for RamfsFileOps {
    fn lock(&self, vn: &Vnode) -> VfsResult<()> {
        vn_lock_enter(vn)
    }

    fn release(&self, vn: &Vnode) -> VfsResult<()> {
        vn_lock_exit(vn)
    }

    fn read(&self, vn: &Vnode, off: &mut u64, buf: &mut [u8]) -> VfsResult<usize> {
        let sb = sb_of(vn)?;
        let n = sb.with_node(vn.num, |node| {
            let RamfsNodeKind::File { data } = &node.kind else {
                return Err(VfsError::IsADirectory);
            };
            let len = node.len as u64;
            if *off >= len || buf.is_empty() {
                return Ok(0); // EOF: short transfer, not an error
            }
            let want = core::cmp::min(buf.len() as u64, len - *off) as usize;
            match data {
                Some(bp) => Ok(bp.read_at(*off as usize, &mut buf[..want])),
                None => Ok(0),
            }
        })?;
        *off += n as u64;
        Ok(n)
    }

    fn write(&self, vn: &Vnode, off: &mut u64, buf: &[u8]) -> VfsResult<usize> {
        let sb = sb_of(vn)?;
        if sb.readonly() {
            return Err(VfsError::ReadOnlyFs);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let end = *off as usize + buf.len();
        let new_len = sb.with_node_mut(vn.num, |node| {
            let old_len = node.len;
            let RamfsNodeKind::File { data } = &mut node.kind else {
                return Err(VfsError::IsADirectory);
            };

            if end > old_len {
                sb.charge(end - old_len)?;
            }

            let bp = match data {
                Some(bp) => {
                    if end > bp.bcount() {
                        bio::allocbuf(bp, end);
                    }
                    bp
                }
                None => {
                    let bp = bio::geteblk(end).inspect_err(|_| {
                        if end > old_len {
                            sb.uncharge(end - old_len);
                        }
                    })?;
                    data.insert(bp)
                }
            };
            bp.write_at(*off as usize, buf);

            if end > old_len {
                node.len = end;
            }
            Ok(node.len as u64)
        })?;

        vn.len.store(new_len, core::sync::atomic::Ordering::Relaxed);
        *off += buf.len() as u64;
        Ok(buf.len())
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
