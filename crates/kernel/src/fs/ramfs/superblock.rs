//! ramfs superblock: inode table, vnode de-duplication cache, quota.

extern crate alloc;

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use fos_utils::{HashMap, Mutex, Once};

use crate::bio;
use crate::dev;
use crate::fs::mode;
use crate::fs::registry::{MountError, MountFlags};
use crate::fs::vfs::error::{VfsError, VfsResult};
use crate::fs::vfs::ops::VnodeOps;
use crate::fs::vfs::superblock::Superblock;
use crate::fs::vfs::vnode::{Vnode, VnodeRef};

use super::node::{RamfsNode, RamfsNodeKind};
use super::{RAMFS_NONE_OPS, dir_ops::RAMFS_DIR_OPS, file_ops::RAMFS_FILE_OPS};

pub(super) const ROOT_INO: u64 = 1;

pub struct RamfsSuperblock {
    dev_id: u64,
    flags: MountFlags,
    mountpoint: String,
    bytes_limit: usize,
    bytes_used: AtomicUsize,
    next_ino: AtomicU64,
    /// The inode table: all node state, keyed by inode number.
    nodes: Mutex<HashMap<u64, RamfsNode>>,
    /// Vnode de-duplication cache. Holds the allocation only; liveness is
    /// the vnode's kobj refcount, and `delete_vnode` purges entries whose
    /// count reached zero.
    vcache: Mutex<HashMap<u64, VnodeRef>>,
    /// The mount's own root reference, created at mount, released at umount.
    root: Once<VnodeRef>,
    self_ref: Once<Weak<RamfsSuperblock>>,
}

impl RamfsSuperblock {
    pub(super) fn new(mountpoint: &str, flags: MountFlags, bytes_limit: usize) -> Arc<Self> {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INO, RamfsNode::new_dir(ROOT_INO, 0o777, ROOT_INO));

        let sb = Arc::new(Self {
            dev_id: dev::alloc_dev_id(),
            flags,
            mountpoint: String::from(mountpoint),
            bytes_limit,
            bytes_used: AtomicUsize::new(0),
            next_ino: AtomicU64::new(ROOT_INO + 1),
            nodes: Mutex::new(nodes),
            vcache: Mutex::new(HashMap::new()),
            root: Once::new(),
            self_ref: Once::new(),
        });
        sb.self_ref.call_once(|| Arc::downgrade(&sb));

        // Materialize the root; the single reference it is born with is the
        // mount's own, dropped again at umount.
        if let Ok(root) = sb.get_vnode(ROOT_INO) {
            sb.root.call_once(|| root);
        }
        sb
    }

    /// Upgrade a borrowed superblock back to its owning `Arc`.
    pub(super) fn self_arc(&self) -> Option<Arc<Self>> {
        self.self_ref.get().and_then(Weak::upgrade)
    }

    pub(super) fn alloc_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::SeqCst)
    }

    pub(super) fn readonly(&self) -> bool {
        self.flags.contains(MountFlags::RDONLY)
    }

    /// Account `bytes` more data, failing when the mount's capacity cap
    /// would be exceeded.
    pub(super) fn charge(&self, bytes: usize) -> VfsResult<()> {
        let mut used = self.bytes_used.load(Ordering::Relaxed);
        loop {
            let new = used + bytes;
            if new > self.bytes_limit {
                return Err(VfsError::NoSpace);
            }
            match self.bytes_used.compare_exchange_weak(
                used,
                new,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(cur) => used = cur,
            }
        }
    }

    pub(super) fn uncharge(&self, bytes: usize) {
        self.bytes_used.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Run `f` over the node for `ino`.
    pub(super) fn with_node<R>(
        &self,
        ino: u64,
        f: impl FnOnce(&RamfsNode) -> VfsResult<R>,
    ) -> VfsResult<R> {
        let nodes = self.nodes.lock();
        let node = nodes.get(&ino).ok_or(VfsError::NotFound)?;
        f(node)
    }

    /// Run `f` over the node for `ino`, mutably.
    pub(super) fn with_node_mut<R>(
        &self,
        ino: u64,
        f: impl FnOnce(&mut RamfsNode) -> VfsResult<R>,
    ) -> VfsResult<R> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(&ino).ok_or(VfsError::NotFound)?;
        f(node)
    }

    /// Run `f` with the whole inode table locked (compound directory
    /// operations needing dir + child together).
    pub(super) fn with_nodes<R>(
        &self,
        f: impl FnOnce(&mut HashMap<u64, RamfsNode>) -> VfsResult<R>,
    ) -> VfsResult<R> {
        let mut nodes = self.nodes.lock();
        f(&mut nodes)
    }

    /// Mirror a node's nlink into its live vnode, if one is materialized.
    pub(super) fn sync_vnode_nlink(&self, ino: u64, nlink: u32) {
        if let Some(vn) = self.vcache.lock().get(&ino) {
            vn.nlink.store(nlink, Ordering::Relaxed);
        }
    }

    /// Reclaim node storage if neither links nor live references remain.
    pub(super) fn maybe_reclaim(&self, ino: u64) {
        let live = self
            .vcache
            .lock()
            .get(&ino)
            .is_some_and(|vn| vn.kobj.refcount() > 0);
        if live {
            return;
        }
        let mut nodes = self.nodes.lock();
        let reclaim = nodes.get(&ino).is_some_and(|n| n.nlink == 0);
        if reclaim {
            if let Some(node) = nodes.remove(&ino) {
                drop(nodes);
                self.free_node_storage(node);
            }
        }
    }

    fn free_node_storage(&self, node: RamfsNode) {
        if let RamfsNodeKind::File { data: Some(bp) } = node.kind {
            bio::brelse(&bp);
        }
        self.uncharge(node.len);
    }

    fn ops_for(node: &RamfsNode) -> &'static dyn VnodeOps {
        match &node.kind {
            RamfsNodeKind::File { .. } => &RAMFS_FILE_OPS,
            RamfsNodeKind::Directory { .. } => &RAMFS_DIR_OPS,
            RamfsNodeKind::Special { .. } => {
                if mode::is_blk(node.mode) {
                    &dev::DEV_VNODE_OPS
                } else {
                    &RAMFS_NONE_OPS
                }
            }
        }
    }

    /// Tear the mount down: fails busy while external references exist,
    /// otherwise releases the root and frees all node storage.
    pub(super) fn shutdown(&self) -> Result<(), MountError> {
        {
            let vcache = self.vcache.lock();
            for (ino, vn) in vcache.iter() {
                let rc = vn.kobj.refcount();
                let busy = if *ino == ROOT_INO { rc > 1 } else { rc > 0 };
                if busy {
                    return Err(MountError::Busy);
                }
            }
        }

        // Drop the mount's own root reference; its destructor purges the
        // cache entry through delete_vnode.
        if let Some(root) = self.root.get() {
            root.kobj.release();
        }

        let drained: alloc::vec::Vec<RamfsNode> = {
            let mut nodes = self.nodes.lock();
            nodes.drain().map(|(_, n)| n).collect()
        };
        for node in drained {
            self.free_node_storage(node);
        }
        Ok(())
    }
}

impl Superblock for RamfsSuperblock {
    fn fs_name(&self) -> &'static str {
        "ramfs"
    }

    fn dev_id(&self) -> u64 {
        self.dev_id
    }

    fn mode_flags(&self) -> MountFlags {
        self.flags
    }

    fn mountpoint(&self) -> String {
        self.mountpoint.clone()
    }

    #[allow(clippy::expect_used)]
    fn root(&self) -> VnodeRef {
        // Set in new() before the superblock is ever handed out.
        Arc::clone(self.root.get().expect("ramfs root vnode"))
    }

    fn get_vnode(&self, num: u64) -> VfsResult<VnodeRef> {
        let mut vcache = self.vcache.lock();

        if let Some(vn) = vcache.get(&num) {
            if vn.kobj.acquire().is_ok() {
                return Ok(Arc::clone(vn));
            }
            // Defunct: a racing destructor is about to purge this entry.
            // Drop it now and materialize a fresh vnode; delete_vnode only
            // purges entries whose refcount is still zero, so the
            // replacement is safe from it.
            vcache.remove(&num);
        }

        let (file_mode, len, nlink, ops, spec) = self.with_node(num, |node| {
            let spec: Arc<dyn core::any::Any + Send + Sync> = match &node.kind {
                RamfsNodeKind::Special { spec } => Arc::clone(spec),
                _ => Arc::new(()),
            };
            Ok((
                node.mode,
                node.len,
                node.nlink,
                Self::ops_for(node),
                spec,
            ))
        })?;

        let weak_self = self.self_ref.get().ok_or(VfsError::IoError)?.clone();
        let weak_dyn: Weak<dyn Superblock> = weak_self.clone();
        let vn = Vnode::new(num, file_mode, ops, Some(weak_dyn), spec, move || {
            if let Some(sb) = weak_self.upgrade() {
                let _ = sb.delete_vnode(num);
            }
        });
        vn.len.store(len as u64, Ordering::Relaxed);
        vn.nlink.store(nlink, Ordering::Relaxed);

        vcache.insert(num, Arc::clone(&vn));
        Ok(vn)
    }

    fn delete_vnode(&self, num: u64) -> VfsResult<()> {
        // Purge the cache entry, but only while it is actually dead — a
        // fresh vnode may already have taken the number over.
        {
            let mut vcache = self.vcache.lock();
            let dead = vcache.get(&num).is_some_and(|vn| vn.kobj.refcount() == 0);
            if dead {
                vcache.remove(&num);
            }
        }

        // Reclaim node storage once the last link is gone too.
        let mut nodes = self.nodes.lock();
        let reclaim = nodes.get(&num).is_some_and(|n| n.nlink == 0);
        if reclaim {
            if let Some(node) = nodes.remove(&num) {
                drop(nodes);
                self.free_node_storage(node);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}
