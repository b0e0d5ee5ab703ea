//! End-to-end exercises of the filesystem stack: registry, ramfs,
//! vnode lifecycle, the buffer cache underneath device nodes, and the
//! sysctl surface.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use ferrite_kernel::dev::{DevSpec, Ramdisk};
use ferrite_kernel::fs::registry::{MountError, MountFlags};
use ferrite_kernel::fs::{mode, registry};
use ferrite_kernel::sysctl::{CtlValue, SysctlError, sysctl, sysctl_mut};
use ferrite_kernel::{kinit, klog, sched};

fn setup() {
    sched::set_yield_hook(std::thread::yield_now);
    kinit();
}

#[test]
fn test_file_round_trip_and_readdir() {
    setup();
    let reg = registry();
    let sb = reg
        .mount("ramfs", "/it-basic", MountFlags::empty(), &[])
        .unwrap();
    let root = sb.root();

    let file = root.create(b"hello.txt", 0o644).unwrap();
    let mut off = 0;
    assert_eq!(file.write(&mut off, b"hello kernel world").unwrap(), 18);
    assert_eq!(off, 18);

    // Positioned read from the start; short read past EOF.
    let mut off = 6;
    let mut buf = [0u8; 32];
    let n = file.read(&mut off, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"kernel world");
    assert_eq!(file.read(&mut off, &mut buf).unwrap(), 0);

    let st = file.stat().unwrap();
    assert!(mode::is_reg(st.mode));
    assert_eq!(st.size, 18);
    assert_eq!(st.nlink, 1);

    let subdir = root.mkdir(b"sub", 0o755).unwrap();
    assert!(subdir.is_dir());

    // Cursor-driven enumeration: ".", "..", then the two entries.
    let mut cursor = 0;
    let mut names = Vec::new();
    while let Some(entry) = root.readdir(&mut cursor).unwrap() {
        names.push(entry.name);
    }
    assert_eq!(names[0], b".");
    assert_eq!(names[1], b"..");
    assert!(names.contains(&b"hello.txt".to_vec()));
    assert!(names.contains(&b"sub".to_vec()));
    assert_eq!(names.len(), 4);

    // Lookup dispatches through the directory's ops table.
    let again = root.lookup(b"hello.txt").unwrap();
    let mut off = 0;
    let n = again.read(&mut off, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello kernel world");

    // An unsupported slot is a typed failure, not a crash.
    assert!(matches!(
        file.readdir(&mut 0),
        Err(ferrite_kernel::fs::vfs::VfsError::NotSupported)
    ));

    // Driver critical-section helpers pair up; they guard driver state,
    // not existence (that is what the kobj is for).
    file.lock().unwrap();
    file.release().unwrap();

    again.kobj.release();
    subdir.kobj.release();
    file.kobj.release();
    reg.umount("/it-basic").unwrap();
}

#[test]
fn test_vnode_dedup_and_umount_busy() {
    setup();
    let reg = registry();
    let sb = reg
        .mount("ramfs", "/it-dedup", MountFlags::empty(), &[])
        .unwrap();
    let root = sb.root();

    let file = root.create(b"pinned", 0o644).unwrap();
    let ino = file.num;
    assert_eq!(file.kobj.refcount(), 1);

    // Same number, same live instance, counted reference each time.
    let v1 = sb.get_vnode(ino).unwrap();
    assert!(Arc::ptr_eq(&file, &v1));
    assert_eq!(file.kobj.refcount(), 2);
    let v2 = sb.get_vnode(ino).unwrap();
    assert!(Arc::ptr_eq(&file, &v2));
    assert_eq!(file.kobj.refcount(), 3);

    v1.kobj.release();
    v2.kobj.release();
    assert_eq!(file.kobj.refcount(), 1);

    // A live external reference keeps the mount busy.
    assert_eq!(reg.umount("/it-dedup"), Err(MountError::Busy));
    assert!(reg.lookup("/it-dedup").is_some());

    file.kobj.release();
    assert_eq!(file.kobj.refcount(), 0);
    assert!(file.kobj.acquire().is_err());

    // After the teardown a fresh instance may be materialized.
    let fresh = sb.get_vnode(ino).unwrap();
    assert!(!Arc::ptr_eq(&file, &fresh));
    fresh.kobj.release();

    reg.umount("/it-dedup").unwrap();
    assert_eq!(reg.umount("/it-dedup"), Err(MountError::NotMounted));
}

#[test]
fn test_device_node_io_through_cache() {
    setup();
    let reg = registry();
    let sb = reg
        .mount("ramfs", "/it-dev", MountFlags::empty(), &[])
        .unwrap();
    let root = sb.root();

    let disk = root
        .mknod(
            b"disk0",
            mode::make_mode(mode::S_IFBLK, 0o600),
            DevSpec::new(Ramdisk::new(512, 64)),
        )
        .unwrap();
    assert!(disk.is_blk());

    // Raw positioned I/O crossing a block boundary, all through the cache.
    let payload: Vec<u8> = (0..1500).map(|i| (i % 251) as u8).collect();
    let mut off = 300;
    assert_eq!(disk.write(&mut off, &payload).unwrap(), 1500);

    let found = root.lookup(b"disk0").unwrap();
    assert!(Arc::ptr_eq(&disk, &found));
    let mut off = 300;
    let mut back = vec![0u8; 1500];
    assert_eq!(found.read(&mut off, &mut back).unwrap(), 1500);
    assert_eq!(back, payload);

    found.kobj.release();
    disk.kobj.release();
    reg.umount("/it-dev").unwrap();
}

#[test]
fn test_hard_links_and_reclaim() {
    setup();
    let reg = registry();
    let sb = reg
        .mount("ramfs", "/it-links", MountFlags::empty(), &[])
        .unwrap();
    let root = sb.root();

    let file = root.create(b"orig", 0o644).unwrap();
    let mut off = 0;
    file.write(&mut off, b"payload").unwrap();

    root.link(&file, b"hard").unwrap();
    assert_eq!(file.stat().unwrap().nlink, 2);

    // Unlinking one name leaves the other fully functional.
    root.unlink(b"orig").unwrap();
    assert!(root.lookup(b"orig").is_err());
    let via_link = root.lookup(b"hard").unwrap();
    let mut off = 0;
    let mut buf = [0u8; 16];
    let n = via_link.read(&mut off, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"payload");
    assert_eq!(via_link.stat().unwrap().nlink, 1);

    // Unlinked-but-referenced: the node survives until the last kobj
    // reference goes away.
    root.unlink(b"hard").unwrap();
    let mut off = 0;
    let n = file.read(&mut off, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"payload");

    via_link.kobj.release();
    file.kobj.release();
    // Storage is gone now; nothing keeps the mount busy.
    reg.umount("/it-links").unwrap();
}

#[test]
fn test_directory_edge_cases() {
    setup();
    let reg = registry();
    let sb = reg
        .mount("ramfs", "/it-dirs", MountFlags::empty(), &[])
        .unwrap();
    let root = sb.root();
    use ferrite_kernel::fs::vfs::VfsError;

    let d = root.mkdir(b"d", 0o755).unwrap();
    let f = d.create(b"f", 0o644).unwrap();

    assert_eq!(root.rmdir(b"d"), Err(VfsError::DirectoryNotEmpty));
    assert_eq!(root.unlink(b"d"), Err(VfsError::IsADirectory));
    assert_eq!(d.rmdir(b"f"), Err(VfsError::NotADirectory));
    assert_eq!(root.create(b"d", 0o644).map(|_| ()), Err(VfsError::AlreadyExists));
    assert_eq!(root.create(b"", 0o644).map(|_| ()), Err(VfsError::InvalidArgument));
    assert_eq!(root.lookup(b"missing").map(|_| ()), Err(VfsError::NotFound));

    // ".." resolves to the parent directory's vnode.
    let up = d.lookup(b"..").unwrap();
    assert_eq!(up.num, root.num);
    up.kobj.release();

    d.unlink(b"f").unwrap();
    f.kobj.release();
    root.rmdir(b"d").unwrap();
    d.kobj.release();
    reg.umount("/it-dirs").unwrap();
}

#[test]
fn test_mount_parameters_and_quota() {
    setup();
    let reg = registry();

    // Malformed parameter blobs are rejected before any state exists.
    assert_eq!(
        reg.mount("ramfs", "/it-parm", MountFlags::empty(), &[1, 2, 3])
            .map(|_| ()),
        Err(MountError::InvalidParameter)
    );
    assert_eq!(
        reg.mount("ramfs", "/it-parm", MountFlags::empty(), &0u64.to_le_bytes())
            .map(|_| ()),
        Err(MountError::InvalidParameter)
    );

    // An 8-byte blob caps the capacity.
    let sb = reg
        .mount("ramfs", "/it-parm", MountFlags::empty(), &1024u64.to_le_bytes())
        .unwrap();
    let root = sb.root();
    let f = root.create(b"fits", 0o644).unwrap();
    let mut off = 0;
    f.write(&mut off, &[7u8; 512]).unwrap();

    use ferrite_kernel::fs::vfs::VfsError;
    let mut off = 512;
    assert_eq!(f.write(&mut off, &[7u8; 4096]), Err(VfsError::NoSpace));

    f.kobj.release();
    reg.umount("/it-parm").unwrap();
}

#[test]
fn test_readonly_mount() {
    setup();
    let reg = registry();
    let sb = reg
        .mount("ramfs", "/it-ro", MountFlags::RDONLY, &[])
        .unwrap();
    assert_eq!(sb.mode_flags(), MountFlags::RDONLY);
    let root = sb.root();

    use ferrite_kernel::fs::vfs::VfsError;
    assert_eq!(root.create(b"x", 0o644).map(|_| ()), Err(VfsError::ReadOnlyFs));
    assert_eq!(root.mkdir(b"y", 0o755).map(|_| ()), Err(VfsError::ReadOnlyFs));
    assert_eq!(root.unlink(b"z"), Err(VfsError::ReadOnlyFs));

    reg.umount("/it-ro").unwrap();
}

#[test]
fn test_sysctl_surface() {
    setup();

    assert_eq!(
        sysctl().read("kern.ostype"),
        Ok(CtlValue::Str(String::from("Ferrite")))
    );
    assert!(sysctl().list("kern").unwrap().contains(&String::from("klogger")));

    // The klogger handler validates before committing.
    assert_eq!(
        sysctl_mut().write("kern.klogger", CtlValue::Int(99)),
        Err(SysctlError::InvalidValue)
    );
    assert_eq!(
        sysctl_mut().write("kern.klogger", CtlValue::Str(String::from("buf"))),
        Err(SysctlError::TypeMismatch)
    );
    let current = klog::klogger();
    sysctl_mut()
        .write("kern.klogger", CtlValue::Int(current))
        .unwrap();
    assert_eq!(sysctl().read("kern.klogger"), Ok(CtlValue::Int(current)));

    // Buffer-pool introspection responds with a sane occupancy.
    match sysctl().read("kern.bio.nbuf") {
        Ok(CtlValue::Int(n)) => assert!(n >= 0),
        other => panic!("unexpected: {other:?}"),
    }
}
