//! sysctl — the kernel's MIB registry.
//!
//! A tree of named OIDs addressed by dotted paths (`kern.klogger`).
//! Interior nodes group; leaves carry a typed value with an access mode
//! and, for writable leaves, a handler that validates the new value before
//! any side effect is committed. Single OIDs can be added and removed
//! independently without disturbing their siblings.

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use fos_error::define_kernel_error;
use fos_utils::{HashMap, Lazy, RwLock, RwLockReadGuard, RwLockWriteGuard};

define_kernel_error! {
    /// Registry errors. Error codes in range 0x08xx (sysctl subsystem).
    pub enum SysctlError(0x08) {
        /// No OID at that path
        NotFound = 0x01 => "No such OID",
        /// An OID already exists at that path
        Exists = 0x02 => "OID already exists",
        /// Path component is not an interior node
        NotANode = 0x03 => "Not a node",
        /// Read/write addressed an interior node
        IsANode = 0x04 => "Is a node",
        /// Write to a read-only OID
        ReadOnly = 0x05 => "OID is read-only",
        /// Handler rejected the new value
        InvalidValue = 0x06 => "Invalid value",
        /// Value type does not match the OID's declared type
        TypeMismatch = 0x07 => "Type mismatch",
        /// Unregistering an interior node that still has children
        NotEmpty = 0x08 => "Node not empty",
    }
}

/// Access mode of a leaf OID.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CtlAccess {
    ReadOnly,
    ReadWrite,
}

/// A typed OID value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CtlValue {
    Int(i32),
    Str(String),
}

impl CtlValue {
    fn same_type(&self, other: &CtlValue) -> bool {
        matches!(
            (self, other),
            (CtlValue::Int(_), CtlValue::Int(_)) | (CtlValue::Str(_), CtlValue::Str(_))
        )
    }
}

/// Read handler for procedural OIDs.
pub type ReadHandler = Box<dyn Fn() -> CtlValue + Send + Sync>;
/// Write handler: validate `new` and commit its side effect, or reject.
pub type WriteHandler = Box<dyn Fn(&CtlValue) -> Result<(), SysctlError> + Send + Sync>;

enum OidKind {
    /// Interior node with children.
    Node(HashMap<String, Oid>),
    /// Stored value leaf.
    Value { value: CtlValue },
    /// Procedural leaf: value computed on read, side effect on write.
    Proc {
        read: ReadHandler,
        write: Option<WriteHandler>,
    },
}

/// One registry entry.
pub struct Oid {
    access: CtlAccess,
    kind: OidKind,
}

impl Oid {
    /// Interior node.
    pub fn node() -> Self {
        Self {
            access: CtlAccess::ReadOnly,
            kind: OidKind::Node(HashMap::new()),
        }
    }

    /// Read-only stored value.
    pub fn value_ro(value: CtlValue) -> Self {
        Self {
            access: CtlAccess::ReadOnly,
            kind: OidKind::Value { value },
        }
    }

    /// Read-write stored value (no side effects on write).
    pub fn value_rw(value: CtlValue) -> Self {
        Self {
            access: CtlAccess::ReadWrite,
            kind: OidKind::Value { value },
        }
    }

    /// Read-only procedural leaf.
    pub fn proc_ro(read: ReadHandler) -> Self {
        Self {
            access: CtlAccess::ReadOnly,
            kind: OidKind::Proc { read, write: None },
        }
    }

    /// Read-write procedural leaf; `write` validates before committing.
    pub fn proc_rw(read: ReadHandler, write: WriteHandler) -> Self {
        Self {
            access: CtlAccess::ReadWrite,
            kind: OidKind::Proc {
                read,
                write: Some(write),
            },
        }
    }
}

/// The OID tree.
pub struct SysctlRegistry {
    root: HashMap<String, Oid>,
}

fn split_path(path: &str) -> (Vec<&str>, &str) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let leaf = parts.pop().unwrap_or("");
    (parts, leaf)
}

impl SysctlRegistry {
    pub fn new() -> Self {
        Self {
            root: HashMap::new(),
        }
    }

    /// Walk to the interior node holding the last path component's parent.
    fn parent_children(&self, parts: &[&str]) -> Result<&HashMap<String, Oid>, SysctlError> {
        let mut children = &self.root;
        for part in parts {
            match children.get(*part) {
                Some(Oid {
                    kind: OidKind::Node(next),
                    ..
                }) => children = next,
                Some(_) => return Err(SysctlError::NotANode),
                None => return Err(SysctlError::NotFound),
            }
        }
        Ok(children)
    }

    fn parent_children_mut(
        &mut self,
        parts: &[&str],
    ) -> Result<&mut HashMap<String, Oid>, SysctlError> {
        let mut children = &mut self.root;
        for part in parts {
            match children.get_mut(*part) {
                Some(Oid {
                    kind: OidKind::Node(next),
                    ..
                }) => children = next,
                Some(_) => return Err(SysctlError::NotANode),
                None => return Err(SysctlError::NotFound),
            }
        }
        Ok(children)
    }

    /// Register `oid` at `path`. The parent chain must already exist.
    pub fn register(&mut self, path: &str, oid: Oid) -> Result<(), SysctlError> {
        let (parts, leaf) = split_path(path);
        if leaf.is_empty() {
            return Err(SysctlError::NotFound);
        }
        let children = self.parent_children_mut(&parts)?;
        if children.contains_key(leaf) {
            return Err(SysctlError::Exists);
        }
        children.insert(String::from(leaf), oid);
        Ok(())
    }

    /// Remove the OID at `path` without disturbing its siblings.
    ///
    /// Interior nodes must be empty; removing a missing OID fails cleanly.
    pub fn unregister(&mut self, path: &str) -> Result<(), SysctlError> {
        let (parts, leaf) = split_path(path);
        let children = self.parent_children_mut(&parts)?;
        match children.get(leaf) {
            None => return Err(SysctlError::NotFound),
            Some(Oid {
                kind: OidKind::Node(grandchildren),
                ..
            }) if !grandchildren.is_empty() => return Err(SysctlError::NotEmpty),
            Some(_) => {}
        }
        children.remove(leaf);
        Ok(())
    }

    /// Read the value of the leaf at `path`.
    pub fn read(&self, path: &str) -> Result<CtlValue, SysctlError> {
        let (parts, leaf) = split_path(path);
        let children = self.parent_children(&parts)?;
        match children.get(leaf) {
            None => Err(SysctlError::NotFound),
            Some(oid) => match &oid.kind {
                OidKind::Node(_) => Err(SysctlError::IsANode),
                OidKind::Value { value } => Ok(value.clone()),
                OidKind::Proc { read, .. } => Ok(read()),
            },
        }
    }

    /// Write `new` to the leaf at `path`.
    ///
    /// The value is validated (type, then handler) before anything is
    /// committed; a rejected write has no side effect.
    pub fn write(&mut self, path: &str, new: CtlValue) -> Result<(), SysctlError> {
        let (parts, leaf) = split_path(path);
        let children = self.parent_children_mut(&parts)?;
        let oid = children.get_mut(leaf).ok_or(SysctlError::NotFound)?;
        if oid.access != CtlAccess::ReadWrite {
            return Err(SysctlError::ReadOnly);
        }
        match &mut oid.kind {
            OidKind::Node(_) => Err(SysctlError::IsANode),
            OidKind::Value { value } => {
                if !value.same_type(&new) {
                    return Err(SysctlError::TypeMismatch);
                }
                *value = new;
                Ok(())
            }
            OidKind::Proc { read, write } => {
                if !read().same_type(&new) {
                    return Err(SysctlError::TypeMismatch);
                }
                match write {
                    Some(handler) => handler(&new),
                    None => Err(SysctlError::ReadOnly),
                }
            }
        }
    }

    /// Names of the children of the interior node at `path` (`""` lists
    /// the roots).
    pub fn list(&self, path: &str) -> Result<Vec<String>, SysctlError> {
        let children = if path.is_empty() {
            &self.root
        } else {
            let (parts, leaf) = split_path(path);
            match self.parent_children(&parts)?.get(leaf) {
                Some(Oid {
                    kind: OidKind::Node(children),
                    ..
                }) => children,
                Some(_) => return Err(SysctlError::NotANode),
                None => return Err(SysctlError::NotFound),
            }
        };
        let mut names: Vec<String> = children.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl Default for SysctlRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Global registry
// ============================================================================

static SYSCTL: Lazy<RwLock<SysctlRegistry>> = Lazy::new(|| RwLock::new(SysctlRegistry::new()));

/// Get a read lock on the global sysctl tree.
pub fn sysctl() -> RwLockReadGuard<'static, SysctlRegistry> {
    SYSCTL.read()
}

/// Get a write lock on the global sysctl tree.
pub fn sysctl_mut() -> RwLockWriteGuard<'static, SysctlRegistry> {
    SYSCTL.write()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_add_remove_leaves_siblings_alone() {
        let mut reg = SysctlRegistry::new();
        reg.register("vm", Oid::node()).unwrap();
        reg.register("vm.nswap", Oid::value_ro(CtlValue::Int(0)))
            .unwrap();
        reg.register("vm.pressure", Oid::value_rw(CtlValue::Int(10)))
            .unwrap();

        reg.unregister("vm.nswap").unwrap();
        // Sibling still resolvable and unaffected.
        assert_eq!(reg.read("vm.pressure"), Ok(CtlValue::Int(10)));
        // Removing an already-removed OID fails cleanly.
        assert_eq!(reg.unregister("vm.nswap"), Err(SysctlError::NotFound));
    }

    #[test]
    fn test_register_shape_errors() {
        let mut reg = SysctlRegistry::new();
        reg.register("kern", Oid::node()).unwrap();
        reg.register("kern.hz", Oid::value_ro(CtlValue::Int(100)))
            .unwrap();

        assert_eq!(
            reg.register("kern.hz", Oid::value_ro(CtlValue::Int(1))),
            Err(SysctlError::Exists)
        );
        // Parent must exist and must be a node.
        assert_eq!(
            reg.register("debug.trace", Oid::value_ro(CtlValue::Int(0))),
            Err(SysctlError::NotFound)
        );
        assert_eq!(
            reg.register("kern.hz.fine", Oid::value_ro(CtlValue::Int(0))),
            Err(SysctlError::NotANode)
        );
        // A non-empty node refuses to go away; its leaf does not.
        assert_eq!(reg.unregister("kern"), Err(SysctlError::NotEmpty));
        reg.unregister("kern.hz").unwrap();
        reg.unregister("kern").unwrap();
    }

    #[test]
    fn test_access_and_type_checks() {
        let mut reg = SysctlRegistry::new();
        reg.register("kern", Oid::node()).unwrap();
        reg.register("kern.ostype", Oid::value_ro(CtlValue::Str(String::from("Ferrite"))))
            .unwrap();
        reg.register("kern.dbglvl", Oid::value_rw(CtlValue::Int(1)))
            .unwrap();

        assert_eq!(
            reg.write("kern.ostype", CtlValue::Str(String::from("x"))),
            Err(SysctlError::ReadOnly)
        );
        assert_eq!(
            reg.write("kern.dbglvl", CtlValue::Str(String::from("2"))),
            Err(SysctlError::TypeMismatch)
        );
        reg.write("kern.dbglvl", CtlValue::Int(3)).unwrap();
        assert_eq!(reg.read("kern.dbglvl"), Ok(CtlValue::Int(3)));
        assert_eq!(reg.read("kern"), Err(SysctlError::IsANode));
    }

    #[test]
    fn test_proc_handler_validates_before_commit() {
        use core::sync::atomic::{AtomicI32, Ordering};
        static BACKING: AtomicI32 = AtomicI32::new(5);

        let mut reg = SysctlRegistry::new();
        reg.register("kern", Oid::node()).unwrap();
        reg.register(
            "kern.knob",
            Oid::proc_rw(
                Box::new(|| CtlValue::Int(BACKING.load(Ordering::Relaxed))),
                Box::new(|new| match new {
                    CtlValue::Int(v) if (0..=10).contains(v) => {
                        BACKING.store(*v, Ordering::Relaxed);
                        Ok(())
                    }
                    _ => Err(SysctlError::InvalidValue),
                }),
            ),
        )
        .unwrap();

        assert_eq!(reg.read("kern.knob"), Ok(CtlValue::Int(5)));
        reg.write("kern.knob", CtlValue::Int(7)).unwrap();
        assert_eq!(reg.read("kern.knob"), Ok(CtlValue::Int(7)));
        // Rejected writes commit nothing.
        assert_eq!(
            reg.write("kern.knob", CtlValue::Int(99)),
            Err(SysctlError::InvalidValue)
        );
        assert_eq!(reg.read("kern.knob"), Ok(CtlValue::Int(7)));
    }

    #[test]
    fn test_list_children() {
        let mut reg = SysctlRegistry::new();
        reg.register("hw", Oid::node()).unwrap();
        reg.register("hw.ncpu", Oid::value_ro(CtlValue::Int(1)))
            .unwrap();
        reg.register("hw.machine", Oid::value_ro(CtlValue::Str(String::from("arm"))))
            .unwrap();

        assert_eq!(reg.list("hw").unwrap(), ["machine", "ncpu"]);
        assert_eq!(reg.list("").unwrap(), ["hw"]);
        assert_eq!(reg.list("hw.ncpu"), Err(SysctlError::NotANode));
    }
}
