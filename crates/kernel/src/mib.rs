//! The core's own sysctl OIDs.
//!
//! Registered at `kinit`, removed at `kfini`. The one read-write tunable
//! is `kern.klogger`, which switches the active log sink after the klog
//! module has validated the id.

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;

use crate::bio;
use crate::klog;
use crate::sysctl::{CtlValue, Oid, SysctlError, sysctl_mut};

/// OS type string reported by `kern.ostype`.
pub const OSTYPE: &str = "Ferrite";
/// Release string reported by `kern.osrelease`.
pub const OSRELEASE: &str = "0.1.0";

pub(crate) fn register() {
    let mut reg = sysctl_mut();
    let _ = reg.register("kern", Oid::node());
    let _ = reg.register(
        "kern.ostype",
        Oid::value_ro(CtlValue::Str(String::from(OSTYPE))),
    );
    let _ = reg.register(
        "kern.osrelease",
        Oid::value_ro(CtlValue::Str(String::from(OSRELEASE))),
    );
    let _ = reg.register(
        "kern.klogger",
        Oid::proc_rw(
            Box::new(|| CtlValue::Int(klog::klogger())),
            Box::new(|new| match new {
                CtlValue::Int(id) => {
                    klog::set_klogger(*id).map_err(|_| SysctlError::InvalidValue)
                }
                CtlValue::Str(_) => Err(SysctlError::TypeMismatch),
            }),
        ),
    );
    let _ = reg.register("kern.bio", Oid::node());
    let _ = reg.register(
        "kern.bio.nbuf",
        Oid::proc_ro(Box::new(|| CtlValue::Int(bio::nbuf() as i32))),
    );
}

pub(crate) fn unregister() {
    let mut reg = sysctl_mut();
    let _ = reg.unregister("kern.bio.nbuf");
    let _ = reg.unregister("kern.bio");
    let _ = reg.unregister("kern.klogger");
    let _ = reg.unregister("kern.osrelease");
    let _ = reg.unregister("kern.ostype");
    let _ = reg.unregister("kern");
}
