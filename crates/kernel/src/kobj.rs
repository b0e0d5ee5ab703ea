//! Generic reference-counted kernel object.
//!
//! `Kobj` is the base every shared kernel resource embeds when it needs
//! deterministic teardown under concurrent access: an atomic reference
//! count, a fast-lock bit serializing the count transitions, and a
//! destructor that runs exactly once when the last reference goes away.
//!
//! The count starts at 1 (the creator's implicit reference). Once it has
//! reached zero the object is defunct: `acquire` fails with
//! [`KobjError::Defunct`] and never increments again.

extern crate alloc;

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use fos_error::define_kernel_error;

define_kernel_error! {
    /// Object lifetime errors. Error codes in range 0x01xx (kobj subsystem).
    pub enum KobjError(0x01) {
        /// The object has been destroyed; no new references can be taken
        Defunct = 0x01 => "Object already destroyed",
    }
}

type Destructor = Box<dyn Fn() + Send + Sync>;

/// Reference-counted kernel object descriptor.
pub struct Kobj {
    refcount: AtomicI32,
    fast_lock: AtomicBool,
    dtor: Destructor,
}

impl Kobj {
    /// Initialize a descriptor with refcount 1 and the given destructor.
    ///
    /// The destructor must not call back into this `Kobj`. The embedding
    /// object stays allocated for the duration of the destructor because the
    /// releasing caller still holds its own handle to it.
    pub fn new(dtor: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            refcount: AtomicI32::new(1),
            fast_lock: AtomicBool::new(false),
            dtor: Box::new(dtor),
        }
    }

    /// Take the fast lock, failing if the object is already defunct.
    fn fast_lock(&self) -> Result<(), KobjError> {
        loop {
            if self.refcount.load(Ordering::Acquire) <= 0 {
                return Err(KobjError::Defunct);
            }
            if self
                .fast_lock
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // Re-check under the lock: a racing release may have taken
                // the count to zero between the load and the swap.
                if self.refcount.load(Ordering::Acquire) <= 0 {
                    self.fast_unlock();
                    return Err(KobjError::Defunct);
                }
                return Ok(());
            }
            core::hint::spin_loop();
        }
    }

    fn fast_unlock(&self) {
        self.fast_lock.store(false, Ordering::Release);
    }

    /// Observe the current reference count.
    ///
    /// Advisory only: the value may change the moment it is read. Use
    /// [`Kobj::acquire`] when existence must actually be pinned.
    pub fn refcount(&self) -> i32 {
        self.refcount.load(Ordering::Acquire).max(0)
    }

    /// Take a new reference.
    ///
    /// Fails with [`KobjError::Defunct`] and no side effect once the count
    /// has reached zero, even if the destructor is still running.
    pub fn acquire(&self) -> Result<(), KobjError> {
        self.fast_lock()?;
        self.refcount.fetch_add(1, Ordering::AcqRel);
        self.fast_unlock();
        Ok(())
    }

    /// Drop a reference; runs the destructor on the 1 -> 0 transition.
    ///
    /// Releasing past zero is a programming error: detected and ignored,
    /// with a `debug_assert!` to catch it in development builds.
    pub fn release(&self) {
        if self.fast_lock().is_err() {
            debug_assert!(false, "kobj released past zero");
            return;
        }
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            // Last reference. The fast lock stays held so no acquire can
            // slip in ahead of the destructor; the defunct check in
            // fast_lock() keeps later callers from spinning on it.
            (self.dtor)();
        } else {
            self.fast_unlock();
        }
    }
}

impl core::fmt::Debug for Kobj {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kobj")
            .field("refcount", &self.refcount())
            .finish()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
