//! Narrow scheduler seam.
//!
//! The core never talks to the thread scheduler directly; the only service
//! it needs is "give the CPU away while I wait". The embedder installs the
//! real yield primitive at boot; until then waiting degrades to a
//! spin-loop hint, which is correct (if wasteful) on a preemptible kernel.

use fos_utils::Once;

static YIELD_HOOK: Once<fn()> = Once::new();

/// Install the scheduler's yield primitive. First caller wins.
pub fn set_yield_hook(hook: fn()) {
    YIELD_HOOK.call_once(|| hook);
}

/// Yield the CPU to another runnable thread, if the scheduler is wired up.
pub fn yield_now() {
    match YIELD_HOOK.get() {
        Some(hook) => hook(),
        None => core::hint::spin_loop(),
    }
}
