//! Kernel logger.
//!
//! Implements the `log::Log` facade and routes records to a
//! runtime-selectable sink: nothing, the in-memory last-log ring, or a
//! console hook supplied by the embedder. The active sink is exposed as the
//! `kern.klogger` sysctl so it can be flipped from userspace at runtime.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;
use core::sync::atomic::{AtomicI32, Ordering};

use fos_error::define_kernel_error;
use fos_utils::{Mutex, Once, RingBuffer};
use log::{Level, LevelFilter, Metadata, Record};

define_kernel_error! {
    /// Logger errors. Error codes in range 0x02xx (klog subsystem).
    pub enum KlogError(0x02) {
        /// The requested sink id does not name a known logger
        UnknownLogger = 0x01 => "Unknown logger id",
    }
}

/// Discard all records.
pub const KLOGGER_NONE: i32 = 0;
/// Keep the most recent records in the last-log ring (the boot default).
pub const KLOGGER_BUF: i32 = 1;
/// Hand formatted lines to the embedder's console hook.
pub const KLOGGER_CONSOLE: i32 = 2;

/// Records retained by the last-log ring.
const LASTLOG_RECORDS: usize = 64;
/// Formatted bytes kept per record; longer lines are truncated.
const RECORD_BYTES: usize = 120;

/// One formatted log line, fixed-size so the ring stays allocation-free.
#[derive(Clone, Copy)]
pub struct KlogRecord {
    len: usize,
    bytes: [u8; RECORD_BYTES],
}

impl KlogRecord {
    const EMPTY: Self = Self {
        len: 0,
        bytes: [0; RECORD_BYTES],
    };

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl Default for KlogRecord {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// `core::fmt::Write` sink into a `KlogRecord`, truncating at capacity on a
/// UTF-8 boundary.
struct RecordWriter(KlogRecord);

impl Write for RecordWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let room = RECORD_BYTES - self.0.len;
        let take = if s.len() <= room {
            s.len()
        } else {
            // Back off to a character boundary so as_str() stays valid.
            let mut n = room;
            while n > 0 && !s.is_char_boundary(n) {
                n -= 1;
            }
            n
        };
        self.0.bytes[self.0.len..self.0.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.0.len += take;
        Ok(())
    }
}

static ACTIVE: AtomicI32 = AtomicI32::new(KLOGGER_BUF);
static LASTLOG: Mutex<RingBuffer<KlogRecord, LASTLOG_RECORDS>> =
    Mutex::new(RingBuffer::new(KlogRecord::EMPTY));
static CONSOLE_HOOK: Once<fn(&str)> = Once::new();

struct KernelLog;

static LOGGER: KernelLog = KernelLog;

impl log::Log for KernelLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut w = RecordWriter(KlogRecord::EMPTY);
        let _ = write!(w, "[{}] {}", record.level(), record.args());

        match ACTIVE.load(Ordering::Relaxed) {
            KLOGGER_BUF => {
                let mut ring = LASTLOG.lock();
                if !ring.push(w.0) {
                    // Full ring drops the oldest record, not the newest.
                    ring.pop();
                    ring.push(w.0);
                }
            }
            KLOGGER_CONSOLE => {
                if let Some(hook) = CONSOLE_HOOK.get() {
                    hook(w.0.as_str());
                }
            }
            _ => {}
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger on the `log` facade.
///
/// Safe to call again (e.g. to adjust the level); the facade keeps the
/// first logger.
pub fn init(max_level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(max_level);
}

/// Install the console sink's line hook. First caller wins.
pub fn set_console_hook(hook: fn(&str)) {
    CONSOLE_HOOK.call_once(|| hook);
}

/// Currently active sink id.
pub fn klogger() -> i32 {
    ACTIVE.load(Ordering::Relaxed)
}

/// Switch the active sink, validating the id first.
pub fn set_klogger(id: i32) -> Result<(), KlogError> {
    match id {
        KLOGGER_NONE | KLOGGER_BUF | KLOGGER_CONSOLE => {
            ACTIVE.store(id, Ordering::Relaxed);
            Ok(())
        }
        _ => Err(KlogError::UnknownLogger),
    }
}

/// Drain the last-log ring, oldest record first.
pub fn lastlog_drain() -> Vec<String> {
    let mut ring = LASTLOG.lock();
    let mut out = Vec::with_capacity(ring.len());
    while let Some(rec) = ring.pop() {
        out.push(String::from(rec.as_str()));
    }
    out
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    // Single test so there is exactly one drainer of the shared ring.
    #[test]
    fn test_lastlog_ring() {
        init(LevelFilter::Info);

        let marker = "klog-test-record-000";
        log::info!("{marker}");
        let drained = lastlog_drain();
        assert!(
            drained.iter().any(|l| l.contains(marker)),
            "expected {marker} in {drained:?}"
        );

        // Overfill: the newest record survives and the ring never grows
        // past its capacity.
        for i in 0..(LASTLOG_RECORDS + 8) {
            log::info!("klog-flood-{i:04}");
        }
        let drained = lastlog_drain();
        assert!(drained.iter().any(|l| l.contains("klog-flood-")));
        assert!(drained.len() <= LASTLOG_RECORDS);
    }

    #[test]
    fn test_set_klogger_validates() {
        assert_eq!(set_klogger(99), Err(KlogError::UnknownLogger));
        // A rejected write leaves the active sink untouched.
        assert!(set_klogger(klogger()).is_ok());
    }

    #[test]
    fn test_record_truncates_on_char_boundary() {
        let mut w = RecordWriter(KlogRecord::EMPTY);
        let long: String = core::iter::repeat('é').take(RECORD_BYTES).collect();
        let _ = write!(w, "{long}");
        assert!(w.0.len <= RECORD_BYTES);
        // Still valid UTF-8 after truncation.
        assert!(!w.0.as_str().is_empty());
    }
}
