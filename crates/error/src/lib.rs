//! Kernel error handling infrastructure.
//!
//! Provides the `define_kernel_error!` macro for consistent error type
//! definitions. Every subsystem error type carries a subsystem code byte, so
//! any error in the kernel collapses to a unique `u16` code for logging.
//!
//! ## Usage
//!
//! ### Simple errors (no inner data)
//! ```ignore
//! define_kernel_error! {
//!     pub enum BioError(0x06) {
//!         Busy = 0x01 => "Buffer busy wait expired",
//!         ReadFailed = 0x02 => "Block read failed",
//!     }
//! }
//! ```
//!
//! ### Nested errors (with inner error type)
//!
//! Nested variants wrap a lower-level error and get a generated `From` impl:
//! ```ignore
//! define_kernel_error! {
//!     pub enum FsError(0x05) {
//!         Block(BioError) = 0x01 => "Block device error",
//!     }
//! }
//! ```

#![no_std]

/// Macro to define a kernel error type with consistent handling.
///
/// Supports simple variants and nested variants containing inner errors.
/// Nested variants additionally get a `From<Inner>` conversion so `?` works
/// across subsystem boundaries.
#[macro_export]
macro_rules! define_kernel_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($subsystem:literal) {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($inner:ty))? = $code:literal => $desc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $(($inner))?,
            )*
        }

        impl $name {
            /// Subsystem identifier for this error type.
            pub const SUBSYSTEM: u8 = $subsystem;

            /// Get numeric error code for debugging.
            pub const fn code(&self) -> u16 {
                match self {
                    $(
                        $crate::define_kernel_error!(@pattern $variant $(($inner))? _unused) => {
                            (($subsystem as u16) << 8) | $code
                        }
                    )*
                }
            }

            /// Get error description for logging.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(
                        $crate::define_kernel_error!(@pattern $variant $(($inner))? _unused) => {
                            $desc
                        }
                    )*
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $(
                        $crate::define_kernel_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_kernel_error!(@display_body self f $desc $(($inner))? inner)
                        }
                    )*
                }
            }
        }

        impl core::error::Error for $name {}

        $(
            $crate::define_kernel_error!(@from $name $variant $(($inner))?);
        )*
    };

    // Helper to generate patterns
    (@pattern $variant:ident ($inner:ty) $bind:ident) => { Self::$variant($bind) };
    (@pattern $variant:ident $bind:ident) => { Self::$variant };

    // Helper to generate display bodies
    (@display_body $self:ident $f:ident $desc:literal ($inner:ty) $bind:ident) => {
        write!($f, "E{:04X}: {} ({})", $self.code(), $desc, $bind)
    };
    (@display_body $self:ident $f:ident $desc:literal $bind:ident) => {
        write!($f, "E{:04X}: {}", $self.code(), $desc)
    };

    // Helper to generate From impls for nested variants
    (@from $name:ident $variant:ident ($inner:ty)) => {
        impl From<$inner> for $name {
            fn from(e: $inner) -> Self {
                Self::$variant(e)
            }
        }
    };
    (@from $name:ident $variant:ident) => {};
}
