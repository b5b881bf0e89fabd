//! Nullable infrastructure for deterministic testing.
//!
//! Services in this workspace read time through the [`Clock`] trait. This
//! crate provides a test-friendly implementation that:
//! - Returns deterministic values
//! - Can be controlled programmatically
//! - Never touches the system clock
//!
//! Usage: hand an `Arc<NullClock>` to a service in place of `SystemClock`.
//!
//! [`Clock`]: msgchain_types::Clock

pub mod clock;

pub use clock::NullClock;
