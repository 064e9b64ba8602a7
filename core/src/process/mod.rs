//! Process launching utilities for the Tether engine
//!
//! Platform-specific primitives for spawning a child on pipes, signalling
//! it and polling for its exit.
//!
//! ## Platform Support
//!
//! - **Unix**: Full support with process groups for safe cleanup

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
