//! pathlink core: runtime-free protocol primitives and error types.
//!
//! This crate defines the wire-level contracts (length-prefixed frames and
//! JSON envelopes) and the error surface shared by the client and tooling.
//! It carries no socket or runtime dependencies so the codec can be tested
//! and reused on its own.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `PathlinkError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorKind, PathlinkError, Result};
