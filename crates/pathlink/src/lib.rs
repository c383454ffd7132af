//! Top-level facade crate for pathlink.
//!
//! Re-exports the protocol core and the client library so users can depend on a single crate.

pub mod core {
    pub use pathlink_core::*;
}

pub mod client {
    pub use pathlink_client::*;
}
