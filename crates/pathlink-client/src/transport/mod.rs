//! Transport layer (TCP).
//!
//! Exposes the connection session (write path + state machine) and the
//! receive loop that turns raw reads into ordered envelopes.

pub mod receive;
pub mod session;

pub use receive::{receive_loop, Inbound};
pub use session::{Session, SessionOptions, SessionState, SessionWriter};
