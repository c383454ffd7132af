//! Protocol modules (framing + envelopes).
//!
//! - Frame: `[u32 BE length][payload]` reassembly over an arbitrary byte stream.
//! - Envelope: JSON `{sub, msg, request}` with base64 inner payloads.
//!
//! All parsers are panic-free: malformed input is reported as `PathlinkError`
//! instead of panicking or indexing raw buffers.

pub mod envelope;
pub mod frame;

pub use envelope::{
    build_registration, subject, Envelope, ErrorReply, InnerRequest, InnerResponse, RegisterBody,
    RequestId, RequestIdGen,
};
pub use frame::{encode_frame, FrameBuffer};
