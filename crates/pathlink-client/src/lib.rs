//! pathlink client library entry.
//!
//! This crate wires the config loader, TCP session, receive loop,
//! dispatcher and built-in handlers into a coordinator client. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod services;
pub mod transport;

pub use client::Client;
