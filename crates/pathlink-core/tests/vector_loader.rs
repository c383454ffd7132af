//! JSON test vector loader shared by frame/envelope tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    pub frame: FrameData,
    /// Read sizes to split the stream into; the remainder is fed last.
    #[serde(default)]
    pub chunks: Vec<usize>,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameData {
    pub encoding: String,
    pub data: String,
}

impl FrameData {
    pub fn decode(&self) -> Vec<u8> {
        match self.encoding.as_str() {
            "base64" => decode_b64(&self.data),
            other => panic!("unsupported encoding: {other}"),
        }
    }
}

pub fn decode_b64(s: &str) -> Vec<u8> {
    STANDARD.decode(s).expect("invalid base64 in test vector")
}

pub fn load_str(name: &str) -> String {
    std::fs::read_to_string(format!("tests/vectors/{name}")).unwrap()
}

pub fn load(name: &str) -> TestVector {
    serde_json::from_str(&load_str(name)).unwrap()
}
