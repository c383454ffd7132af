//! Envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use pathlink_core::protocol::envelope::{subject, Envelope};
use pathlink_core::protocol::frame::FrameBuffer;

mod vector_loader;
use vector_loader::load_str;

#[test]
fn parse_forwarded_request() {
    let s = load_str("envelope_request.json");
    let env = Envelope::decode(s.as_bytes()).unwrap();
    assert_eq!(env.sub, subject::REQUEST);
    assert_eq!(env.request, 7);

    let req = env.inner_request().unwrap();
    assert_eq!(req.request_id, env.request);
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/stocks");
    assert_eq!(req.header("accept"), Some("application/json"));
    assert!(req.body_bytes().unwrap().is_empty());
}

#[test]
fn missing_request_field_is_malformed() {
    let s = load_str("envelope_missing_request.json");
    let err = Envelope::decode(s.as_bytes()).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "MALFORMED_ENVELOPE");
}

#[test]
fn bad_frame_does_not_poison_the_next_one() {
    let good = Envelope::new("TASK", b"{}", 3);
    let mut stream = pathlink_core::protocol::encode_frame(b"{not json").unwrap().to_vec();
    stream.extend_from_slice(&good.to_frame().unwrap());

    let mut fb = FrameBuffer::default();
    let decoded: Vec<_> = fb
        .feed(&stream)
        .unwrap()
        .iter()
        .map(|p| Envelope::decode(p))
        .collect();

    assert_eq!(decoded.len(), 2);
    let first = decoded[0].as_ref().expect_err("first frame is garbage");
    assert_eq!(first.kind().as_str(), "MALFORMED_ENVELOPE");
    assert_eq!(decoded[1].as_ref().unwrap(), &good);
}
