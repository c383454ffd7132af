//! Length-prefixed frame codec (panic-free).
//!
//! Wire layout: `[u32 BE payload length][payload]`. The length counts payload
//! bytes only.
//!
//! Parsing rules:
//! - Never index the buffer directly; peek the header through `get(..)`.
//! - The header is not consumed until the whole frame is buffered.
//! - A zero-length frame is a real (empty) message, not "need more data".

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PathlinkError, Result};

/// Size of the length prefix.
pub const LEN_PREFIX_BYTES: usize = 4;

/// Default ceiling for inbound payloads (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Prepend the 4-byte big-endian length header to `payload`.
///
/// Fails only when the payload length does not fit in a `u32`.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| PathlinkError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut out = BytesMut::with_capacity(LEN_PREFIX_BYTES + payload.len());
    out.put_u32(len);
    out.put_slice(payload);
    Ok(out.freeze())
}

/// Reassembly buffer for one inbound stream.
///
/// Owned by whoever reads the stream; nothing is shared between sessions.
/// Once a frame is handed out the buffer keeps no trace of it.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameBuffer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_bytes,
        }
    }

    /// Bytes currently held (partial header and/or body).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Append raw bytes read from the stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete payload, if one is fully buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A length prefix above
    /// the ceiling is an error; the stream cannot be resynchronized after it.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let Some(mut header) = self.buf.get(..LEN_PREFIX_BYTES) else {
            return Ok(None);
        };
        let len = header.get_u32() as usize;

        if len > self.max_frame_bytes {
            tracing::debug!(len, max = self.max_frame_bytes, "length prefix over ceiling");
            return Err(PathlinkError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        let have = self.buf.len() - LEN_PREFIX_BYTES;
        if have < len {
            self.buf.reserve(len - have);
            return Ok(None);
        }

        self.buf.advance(LEN_PREFIX_BYTES);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Append `chunk` and drain every complete payload, in stream order.
    ///
    /// Partial data stays buffered for the next call. An empty `chunk` is
    /// end-of-stream as far as the socket is concerned; callers should then
    /// stop reading and call [`FrameBuffer::finish`].
    ///
    /// Payloads that precede a bad length prefix are returned first. The bad
    /// header stays buffered, so the next call reports `FrameTooLarge`.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.extend(chunk);
        let mut out = Vec::new();
        loop {
            match self.next_frame() {
                Ok(Some(payload)) => out.push(payload),
                Ok(None) => return Ok(out),
                Err(e) if out.is_empty() => return Err(e),
                Err(_) => return Ok(out),
            }
        }
    }

    /// Check the buffer at end-of-stream.
    ///
    /// Leftover bytes mean the peer closed mid-frame.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(PathlinkError::IncompleteFrameAtClose {
                buffered: self.buf.len(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn stream_of(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in payloads {
            out.extend_from_slice(&encode_frame(p).unwrap());
        }
        out
    }

    fn feed_chunks(stream: &[u8], sizes: impl Iterator<Item = usize>) -> Vec<Bytes> {
        let mut fb = FrameBuffer::default();
        let mut out = Vec::new();
        let mut rest = stream;
        for n in sizes {
            if rest.is_empty() {
                break;
            }
            let (chunk, tail) = rest.split_at(n.min(rest.len()));
            out.extend(fb.feed(chunk).unwrap());
            rest = tail;
        }
        out.extend(fb.feed(rest).unwrap());
        fb.finish().unwrap();
        out
    }

    #[test]
    fn encode_prepends_big_endian_length() {
        let f = encode_frame(b"hello").unwrap();
        assert_eq!(&f[..4], &[0, 0, 0, 5]);
        assert_eq!(&f[4..], b"hello");
    }

    #[test]
    fn header_split_reassembles_like_single_read() {
        let payload = b"0123456789";
        let stream = stream_of(&[payload]);
        assert_eq!(stream.len(), 14);

        let mut split = FrameBuffer::default();
        assert!(split.feed(&stream[..4]).unwrap().is_empty());
        let got = split.feed(&stream[4..]).unwrap();

        let mut whole = FrameBuffer::default();
        let once = whole.feed(&stream).unwrap();

        assert_eq!(got, once);
        assert_eq!(got[0].as_ref(), payload);
    }

    #[test]
    fn short_header_waits_for_more() {
        let stream = stream_of(&[b"abc"]);
        let mut fb = FrameBuffer::default();
        assert!(fb.feed(&stream[..2]).unwrap().is_empty());
        assert_eq!(fb.buffered(), 2);
        let got = fb.feed(&stream[2..]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(fb.buffered(), 0);
    }

    #[test]
    fn coalesced_frames_all_come_out_in_order() {
        let stream = stream_of(&[b"one", b"two", b"three"]);
        let mut fb = FrameBuffer::default();
        let got = fb.feed(&stream).unwrap();
        let got: Vec<&[u8]> = got.iter().map(|b| b.as_ref()).collect();
        assert_eq!(got, vec![&b"one"[..], b"two", b"three"]);
    }

    #[test]
    fn zero_length_frame_is_an_empty_message() {
        let stream = stream_of(&[b"", b"x"]);
        let mut fb = FrameBuffer::default();
        let got = fb.feed(&stream).unwrap();
        assert_eq!(got.len(), 2);
        assert!(got[0].is_empty());
        assert_eq!(got[1].as_ref(), b"x");
    }

    #[test]
    fn any_chunking_yields_same_payloads() {
        let payloads: [&[u8]; 4] = [b"{\"sub\":\"A\"}", b"", b"xyz", &[7u8; 300]];
        let stream = stream_of(&payloads);
        let expected = feed_chunks(&stream, std::iter::empty());

        // one byte at a time
        assert_eq!(feed_chunks(&stream, std::iter::repeat(1)), expected);

        // every two-way split
        for cut in 0..=stream.len() {
            assert_eq!(feed_chunks(&stream, std::iter::once(cut)), expected, "cut={cut}");
        }

        // deterministic pseudo-random chunk sizes
        let mut seed: u32 = 0x2545_f491;
        let sizes = std::iter::from_fn(move || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            Some((seed >> 16) as usize % 17 + 1)
        });
        assert_eq!(feed_chunks(&stream, sizes), expected);

        let got: Vec<&[u8]> = expected.iter().map(|b| b.as_ref()).collect();
        assert_eq!(got, payloads.to_vec());
    }

    #[test]
    fn truncated_frame_at_close_is_reported() {
        let stream = stream_of(&[b"complete", b"truncated"]);
        let mut fb = FrameBuffer::default();
        let got = fb.feed(&stream[..stream.len() - 3]).unwrap();
        assert_eq!(got.len(), 1);

        let err = fb.finish().expect_err("partial frame must not be dropped");
        assert_eq!(err.kind().as_str(), "INCOMPLETE_FRAME_AT_CLOSE");
    }

    #[test]
    fn good_frame_before_oversized_prefix_is_still_delivered() {
        let mut stream = encode_frame(b"good").unwrap().to_vec();
        stream.extend_from_slice(&[0, 0, 1, 0]);

        let mut fb = FrameBuffer::new(16);
        let got = fb.feed(&stream).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].as_ref(), b"good");
        assert_eq!(fb.buffered(), 4);

        let err = fb.feed(&[]).expect_err("bad prefix is reported on the next call");
        assert!(matches!(err, PathlinkError::FrameTooLarge { len: 256, max: 16 }));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut fb = FrameBuffer::new(8);
        let err = fb.feed(&[0, 0, 0, 9]).expect_err("must reject");
        assert!(matches!(err, PathlinkError::FrameTooLarge { len: 9, max: 8 }));
    }
}
