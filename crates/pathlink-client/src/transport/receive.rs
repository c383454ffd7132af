//! Inbound half of a session: bytes -> frames -> envelopes, in receipt order.
//!
//! - A frame that fails to decode is delivered as `Err(MalformedEnvelope)`
//!   and the loop keeps going.
//! - EOF with an empty buffer is a clean close; EOF mid-frame is
//!   `IncompleteFrameAtClose`.
//! - Read errors and oversized length prefixes end the loop with an error.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};

use pathlink_core::error::{PathlinkError, Result};
use pathlink_core::protocol::{Envelope, FrameBuffer};

use crate::obs::ClientMetrics;

/// One delivered item: a decoded envelope or the per-frame decode error.
pub type Inbound = Result<Envelope>;

const READ_CHUNK_BYTES: usize = 4096;

/// Run until EOF, a fatal error, cancellation, or the consumer going away.
pub async fn receive_loop<R>(
    mut reader: R,
    mut frames: FrameBuffer,
    tx: mpsc::Sender<Inbound>,
    mut cancel: watch::Receiver<bool>,
    metrics: Arc<ClientMetrics>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        let n = tokio::select! {
            biased;

            _ = cancel.changed() => {
                tracing::debug!("receive loop cancelled");
                return Ok(());
            }

            read = reader.read(&mut chunk) => read
                .map_err(|e| PathlinkError::Connection(format!("read failed: {e}")))?,
        };

        if n == 0 {
            frames.finish()?;
            tracing::debug!("peer closed the stream");
            return Ok(());
        }

        metrics.bytes.add(&[("dir", "in")], n as u64);
        frames.extend(&chunk[..n]);

        while let Some(payload) = frames.next_frame()? {
            metrics.frames.inc(&[("dir", "in")]);

            let item = Envelope::decode(&payload);
            match &item {
                Ok(env) => tracing::debug!(sub = %env.sub, request = env.request, "envelope received"),
                Err(e) => {
                    metrics.decode_errors.inc(&[("kind", e.kind().as_str())]);
                    tracing::warn!(len = payload.len(), error = %e, "malformed frame");
                }
            }

            let sent = tokio::select! {
                biased;

                _ = cancel.changed() => {
                    tracing::debug!("receive loop cancelled while delivering");
                    return Ok(());
                }

                sent = tx.send(item) => sent,
            };
            if sent.is_err() {
                tracing::debug!("inbound consumer dropped; stopping receive loop");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pathlink_core::protocol::encode_frame;
    use tokio::io::AsyncWriteExt;

    fn spawn_loop(
        reader: tokio::io::DuplexStream,
        max: usize,
    ) -> (
        mpsc::Receiver<Inbound>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(receive_loop(
            reader,
            FrameBuffer::new(max),
            tx,
            cancel_rx,
            Arc::new(ClientMetrics::default()),
        ));
        (rx, cancel_tx, handle)
    }

    #[tokio::test]
    async fn byte_at_a_time_delivery_keeps_order() {
        let (mut peer, ours) = tokio::io::duplex(64);
        let (mut rx, _cancel, handle) = spawn_loop(ours, 1024);

        let a = Envelope::new("TASK", b"first", 1);
        let b = Envelope::new("TASK", b"second", 2);
        let mut stream = a.to_frame().unwrap().to_vec();
        stream.extend_from_slice(&b.to_frame().unwrap());

        for byte in stream {
            peer.write_all(&[byte]).await.unwrap();
        }
        drop(peer);

        assert_eq!(rx.recv().await.unwrap().unwrap(), a);
        assert_eq!(rx.recv().await.unwrap().unwrap(), b);
        assert!(rx.recv().await.is_none());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_then_valid_frame() {
        let (mut peer, ours) = tokio::io::duplex(1024);
        let (mut rx, _cancel, handle) = spawn_loop(ours, 1024);

        let good = Envelope::new("REG_RESPONSE", b"ok", 5);
        peer.write_all(&encode_frame(b"{\"sub\":1}").unwrap()).await.unwrap();
        peer.write_all(&good.to_frame().unwrap()).await.unwrap();
        drop(peer);

        let first = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(first.kind().as_str(), "MALFORMED_ENVELOPE");
        assert_eq!(rx.recv().await.unwrap().unwrap(), good);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_error() {
        let (mut peer, ours) = tokio::io::duplex(64);
        let (_rx, _cancel, handle) = spawn_loop(ours, 1024);

        peer.write_all(&[0, 0, 0, 10, b'a', b'b']).await.unwrap();
        drop(peer);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PathlinkError::IncompleteFrameAtClose { buffered: 6 }));
    }

    #[tokio::test]
    async fn cancel_unblocks_a_pending_read() {
        let (_peer, ours) = tokio::io::duplex(64);
        let (_rx, cancel, handle) = spawn_loop(ours, 1024);

        cancel.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_unblocks_delivery_to_a_full_queue() {
        let (mut peer, ours) = tokio::io::duplex(1024);
        let (tx, _rx) = mpsc::channel(1);
        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(receive_loop(
            ours,
            FrameBuffer::new(1024),
            tx,
            cancel_rx,
            Arc::new(ClientMetrics::default()),
        ));

        for id in 1..=3 {
            peer.write_all(&Envelope::new("TASK", b"t", id).to_frame().unwrap())
                .await
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        cancel.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn oversized_prefix_ends_the_loop() {
        let (mut peer, ours) = tokio::io::duplex(64);
        let (_rx, _cancel, handle) = spawn_loop(ours, 8);

        peer.write_all(&[0, 0, 1, 0]).await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind().as_str(), "FRAME_TOO_LARGE");
    }
}
