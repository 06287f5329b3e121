// src/recorder.rs

//! Bounded hand-off from callback threads to an async capture writer.
//!
//! Callbacks run on the library's worker threads and must never block, so
//! [`Recorder::record`] uses `try_send` and counts what it had to drop.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use nfdriver::{EndpointId, Message};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::capture::{CaptureError, CaptureWriter, Frame};

#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::Sender<Frame>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Recorder {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rec = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (rec, rx)
    }

    /// Queue `message` stamped with the current time. Never blocks.
    pub fn record(&self, id: EndpointId, message: Message) {
        match self.tx.try_send(Frame::now(id, message)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    log::warn!("capture queue full, {n} event(s) dropped so far");
                }
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if !self.closed.swap(true, Ordering::Relaxed) {
                    log::warn!("capture writer has stopped; further events are dropped");
                }
            }
        }
    }

    /// Events discarded because the queue was full or the writer was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drain `rx` into `writer` until every sender is gone, flushing on each
/// tick of `flush_interval`. Frames too large for the format are skipped.
/// Returns the writer so callers can finish it.
/// Call inside `tokio::spawn`.
pub async fn run_capture<W: Write>(
    mut rx: mpsc::Receiver<Frame>,
    mut writer: CaptureWriter<W>,
    flush_interval: Duration,
) -> Result<CaptureWriter<W>, CaptureError> {
    let mut interval = tokio::time::interval(flush_interval);
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(frame) => match writer.write_frame(frame) {
                    Err(CaptureError::Oversized { len, max }) => {
                        log::warn!("skipping {len}-byte frame, limit is {max}");
                    }
                    other => other?,
                },
                None => break,
            },
            _ = interval.tick() => writer.flush()?,
        }
    }
    writer.flush()?;
    log::info!("capture closed after {} frame(s)", writer.frames());
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::decode_frames;

    #[tokio::test]
    async fn frames_reach_the_writer() {
        let (rec, rx) = Recorder::channel(16);
        let task = tokio::spawn(run_capture(rx, CaptureWriter::new(Vec::new()), Duration::from_millis(5)));

        rec.record(1, Message::UdpCanSend);
        rec.record(2, Message::TcpReceive(vec![7; 10]));
        drop(rec);

        let writer = task.await.unwrap().unwrap();
        let (frames, err) = decode_frames(&writer.into_inner());
        assert!(err.is_none());
        let ids: Vec<_> = frames.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (rec, _rx) = Recorder::channel(1);
        rec.record(1, Message::TcpCanSend);
        rec.record(1, Message::TcpCanSend);
        rec.record(1, Message::TcpCanSend);
        assert_eq!(rec.dropped(), 2);
    }

    #[test]
    fn events_after_writer_exit_are_counted() {
        let (rec, rx) = Recorder::channel(4);
        drop(rx);
        rec.record(1, Message::TcpCanSend);
        rec.record(2, Message::UdpCanSend);
        assert_eq!(rec.dropped(), 2);
        assert!(rec.closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn oversized_event_does_not_stop_capture() {
        let (rec, rx) = Recorder::channel(16);
        let task = tokio::spawn(run_capture(rx, CaptureWriter::new(Vec::new()), Duration::from_millis(5)));

        rec.record(1, Message::TcpReceive(vec![0; 200_000]));
        rec.record(2, Message::TcpCanSend);
        drop(rec);

        let writer = task.await.unwrap().unwrap();
        assert_eq!(writer.frames(), 1);
        let (frames, err) = decode_frames(&writer.into_inner());
        assert!(err.is_none());
        assert_eq!(frames[0].id, 2);
    }
}
