// src/capture.rs

//! Capture files: a stream of length-prefixed frames, one per observed event.
//!
//! ```text
//! u32 LE  frame length (bytes after this field)
//! i64 LE  capture time, microseconds since the Unix epoch
//! ...     one NF_DATA envelope
//! ```

use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use nfdriver::{
    DecodeError, EndpointId, Envelope, Message, NF_DATA_HEADER_LEN, NF_UDP_PACKET_BUF_SIZE,
};
use thiserror::Error;

const TIMESTAMP_LEN: usize = 8;
const MIN_FRAME_LEN: usize = TIMESTAMP_LEN + NF_DATA_HEADER_LEN;
/// Largest frame a well-formed writer produces.
pub const MAX_FRAME_LEN: usize = MIN_FRAME_LEN + NF_UDP_PACKET_BUF_SIZE;

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub captured_at: DateTime<Utc>,
    pub id: EndpointId,
    pub message: Message,
}

impl Frame {
    pub fn now(id: EndpointId, message: Message) -> Self {
        Self { captured_at: Utc::now(), id, message }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt frame length {len} at offset {offset}")]
    CorruptLength { len: u32, offset: u64 },

    #[error("truncated frame at offset {offset}")]
    Truncated { offset: u64 },

    #[error("bad envelope at offset {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: DecodeError,
    },

    #[error("frame at offset {offset} has {extra} bytes after its envelope")]
    TrailingBytes { offset: u64, extra: usize },

    #[error("timestamp {0} is out of range")]
    Timestamp(i64),

    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    Oversized { len: usize, max: usize },
}

/*──────────────────────────────── writer ─────────────────────────────────*/

pub struct CaptureWriter<W: Write> {
    inner: W,
    frames: u64,
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, frames: 0 }
    }

    /// Append one frame. A frame the reader would reject is refused and
    /// nothing is written.
    pub fn write_frame(&mut self, frame: Frame) -> Result<(), CaptureError> {
        let envelope = frame.message.into_envelope(frame.id);
        let len = TIMESTAMP_LEN + envelope.encoded_len();
        if len > MAX_FRAME_LEN {
            return Err(CaptureError::Oversized { len, max: MAX_FRAME_LEN });
        }
        let mut buf = Vec::with_capacity(4 + len);
        buf.extend_from_slice(&(len as u32).to_le_bytes());
        buf.extend_from_slice(&frame.captured_at.timestamp_micros().to_le_bytes());
        envelope.encode_into(&mut buf);
        self.inner.write_all(&buf)?;
        self.frames += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/*──────────────────────────────── reader ─────────────────────────────────*/

/// Iterates the frames of a capture. Stops after the first error.
pub struct CaptureReader<R: Read> {
    inner: R,
    offset: u64,
    failed: bool,
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0, failed: false }
    }

    /// Byte offset of the next frame.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let start = self.offset;
        let mut len_buf = [0u8; 4];
        match fill(&mut self.inner, &mut len_buf)? {
            0 => return Ok(None),
            4 => {}
            _ => return Err(CaptureError::Truncated { offset: start }),
        }

        let len = u32::from_le_bytes(len_buf);
        let body_len = len as usize;
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&body_len) {
            return Err(CaptureError::CorruptLength { len, offset: start });
        }

        let mut body = vec![0u8; body_len];
        if fill(&mut self.inner, &mut body)? != body_len {
            return Err(CaptureError::Truncated { offset: start });
        }

        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(&body[..TIMESTAMP_LEN]);
        let micros = i64::from_le_bytes(ts);
        let captured_at =
            DateTime::from_timestamp_micros(micros).ok_or(CaptureError::Timestamp(micros))?;

        let decode = |source| CaptureError::Decode { offset: start, source };
        let (envelope, used) = Envelope::decode(&body[TIMESTAMP_LEN..]).map_err(decode)?;
        let extra = body_len - TIMESTAMP_LEN - used;
        if extra != 0 {
            return Err(CaptureError::TrailingBytes { offset: start, extra });
        }
        let message = Message::from_envelope(&envelope).map_err(decode)?;

        self.offset += 4 + u64::from(len);
        Ok(Some(Frame { captured_at, id: envelope.id, message }))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<Frame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_frame() {
            Ok(frame) => frame.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode every complete frame in `raw`. The error, if any, describes where
/// decoding stopped.
pub fn decode_frames(raw: &[u8]) -> (Vec<Frame>, Option<CaptureError>) {
    let mut frames = Vec::new();
    for item in CaptureReader::new(raw) {
        match item {
            Ok(frame) => frames.push(frame),
            Err(e) => return (frames, Some(e)),
        }
    }
    (frames, None)
}

/// Read until `buf` is full or EOF; returns the bytes read.
fn fill<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(micros: i64) -> DateTime<Utc> {
        Utc.timestamp_micros(micros).unwrap()
    }

    fn sample() -> Vec<u8> {
        let mut w = CaptureWriter::new(Vec::new());
        w.write_frame(Frame { captured_at: at(1_000_001), id: 3, message: Message::TcpCanSend })
            .unwrap();
        w.write_frame(Frame {
            captured_at: at(2_000_002),
            id: 3,
            message: Message::TcpSend(b"GET / HTTP/1.1\r\n".to_vec()),
        })
        .unwrap();
        assert_eq!(w.frames(), 2);
        w.into_inner()
    }

    #[test]
    fn frame_layout() {
        let raw = sample();
        // length covers timestamp + 16-byte envelope header + empty payload
        assert_eq!(&raw[..4], &24u32.to_le_bytes());
        assert_eq!(&raw[4..12], &1_000_001i64.to_le_bytes());
        assert_eq!(&raw[12..16], &(nfdriver::DataCode::TcpCanSend as i32).to_le_bytes());
    }

    #[test]
    fn reads_back_in_order() {
        let (frames, err) = decode_frames(&sample());
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].captured_at, at(1_000_001));
        assert_eq!(frames[1].message, Message::TcpSend(b"GET / HTTP/1.1\r\n".to_vec()));
    }

    #[test]
    fn truncated_tail_is_reported() {
        let raw = sample();
        let (frames, err) = decode_frames(&raw[..raw.len() - 3]);
        assert_eq!(frames.len(), 1);
        assert!(matches!(err, Some(CaptureError::Truncated { offset: 28 })));
    }

    #[test]
    fn oversized_frame_is_refused_and_stream_stays_readable() {
        let mut w = CaptureWriter::new(Vec::new());
        let big = Frame { captured_at: at(1), id: 9, message: Message::TcpReceive(vec![0; 200_000]) };
        assert!(matches!(
            w.write_frame(big),
            Err(CaptureError::Oversized { len: 200_024, max: MAX_FRAME_LEN })
        ));
        assert_eq!(w.frames(), 0);

        w.write_frame(Frame { captured_at: at(2), id: 9, message: Message::TcpCanSend }).unwrap();
        let (frames, err) = decode_frames(&w.into_inner());
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message, Message::TcpCanSend);
    }

    #[test]
    fn largest_frame_is_accepted() {
        let mut w = CaptureWriter::new(Vec::new());
        let payload = vec![0x5a; NF_UDP_PACKET_BUF_SIZE];
        w.write_frame(Frame { captured_at: at(3), id: 1, message: Message::TcpSend(payload.clone()) })
            .unwrap();
        let (frames, err) = decode_frames(&w.into_inner());
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(frames[0].message, Message::TcpSend(payload));
    }

    #[test]
    fn corrupt_length_stops_reader() {
        let mut raw = sample();
        raw[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = CaptureReader::new(raw.as_slice());
        assert!(matches!(reader.next(), Some(Err(CaptureError::CorruptLength { .. }))));
        assert!(reader.next().is_none());
    }
}
