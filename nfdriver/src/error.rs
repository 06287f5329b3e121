use thiserror::Error;

use crate::flags::DataCode;

/// Everything that can go wrong while decoding driver bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        need: usize,
        have: usize,
    },

    #[error("unknown data code {0}")]
    UnknownCode(i32),

    #[error("unknown direction {0}")]
    UnknownDirection(u8),

    #[error("buffer of {0} bytes exceeds the driver limit")]
    BufferTooLarge(usize),

    #[error("{code:?} carries {len} unexpected payload byte(s)")]
    UnexpectedPayload { code: DataCode, len: usize },

    #[error("invalid UDP options length {0}")]
    OptionsLength(i32),
}
