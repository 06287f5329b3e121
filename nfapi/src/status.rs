// src/status.rs

//! Return codes of the exported entry points and the crate-wide error type.

use thiserror::Error;

/// `NF_STATUS` as returned by `nfapi.dll`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfStatus {
    Success = 0,
    Fail = -1,
    InvalidEndpointId = -2,
    NotInitialized = -3,
    IoError = -4,
}

impl NfStatus {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(NfStatus::Success),
            -1 => Some(NfStatus::Fail),
            -2 => Some(NfStatus::InvalidEndpointId),
            -3 => Some(NfStatus::NotInitialized),
            -4 => Some(NfStatus::IoError),
            _ => None,
        }
    }
}

/// All the ways a call into the filtering API can go wrong
#[derive(Debug, Error)]
pub enum NfError {
    #[error("driver call failed")]
    Fail,

    #[error("invalid endpoint id")]
    InvalidEndpointId,

    #[error("filtering is not initialized")]
    NotInitialized,

    #[error("driver I/O error")]
    IoError,

    #[error("unknown status code {0}")]
    UnknownStatus(i32),

    #[error("an event handler is already installed")]
    AlreadyInitialized,

    #[error("cannot load {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{library} does not export {symbol}")]
    MissingSymbol {
        library: String,
        symbol: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{call} failed: {source}")]
    Os {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed driver data: {0}")]
    Decode(#[from] nfdriver::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, NfError>;

/// Map a raw `NF_STATUS` to `Ok(())` or the matching error.
pub fn nf_check(raw: i32) -> Result<()> {
    match NfStatus::from_raw(raw) {
        Some(NfStatus::Success) => Ok(()),
        Some(NfStatus::Fail) => Err(NfError::Fail),
        Some(NfStatus::InvalidEndpointId) => Err(NfError::InvalidEndpointId),
        Some(NfStatus::NotInitialized) => Err(NfError::NotInitialized),
        Some(NfStatus::IoError) => Err(NfError::IoError),
        None => Err(NfError::UnknownStatus(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_header() {
        assert_eq!(NfStatus::Success as i32, 0);
        assert_eq!(NfStatus::IoError as i32, -4);
        assert_eq!(NfStatus::from_raw(-2), Some(NfStatus::InvalidEndpointId));
        assert_eq!(NfStatus::from_raw(1), None);
    }

    #[test]
    fn check_maps_every_code() {
        assert!(nf_check(0).is_ok());
        assert!(matches!(nf_check(-1), Err(NfError::Fail)));
        assert!(matches!(nf_check(-2), Err(NfError::InvalidEndpointId)));
        assert!(matches!(nf_check(-3), Err(NfError::NotInitialized)));
        assert!(matches!(nf_check(-4), Err(NfError::IoError)));
        assert!(matches!(nf_check(-99), Err(NfError::UnknownStatus(-99))));
    }
}
