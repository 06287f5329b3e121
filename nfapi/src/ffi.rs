// src/ffi.rs

//! Argument conversion for the C entry points.

use std::ffi::{CString, c_int};

use crate::status::{NfError, Result};

/// Driver names cross the ABI as NUL-terminated strings.
pub fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| NfError::InvalidArgument(format!("{value:?} contains NUL")))
}

/// Buffer lengths cross the ABI as a C `int`.
pub fn c_len(len: usize) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| NfError::InvalidArgument(format!("{len} bytes exceed a C int")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_name_with_nul_is_rejected() {
        assert!(matches!(c_string("net\0filter"), Err(NfError::InvalidArgument(_))));
        assert_eq!(c_string("netfilter2").unwrap().as_bytes(), b"netfilter2");
    }

    #[test]
    fn length_limit_is_i32_max() {
        assert_eq!(c_len(0).unwrap(), 0);
        assert_eq!(c_len(i32::MAX as usize).unwrap(), i32::MAX);
        let err = c_len(i32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, NfError::InvalidArgument(ref m) if m.contains("2147483648")));
    }
}
