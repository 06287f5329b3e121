//! Wire layout shared between the NetFilter TDI hooking driver and user mode.
//!
//! Everything in here mirrors the packed (1-byte aligned) structures the
//! driver and `nfapi.dll` exchange, plus a safe byte codec for the `NF_DATA`
//! envelope. Builds without `std` when the `kernel` feature is selected.
#![cfg_attr(feature = "kernel", no_std)]

extern crate alloc; // Vec for variable-length payloads

pub mod addr;
pub mod constants;
pub mod error;
pub mod flags;
pub mod layout;
pub mod message;

pub use constants::*;
pub use error::DecodeError;
pub use flags::{DataCode, Direction, FilteringFlag, Protocol, UdpFlags};
pub use layout::{
    NfDataHeader, NfRule, NfTcpConnInfo, NfUdpConnInfo, NfUdpConnRequest, NfUdpOptionsHeader,
    UdpOptions, WireFormat,
};
pub use message::{Envelope, Message, UdpDatagram};
