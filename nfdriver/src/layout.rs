//! Packed structures exchanged with the driver.
//!
//! The `#[repr(C, packed)]` definitions match the driver's 1-byte aligned
//! layout, so a pointer received from `nfapi.dll` can be borrowed as one of
//! these types directly. For bytes that travel inside an `NF_DATA` envelope,
//! [`WireFormat`] reads and writes fields explicitly instead of reinterpreting
//! memory.
//!
//! Never take a reference to a field of a packed struct: copy it out first
//! (the accessors below do exactly that).

use alloc::vec::Vec;
use core::mem::size_of;
use core::net::{IpAddr, SocketAddr};

use crate::addr::{decode_ip, decode_sockaddr, encode_sockaddr};
use crate::constants::{
    IpAddrBuf, NF_DATA_HEADER_LEN, NF_UDP_OPTIONS_HEADER_LEN, SockAddrBuf,
};
use crate::error::DecodeError;
use crate::flags::{Direction, FilteringFlag, Protocol, UdpFlags};

/*──────────────────────────── codec plumbing ─────────────────────────────*/

/// Fixed-size little-endian encoding of a packed structure.
pub trait WireFormat: Sized {
    /// Exact number of bytes on the wire.
    const WIRE_SIZE: usize;
    /// Name used in truncation errors.
    const WHAT: &'static str;

    fn encode_into(&self, out: &mut Vec<u8>);

    fn read(r: &mut Reader<'_>) -> Self;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_SIZE);
        self.encode_into(&mut out);
        out
    }

    /// Decode from the front of `buf`; trailing bytes are left untouched.
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(DecodeError::Truncated {
                what: Self::WHAT,
                need: Self::WIRE_SIZE,
                have: buf.len(),
            });
        }
        let mut r = Reader::new(&buf[..Self::WIRE_SIZE]);
        Ok(Self::read(&mut r))
    }
}

/// Cursor over a slice whose length was validated up front.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.array::<1>()[0]
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    pub fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }

    pub fn bytes<const N: usize>(&mut self) -> [u8; N] {
        self.array()
    }
}

/*──────────────────────────────── NF_RULE ────────────────────────────────*/

/// Filtering rule matched by the driver. Zero fields mean "any".
///
/// Ports are kept in network byte order, like the SDK samples fill them.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfRule {
    pub protocol: i32,
    pub process_id: u32,
    pub direction: u8,
    pub local_port: u16,
    pub remote_port: u16,
    pub ip_family: u16,
    pub local_ip_address: IpAddrBuf,
    pub local_ip_address_mask: IpAddrBuf,
    pub remote_ip_address: IpAddrBuf,
    pub remote_ip_address_mask: IpAddrBuf,
    pub filtering_flag: u32,
}

impl NfRule {
    pub fn protocol(&self) -> Option<Protocol> {
        Protocol::from_raw(self.protocol)
    }

    /// `None` when the direction byte is zero or unknown.
    pub fn direction(&self) -> Option<Direction> {
        Direction::try_from(self.direction).ok()
    }

    /// Host-order local port.
    pub fn local_port(&self) -> u16 {
        u16::from_be(self.local_port)
    }

    /// Host-order remote port.
    pub fn remote_port(&self) -> u16 {
        u16::from_be(self.remote_port)
    }

    pub fn local_ip(&self) -> Option<IpAddr> {
        let buf = self.local_ip_address;
        decode_ip(self.ip_family, &buf)
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        let buf = self.remote_ip_address;
        decode_ip(self.ip_family, &buf)
    }

    pub fn filtering_flag(&self) -> FilteringFlag {
        FilteringFlag::from_bits_retain(self.filtering_flag)
    }
}

impl WireFormat for NfRule {
    const WIRE_SIZE: usize = 83;
    const WHAT: &'static str = "NF_RULE";

    fn encode_into(&self, out: &mut Vec<u8>) {
        let r = *self;
        out.extend_from_slice(&{ r.protocol }.to_le_bytes());
        out.extend_from_slice(&{ r.process_id }.to_le_bytes());
        out.push(r.direction);
        out.extend_from_slice(&{ r.local_port }.to_le_bytes());
        out.extend_from_slice(&{ r.remote_port }.to_le_bytes());
        out.extend_from_slice(&{ r.ip_family }.to_le_bytes());
        out.extend_from_slice(&r.local_ip_address);
        out.extend_from_slice(&r.local_ip_address_mask);
        out.extend_from_slice(&r.remote_ip_address);
        out.extend_from_slice(&r.remote_ip_address_mask);
        out.extend_from_slice(&{ r.filtering_flag }.to_le_bytes());
    }

    fn read(r: &mut Reader<'_>) -> Self {
        NfRule {
            protocol: r.i32(),
            process_id: r.u32(),
            direction: r.u8(),
            local_port: r.u16(),
            remote_port: r.u16(),
            ip_family: r.u16(),
            local_ip_address: r.bytes(),
            local_ip_address_mask: r.bytes(),
            remote_ip_address: r.bytes(),
            remote_ip_address_mask: r.bytes(),
            filtering_flag: r.u32(),
        }
    }
}

/*─────────────────────────── NF_TCP_CONN_INFO ────────────────────────────*/

/// TCP connection properties handed to callbacks.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfTcpConnInfo {
    pub filtering_flag: u32,
    pub process_id: u32,
    pub direction: u8,
    pub ip_family: u16,
    pub local_address: SockAddrBuf,
    pub remote_address: SockAddrBuf,
}

impl NfTcpConnInfo {
    pub fn filtering_flag(&self) -> FilteringFlag {
        FilteringFlag::from_bits_retain(self.filtering_flag)
    }

    /// Takes effect when changed inside a connect-request callback.
    pub fn set_filtering_flag(&mut self, flag: FilteringFlag) {
        self.filtering_flag = flag.bits();
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::try_from(self.direction).ok()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        let buf = self.local_address;
        decode_sockaddr(&buf)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        let buf = self.remote_address;
        decode_sockaddr(&buf)
    }

    /// Redirects the connection when changed inside a connect-request callback.
    pub fn set_remote_addr(&mut self, addr: &SocketAddr) {
        self.remote_address = encode_sockaddr(addr);
    }
}

impl WireFormat for NfTcpConnInfo {
    const WIRE_SIZE: usize = 67;
    const WHAT: &'static str = "NF_TCP_CONN_INFO";

    fn encode_into(&self, out: &mut Vec<u8>) {
        let c = *self;
        out.extend_from_slice(&{ c.filtering_flag }.to_le_bytes());
        out.extend_from_slice(&{ c.process_id }.to_le_bytes());
        out.push(c.direction);
        out.extend_from_slice(&{ c.ip_family }.to_le_bytes());
        out.extend_from_slice(&c.local_address);
        out.extend_from_slice(&c.remote_address);
    }

    fn read(r: &mut Reader<'_>) -> Self {
        NfTcpConnInfo {
            filtering_flag: r.u32(),
            process_id: r.u32(),
            direction: r.u8(),
            ip_family: r.u16(),
            local_address: r.bytes(),
            remote_address: r.bytes(),
        }
    }
}

/*─────────────────────────── NF_UDP_CONN_INFO ────────────────────────────*/

/// UDP socket properties.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfUdpConnInfo {
    pub process_id: u32,
    pub ip_family: u16,
    pub local_address: SockAddrBuf,
}

impl NfUdpConnInfo {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let buf = self.local_address;
        decode_sockaddr(&buf)
    }
}

impl WireFormat for NfUdpConnInfo {
    const WIRE_SIZE: usize = 34;
    const WHAT: &'static str = "NF_UDP_CONN_INFO";

    fn encode_into(&self, out: &mut Vec<u8>) {
        let c = *self;
        out.extend_from_slice(&{ c.process_id }.to_le_bytes());
        out.extend_from_slice(&{ c.ip_family }.to_le_bytes());
        out.extend_from_slice(&c.local_address);
    }

    fn read(r: &mut Reader<'_>) -> Self {
        NfUdpConnInfo {
            process_id: r.u32(),
            ip_family: r.u16(),
            local_address: r.bytes(),
        }
    }
}

/*────────────────────────── NF_UDP_CONN_REQUEST ──────────────────────────*/

/// Outgoing UDP `TDI_CONNECT` request.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfUdpConnRequest {
    pub filtering_flag: u32,
    pub process_id: u32,
    pub ip_family: u16,
    pub local_address: SockAddrBuf,
    pub remote_address: SockAddrBuf,
}

impl NfUdpConnRequest {
    pub fn filtering_flag(&self) -> FilteringFlag {
        FilteringFlag::from_bits_retain(self.filtering_flag)
    }

    pub fn set_filtering_flag(&mut self, flag: FilteringFlag) {
        self.filtering_flag = flag.bits();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        let buf = self.local_address;
        decode_sockaddr(&buf)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        let buf = self.remote_address;
        decode_sockaddr(&buf)
    }

    pub fn set_remote_addr(&mut self, addr: &SocketAddr) {
        self.remote_address = encode_sockaddr(addr);
    }
}

impl WireFormat for NfUdpConnRequest {
    const WIRE_SIZE: usize = 66;
    const WHAT: &'static str = "NF_UDP_CONN_REQUEST";

    fn encode_into(&self, out: &mut Vec<u8>) {
        let c = *self;
        out.extend_from_slice(&{ c.filtering_flag }.to_le_bytes());
        out.extend_from_slice(&{ c.process_id }.to_le_bytes());
        out.extend_from_slice(&{ c.ip_family }.to_le_bytes());
        out.extend_from_slice(&c.local_address);
        out.extend_from_slice(&c.remote_address);
    }

    fn read(r: &mut Reader<'_>) -> Self {
        NfUdpConnRequest {
            filtering_flag: r.u32(),
            process_id: r.u32(),
            ip_family: r.u16(),
            local_address: r.bytes(),
            remote_address: r.bytes(),
        }
    }
}

/*──────────────────────────── NF_UDP_OPTIONS ─────────────────────────────*/

/// Fixed prefix of `NF_UDP_OPTIONS`; `options_length` option bytes follow.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfUdpOptionsHeader {
    pub flags: u32,
    pub options_length: i32,
}

impl WireFormat for NfUdpOptionsHeader {
    const WIRE_SIZE: usize = NF_UDP_OPTIONS_HEADER_LEN;
    const WHAT: &'static str = "NF_UDP_OPTIONS";

    fn encode_into(&self, out: &mut Vec<u8>) {
        let h = *self;
        out.extend_from_slice(&{ h.flags }.to_le_bytes());
        out.extend_from_slice(&{ h.options_length }.to_le_bytes());
    }

    fn read(r: &mut Reader<'_>) -> Self {
        NfUdpOptionsHeader {
            flags: r.u32(),
            options_length: r.i32(),
        }
    }
}

/// Owned per-datagram TDI flags and ancillary option bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UdpOptions {
    pub flags: UdpFlags,
    pub options: Vec<u8>,
}

impl UdpOptions {
    pub fn new(flags: UdpFlags, options: Vec<u8>) -> Self {
        Self { flags, options }
    }

    pub fn encoded_len(&self) -> usize {
        NF_UDP_OPTIONS_HEADER_LEN + self.options.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        NfUdpOptionsHeader {
            flags: self.flags.bits(),
            options_length: self.options.len() as i32,
        }
        .encode_into(out);
        out.extend_from_slice(&self.options);
    }

    /// Buffer usable as a `PNF_UDP_OPTIONS` argument. The C struct declares
    /// `options[1]`, so it is never shorter than nine bytes.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len().max(size_of::<NfUdpOptionsHeader>() + 1));
        self.encode_into(&mut out);
        if out.len() <= NF_UDP_OPTIONS_HEADER_LEN {
            out.push(0);
        }
        out
    }

    /// Decode from the front of `buf`, returning the bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let header = NfUdpOptionsHeader::decode(buf)?;
        let len = header.options_length;
        let n = usize::try_from(len).map_err(|_| DecodeError::OptionsLength(len))?;
        let rest = &buf[NF_UDP_OPTIONS_HEADER_LEN..];
        if n > rest.len() {
            return Err(DecodeError::OptionsLength(len));
        }
        let opts = UdpOptions {
            flags: UdpFlags::from_bits_retain(header.flags),
            options: rest[..n].to_vec(),
        };
        Ok((opts, NF_UDP_OPTIONS_HEADER_LEN + n))
    }
}

/*──────────────────────────────── NF_DATA ────────────────────────────────*/

/// Fixed prefix of the `NF_DATA` IPC envelope; `buffer_size` bytes follow.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfDataHeader {
    pub code: i32,
    pub id: u64,
    pub buffer_size: u32,
}

impl WireFormat for NfDataHeader {
    const WIRE_SIZE: usize = NF_DATA_HEADER_LEN;
    const WHAT: &'static str = "NF_DATA";

    fn encode_into(&self, out: &mut Vec<u8>) {
        let h = *self;
        out.extend_from_slice(&{ h.code }.to_le_bytes());
        out.extend_from_slice(&{ h.id }.to_le_bytes());
        out.extend_from_slice(&{ h.buffer_size }.to_le_bytes());
    }

    fn read(r: &mut Reader<'_>) -> Self {
        NfDataHeader {
            code: r.i32(),
            id: r.u64(),
            buffer_size: r.u32(),
        }
    }
}

// The in-memory layout must match the byte codec.
const _: () = assert!(size_of::<NfRule>() == NfRule::WIRE_SIZE);
const _: () = assert!(size_of::<NfTcpConnInfo>() == NfTcpConnInfo::WIRE_SIZE);
const _: () = assert!(size_of::<NfUdpConnInfo>() == NfUdpConnInfo::WIRE_SIZE);
const _: () = assert!(size_of::<NfUdpConnRequest>() == NfUdpConnRequest::WIRE_SIZE);
const _: () = assert!(size_of::<NfUdpOptionsHeader>() == NfUdpOptionsHeader::WIRE_SIZE);
const _: () = assert!(size_of::<NfDataHeader>() == NfDataHeader::WIRE_SIZE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::encode_sockaddr;
    use crate::constants::{AF_INET, IPPROTO_TCP};

    fn sample_tcp() -> NfTcpConnInfo {
        NfTcpConnInfo {
            filtering_flag: FilteringFlag::FILTER.bits(),
            process_id: 4242,
            direction: Direction::Out as u8,
            ip_family: AF_INET,
            local_address: encode_sockaddr(&"10.0.0.2:50000".parse().unwrap()),
            remote_address: encode_sockaddr(&"93.184.216.34:80".parse().unwrap()),
        }
    }

    #[test]
    fn tcp_conn_info_byte_layout() {
        let bytes = sample_tcp().to_bytes();
        assert_eq!(bytes.len(), 67);
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &4242u32.to_le_bytes());
        assert_eq!(bytes[8], 2);
        assert_eq!(&bytes[9..11], &AF_INET.to_le_bytes());
        // remote port 80, big-endian, inside the second sockaddr
        assert_eq!(&bytes[39 + 2..39 + 4], &[0, 80]);
    }

    #[test]
    fn tcp_conn_info_accessors() {
        let mut info = NfTcpConnInfo::decode(&sample_tcp().to_bytes()).unwrap();
        assert_eq!(info.direction(), Some(Direction::Out));
        assert_eq!(info.remote_addr(), Some("93.184.216.34:80".parse().unwrap()));

        info.set_filtering_flag(FilteringFlag::BLOCK);
        info.set_remote_addr(&"127.0.0.1:8080".parse().unwrap());
        assert_eq!(info.filtering_flag(), FilteringFlag::BLOCK);
        assert_eq!(info.remote_addr(), Some("127.0.0.1:8080".parse().unwrap()));
    }

    #[test]
    fn rule_offsets() {
        let rule = NfRule {
            protocol: IPPROTO_TCP,
            direction: Direction::Out as u8,
            remote_port: 443u16.to_be(),
            filtering_flag: FilteringFlag::FILTER.bits(),
            ..Default::default()
        };
        let bytes = rule.to_bytes();
        assert_eq!(bytes.len(), 83);
        assert_eq!(&bytes[11..13], &[0x01, 0xbb]);
        assert_eq!(&bytes[79..83], &2u32.to_le_bytes());
        assert_eq!(NfRule::decode(&bytes).unwrap().remote_port(), 443);
    }

    #[test]
    fn short_buffers_are_truncated_errors() {
        let err = NfUdpConnInfo::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated { what: "NF_UDP_CONN_INFO", need: 34, have: 10 }
        );
    }

    #[test]
    fn udp_options_length_checks() {
        let opts = UdpOptions::new(UdpFlags::BROADCAST, vec![1, 2, 3]);
        let mut bytes = Vec::new();
        opts.encode_into(&mut bytes);
        bytes.extend_from_slice(b"payload");
        let (back, used) = UdpOptions::decode(&bytes).unwrap();
        assert_eq!(back, opts);
        assert_eq!(used, 11);

        let mut bad = NfUdpOptionsHeader { flags: 0, options_length: -1 }.to_bytes();
        assert_eq!(UdpOptions::decode(&bad).unwrap_err(), DecodeError::OptionsLength(-1));
        bad = NfUdpOptionsHeader { flags: 0, options_length: 4 }.to_bytes();
        assert_eq!(UdpOptions::decode(&bad).unwrap_err(), DecodeError::OptionsLength(4));
    }

    #[test]
    fn raw_udp_options_never_shorter_than_c_struct() {
        assert_eq!(UdpOptions::default().to_raw().len(), 9);
        assert_eq!(UdpOptions::new(UdpFlags::empty(), vec![9; 4]).to_raw().len(), 12);
    }
}
