//! `sockaddr` and raw IP helpers.
//!
//! Connection structs carry a `sockaddr_in` (family, port, addr, zero[8]) or a
//! `sockaddr_in6` (family, port, flowinfo, addr[16], scope_id) in a 28-byte
//! field. Family and the 32-bit fields use host (little-endian) order, the port
//! is big-endian. Rules carry bare addresses and masks in 16-byte fields.

use core::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::constants::{AF_INET, AF_INET6, IpAddrBuf, SockAddrBuf};

/// Address family value the driver expects for `ip`.
pub fn family_of(ip: &IpAddr) -> u16 {
    match ip {
        IpAddr::V4(_) => AF_INET,
        IpAddr::V6(_) => AF_INET6,
    }
}

/// Serialise `addr` the way Winsock lays out `sockaddr_in` / `sockaddr_in6`.
pub fn encode_sockaddr(addr: &SocketAddr) -> SockAddrBuf {
    let mut buf = [0u8; 28];
    match addr {
        SocketAddr::V4(a) => {
            buf[0..2].copy_from_slice(&AF_INET.to_le_bytes());
            buf[2..4].copy_from_slice(&a.port().to_be_bytes());
            buf[4..8].copy_from_slice(&a.ip().octets());
        }
        SocketAddr::V6(a) => {
            buf[0..2].copy_from_slice(&AF_INET6.to_le_bytes());
            buf[2..4].copy_from_slice(&a.port().to_be_bytes());
            buf[4..8].copy_from_slice(&a.flowinfo().to_le_bytes());
            buf[8..24].copy_from_slice(&a.ip().octets());
            buf[24..28].copy_from_slice(&a.scope_id().to_le_bytes());
        }
    }
    buf
}

/// Parse a 28-byte address field. `None` for zeroed or foreign families.
pub fn decode_sockaddr(buf: &SockAddrBuf) -> Option<SocketAddr> {
    let family = u16::from_le_bytes([buf[0], buf[1]]);
    let port = u16::from_be_bytes([buf[2], buf[3]]);
    match family {
        AF_INET => {
            let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);
            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        AF_INET6 => {
            let flowinfo = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[8..24]);
            let scope_id = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                flowinfo,
                scope_id,
            )))
        }
        _ => None,
    }
}

/// Bare address bytes; IPv4 occupies the first four bytes.
pub fn encode_ip(ip: &IpAddr) -> IpAddrBuf {
    let mut buf = [0u8; 16];
    match ip {
        IpAddr::V4(v4) => buf[..4].copy_from_slice(&v4.octets()),
        IpAddr::V6(v6) => buf.copy_from_slice(&v6.octets()),
    }
    buf
}

/// Inverse of [`encode_ip`] for a known family.
pub fn decode_ip(family: u16, buf: &IpAddrBuf) -> Option<IpAddr> {
    match family {
        AF_INET => Some(IpAddr::V4(Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]))),
        AF_INET6 => Some(IpAddr::V6(Ipv6Addr::from(*buf))),
        _ => None,
    }
}

/// Network mask with `prefix` leading one bits, laid out like [`encode_ip`].
pub fn prefix_mask(family: u16, prefix: u8) -> Option<IpAddrBuf> {
    let width = match family {
        AF_INET => 32,
        AF_INET6 => 128,
        _ => return None,
    };
    if prefix > width {
        return None;
    }
    let mut mask = [0u8; 16];
    let full = usize::from(prefix / 8);
    mask[..full].fill(0xff);
    let rest = prefix % 8;
    if rest != 0 {
        mask[full] = 0xffu8 << (8 - rest);
    }
    Some(mask)
}

/// Byte-wise AND of an address and a mask.
pub fn apply_mask(addr: &IpAddrBuf, mask: &IpAddrBuf) -> IpAddrBuf {
    let mut out = [0u8; 16];
    for (o, (a, m)) in out.iter_mut().zip(addr.iter().zip(mask.iter())) {
        *o = a & m;
    }
    out
}
