/// Size of the driver's per-connection TCP packet buffer.
pub const NF_TCP_PACKET_BUF_SIZE: usize = 8192;
/// Size of the driver's per-socket UDP packet buffer; also the envelope cap.
pub const NF_UDP_PACKET_BUF_SIZE: usize = 2 * 65536;

/// Room for a `sockaddr_in6`.
pub const NF_MAX_ADDRESS_LENGTH: usize = 28;
/// Room for an IPv6 address.
pub const NF_MAX_IP_ADDRESS_LENGTH: usize = 16;

pub const AF_INET: u16 = 2;
pub const AF_INET6: u16 = 23;

pub const IPPROTO_TCP: i32 = 6;
pub const IPPROTO_UDP: i32 = 17;

/// `code | id | bufferSize` prefix of `NF_DATA`.
pub const NF_DATA_HEADER_LEN: usize = 16;
/// `flags | optionsLength` prefix of `NF_UDP_OPTIONS`.
pub const NF_UDP_OPTIONS_HEADER_LEN: usize = 8;

/// Opaque id the driver assigns to a TCP connection or UDP socket.
pub type EndpointId = u64;

/// `sockaddr_in` / `sockaddr_in6` bytes as stored in connection structs.
pub type SockAddrBuf = [u8; NF_MAX_ADDRESS_LENGTH];
/// Raw IPv4 / IPv6 address bytes as stored in rules.
pub type IpAddrBuf = [u8; NF_MAX_IP_ADDRESS_LENGTH];
