//! Enumerations and flag sets of the driver ABI.

use bitflags::bitflags;

use crate::constants::{IPPROTO_TCP, IPPROTO_UDP};
use crate::error::DecodeError;

/// Kind of an `NF_DATA` envelope, in driver order.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCode {
    TcpConnected = 0,
    TcpClosed,
    TcpReceive,
    TcpSend,
    TcpCanReceive,
    TcpCanSend,
    TcpReqSuspend,
    TcpReqResume,

    UdpCreated,
    UdpClosed,
    UdpReceive,
    UdpSend,
    UdpCanReceive,
    UdpCanSend,
    UdpReqSuspend,
    UdpReqResume,

    ReqAddHeadRule,
    ReqAddTailRule,
    ReqDeleteRules,

    TcpConnectRequest,
    UdpConnectRequest,

    TcpDisableUserModeFiltering,
    UdpDisableUserModeFiltering,
}

impl DataCode {
    /// Indexed by discriminant.
    pub const ALL: [DataCode; 23] = [
        DataCode::TcpConnected,
        DataCode::TcpClosed,
        DataCode::TcpReceive,
        DataCode::TcpSend,
        DataCode::TcpCanReceive,
        DataCode::TcpCanSend,
        DataCode::TcpReqSuspend,
        DataCode::TcpReqResume,
        DataCode::UdpCreated,
        DataCode::UdpClosed,
        DataCode::UdpReceive,
        DataCode::UdpSend,
        DataCode::UdpCanReceive,
        DataCode::UdpCanSend,
        DataCode::UdpReqSuspend,
        DataCode::UdpReqResume,
        DataCode::ReqAddHeadRule,
        DataCode::ReqAddTailRule,
        DataCode::ReqDeleteRules,
        DataCode::TcpConnectRequest,
        DataCode::UdpConnectRequest,
        DataCode::TcpDisableUserModeFiltering,
        DataCode::UdpDisableUserModeFiltering,
    ];

    /// Header spelling, used by dump output.
    pub fn name(self) -> &'static str {
        match self {
            DataCode::TcpConnected => "NF_TCP_CONNECTED",
            DataCode::TcpClosed => "NF_TCP_CLOSED",
            DataCode::TcpReceive => "NF_TCP_RECEIVE",
            DataCode::TcpSend => "NF_TCP_SEND",
            DataCode::TcpCanReceive => "NF_TCP_CAN_RECEIVE",
            DataCode::TcpCanSend => "NF_TCP_CAN_SEND",
            DataCode::TcpReqSuspend => "NF_TCP_REQ_SUSPEND",
            DataCode::TcpReqResume => "NF_TCP_REQ_RESUME",
            DataCode::UdpCreated => "NF_UDP_CREATED",
            DataCode::UdpClosed => "NF_UDP_CLOSED",
            DataCode::UdpReceive => "NF_UDP_RECEIVE",
            DataCode::UdpSend => "NF_UDP_SEND",
            DataCode::UdpCanReceive => "NF_UDP_CAN_RECEIVE",
            DataCode::UdpCanSend => "NF_UDP_CAN_SEND",
            DataCode::UdpReqSuspend => "NF_UDP_REQ_SUSPEND",
            DataCode::UdpReqResume => "NF_UDP_REQ_RESUME",
            DataCode::ReqAddHeadRule => "NF_REQ_ADD_HEAD_RULE",
            DataCode::ReqAddTailRule => "NF_REQ_ADD_TAIL_RULE",
            DataCode::ReqDeleteRules => "NF_REQ_DELETE_RULES",
            DataCode::TcpConnectRequest => "NF_TCP_CONNECT_REQUEST",
            DataCode::UdpConnectRequest => "NF_UDP_CONNECT_REQUEST",
            DataCode::TcpDisableUserModeFiltering => "NF_TCP_DISABLE_USER_MODE_FILTERING",
            DataCode::UdpDisableUserModeFiltering => "NF_UDP_DISABLE_USER_MODE_FILTERING",
        }
    }
}

impl TryFrom<i32> for DataCode {
    type Error = DecodeError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        usize::try_from(raw)
            .ok()
            .and_then(|idx| Self::ALL.get(idx))
            .copied()
            .ok_or(DecodeError::UnknownCode(raw))
    }
}

/// Direction of a TCP connection or UDP packet.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    In = 1,
    Out = 2,
    #[default]
    Both = 3,
}

impl TryFrom<u8> for Direction {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Direction::In),
            2 => Ok(Direction::Out),
            3 => Ok(Direction::Both),
            other => Err(DecodeError::UnknownDirection(other)),
        }
    }
}

/// Transport protocol selector of a rule. `Any` matches both.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Any = 0,
    Tcp = IPPROTO_TCP,
    Udp = IPPROTO_UDP,
}

impl Protocol {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Protocol::Any),
            IPPROTO_TCP => Some(Protocol::Tcp),
            IPPROTO_UDP => Some(Protocol::Udp),
            _ => None,
        }
    }
}

bitflags! {
    /// What the driver does with matching traffic. The empty set is `ALLOW`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FilteringFlag: u32 {
        /// Block the activity.
        const BLOCK = 1;
        /// Indicate transmitted packets to user mode.
        const FILTER = 2;
        /// Suspend receives from server and sends from client.
        const SUSPENDED = 4;
        /// Emulate establishing a TCP connection with the remote server.
        const OFFLINE = 8;
        /// Indicate outgoing connect requests to the API.
        const INDICATE_CONNECT_REQUESTS = 16;
    }
}

impl FilteringFlag {
    /// Allow the activity without filtering transmitted packets.
    pub const ALLOW: Self = Self::empty();
}

bitflags! {
    /// TDI receive flags carried in `NF_UDP_OPTIONS.flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UdpFlags: u32 {
        const BROADCAST         = 0x0000_0004;
        const MULTICAST         = 0x0000_0008;
        const PARTIAL           = 0x0000_0010;
        const NORMAL            = 0x0000_0020;
        const EXPEDITED         = 0x0000_0040;
        const PEEK              = 0x0000_0080;
        const NO_RESPONSE_EXP   = 0x0000_0100;
        const COPY_LOOKAHEAD    = 0x0000_0200;
        const ENTIRE_MESSAGE    = 0x0000_0400;
        const AT_DISPATCH_LEVEL = 0x0000_0800;
        const CONTROL_INFO      = 0x0000_1000;
        const FORCE_INDICATION  = 0x0000_2000;
        const NO_PUSH           = 0x0000_4000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_codes_follow_driver_order() {
        for (idx, code) in DataCode::ALL.iter().enumerate() {
            assert_eq!(*code as i32, idx as i32, "{:?}", code);
            assert_eq!(DataCode::try_from(idx as i32), Ok(*code));
        }
        assert_eq!(DataCode::UdpDisableUserModeFiltering as i32, 22);
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(DataCode::try_from(23), Err(DecodeError::UnknownCode(23)));
        assert_eq!(DataCode::try_from(-1), Err(DecodeError::UnknownCode(-1)));
    }

    #[test]
    fn direction_values() {
        assert_eq!(Direction::try_from(2), Ok(Direction::Out));
        assert_eq!(Direction::try_from(0), Err(DecodeError::UnknownDirection(0)));
        assert_eq!(Direction::default() as u8, 3);
    }

    #[test]
    fn filtering_flags_keep_unknown_bits() {
        let flags = FilteringFlag::from_bits_retain(0x102);
        assert!(flags.contains(FilteringFlag::FILTER));
        assert_eq!(flags.bits(), 0x102);
        assert!(FilteringFlag::ALLOW.is_empty());
    }

    #[test]
    fn protocol_from_raw() {
        assert_eq!(Protocol::from_raw(6), Some(Protocol::Tcp));
        assert_eq!(Protocol::from_raw(17), Some(Protocol::Udp));
        assert_eq!(Protocol::from_raw(1), None);
    }
}
