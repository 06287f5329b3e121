//! `NF_DATA` envelope codec and the typed payload of every data code.
//!
//! Envelope bytes: `code:i32 | id:u64 | buffer_size:u32 | buffer`.
//!
//! Buffer layout per code:
//!
//! | code | buffer |
//! |---|---|
//! | TCP connected / closed / connect request | `NF_TCP_CONN_INFO` |
//! | TCP receive / send | payload bytes |
//! | UDP created / closed | `NF_UDP_CONN_INFO` |
//! | UDP connect request | `NF_UDP_CONN_REQUEST` |
//! | UDP receive / send | `remote sockaddr[28] \| NF_UDP_OPTIONS \| payload` |
//! | add head / tail rule | `NF_RULE` |
//! | everything else | empty |

use alloc::vec::Vec;

use crate::constants::{
    EndpointId, NF_DATA_HEADER_LEN, NF_MAX_ADDRESS_LENGTH, NF_TCP_PACKET_BUF_SIZE,
    NF_UDP_PACKET_BUF_SIZE, SockAddrBuf,
};
use crate::error::DecodeError;
use crate::flags::DataCode;
use crate::layout::{
    NfDataHeader, NfRule, NfTcpConnInfo, NfUdpConnInfo, NfUdpConnRequest, UdpOptions, WireFormat,
};

/// One `NF_DATA` message with an untyped buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub code: DataCode,
    pub id: EndpointId,
    pub buffer: Vec<u8>,
}

impl Envelope {
    pub fn new(code: DataCode, id: EndpointId, buffer: Vec<u8>) -> Self {
        Self { code, id, buffer }
    }

    pub fn encoded_len(&self) -> usize {
        NF_DATA_HEADER_LEN + self.buffer.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        NfDataHeader {
            code: self.code as i32,
            id: self.id,
            buffer_size: self.buffer.len() as u32,
        }
        .encode_into(out);
        out.extend_from_slice(&self.buffer);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decode one envelope from the front of `buf`, returning the bytes consumed
    /// so back-to-back envelopes can be walked.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let header = NfDataHeader::decode(buf)?;
        let code = DataCode::try_from(header.code)?;
        let size = header.buffer_size as usize;
        if size > NF_UDP_PACKET_BUF_SIZE {
            return Err(DecodeError::BufferTooLarge(size));
        }
        let body = &buf[NF_DATA_HEADER_LEN..];
        if body.len() < size {
            return Err(DecodeError::Truncated {
                what: "NF_DATA buffer",
                need: size,
                have: body.len(),
            });
        }
        let env = Envelope {
            code,
            id: header.id,
            buffer: body[..size].to_vec(),
        };
        Ok((env, NF_DATA_HEADER_LEN + size))
    }
}

/// UDP datagram with its addressing and ancillary data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub remote_address: SockAddrBuf,
    pub options: UdpOptions,
    pub data: Vec<u8>,
}

impl UdpDatagram {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.remote_address);
        self.options.encode_into(out);
        out.extend_from_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < NF_MAX_ADDRESS_LENGTH {
            return Err(DecodeError::Truncated {
                what: "UDP remote address",
                need: NF_MAX_ADDRESS_LENGTH,
                have: buf.len(),
            });
        }
        let mut remote_address = [0u8; NF_MAX_ADDRESS_LENGTH];
        remote_address.copy_from_slice(&buf[..NF_MAX_ADDRESS_LENGTH]);
        let rest = &buf[NF_MAX_ADDRESS_LENGTH..];
        let (options, used) = UdpOptions::decode(rest)?;
        Ok(UdpDatagram {
            remote_address,
            options,
            data: rest[used..].to_vec(),
        })
    }
}

/// Typed content of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    TcpConnected(NfTcpConnInfo),
    TcpClosed(NfTcpConnInfo),
    TcpReceive(Vec<u8>),
    TcpSend(Vec<u8>),
    TcpCanReceive,
    TcpCanSend,
    TcpReqSuspend,
    TcpReqResume,

    UdpCreated(NfUdpConnInfo),
    UdpClosed(NfUdpConnInfo),
    UdpReceive(UdpDatagram),
    UdpSend(UdpDatagram),
    UdpCanReceive,
    UdpCanSend,
    UdpReqSuspend,
    UdpReqResume,

    AddHeadRule(NfRule),
    AddTailRule(NfRule),
    DeleteRules,

    TcpConnectRequest(NfTcpConnInfo),
    UdpConnectRequest(NfUdpConnRequest),

    TcpDisableUserModeFiltering,
    UdpDisableUserModeFiltering,
}

impl Message {
    pub fn code(&self) -> DataCode {
        match self {
            Message::TcpConnected(_) => DataCode::TcpConnected,
            Message::TcpClosed(_) => DataCode::TcpClosed,
            Message::TcpReceive(_) => DataCode::TcpReceive,
            Message::TcpSend(_) => DataCode::TcpSend,
            Message::TcpCanReceive => DataCode::TcpCanReceive,
            Message::TcpCanSend => DataCode::TcpCanSend,
            Message::TcpReqSuspend => DataCode::TcpReqSuspend,
            Message::TcpReqResume => DataCode::TcpReqResume,
            Message::UdpCreated(_) => DataCode::UdpCreated,
            Message::UdpClosed(_) => DataCode::UdpClosed,
            Message::UdpReceive(_) => DataCode::UdpReceive,
            Message::UdpSend(_) => DataCode::UdpSend,
            Message::UdpCanReceive => DataCode::UdpCanReceive,
            Message::UdpCanSend => DataCode::UdpCanSend,
            Message::UdpReqSuspend => DataCode::UdpReqSuspend,
            Message::UdpReqResume => DataCode::UdpReqResume,
            Message::AddHeadRule(_) => DataCode::ReqAddHeadRule,
            Message::AddTailRule(_) => DataCode::ReqAddTailRule,
            Message::DeleteRules => DataCode::ReqDeleteRules,
            Message::TcpConnectRequest(_) => DataCode::TcpConnectRequest,
            Message::UdpConnectRequest(_) => DataCode::UdpConnectRequest,
            Message::TcpDisableUserModeFiltering => DataCode::TcpDisableUserModeFiltering,
            Message::UdpDisableUserModeFiltering => DataCode::UdpDisableUserModeFiltering,
        }
    }

    /// `true` for indications the driver raises towards user mode, `false`
    /// for requests user mode sends to the driver.
    pub fn is_event(&self) -> bool {
        !matches!(
            self,
            Message::TcpReqSuspend
                | Message::TcpReqResume
                | Message::UdpReqSuspend
                | Message::UdpReqResume
                | Message::AddHeadRule(_)
                | Message::AddTailRule(_)
                | Message::DeleteRules
                | Message::TcpDisableUserModeFiltering
                | Message::UdpDisableUserModeFiltering
        )
    }

    /// Split an outgoing TCP payload into driver-sized `TcpSend` messages.
    pub fn tcp_send_chunks(data: &[u8]) -> impl Iterator<Item = Message> + '_ {
        data.chunks(NF_TCP_PACKET_BUF_SIZE)
            .map(|c| Message::TcpSend(c.to_vec()))
    }

    /// Split an incoming TCP payload into driver-sized `TcpReceive` messages.
    pub fn tcp_receive_chunks(data: &[u8]) -> impl Iterator<Item = Message> + '_ {
        data.chunks(NF_TCP_PACKET_BUF_SIZE)
            .map(|c| Message::TcpReceive(c.to_vec()))
    }

    pub fn into_envelope(self, id: EndpointId) -> Envelope {
        let code = self.code();
        let mut buffer = Vec::new();
        match self {
            Message::TcpConnected(c) | Message::TcpClosed(c) | Message::TcpConnectRequest(c) => {
                c.encode_into(&mut buffer)
            }
            Message::TcpReceive(data) | Message::TcpSend(data) => buffer = data,
            Message::UdpCreated(c) | Message::UdpClosed(c) => c.encode_into(&mut buffer),
            Message::UdpConnectRequest(r) => r.encode_into(&mut buffer),
            Message::UdpReceive(d) | Message::UdpSend(d) => d.encode_into(&mut buffer),
            Message::AddHeadRule(r) | Message::AddTailRule(r) => r.encode_into(&mut buffer),
            Message::TcpCanReceive
            | Message::TcpCanSend
            | Message::TcpReqSuspend
            | Message::TcpReqResume
            | Message::UdpCanReceive
            | Message::UdpCanSend
            | Message::UdpReqSuspend
            | Message::UdpReqResume
            | Message::DeleteRules
            | Message::TcpDisableUserModeFiltering
            | Message::UdpDisableUserModeFiltering => {}
        }
        Envelope::new(code, id, buffer)
    }

    pub fn from_envelope(env: &Envelope) -> Result<Self, DecodeError> {
        let buf = env.buffer.as_slice();
        let msg = match env.code {
            DataCode::TcpConnected => Message::TcpConnected(exact(env)?),
            DataCode::TcpClosed => Message::TcpClosed(exact(env)?),
            DataCode::TcpConnectRequest => Message::TcpConnectRequest(exact(env)?),
            DataCode::TcpReceive => Message::TcpReceive(buf.to_vec()),
            DataCode::TcpSend => Message::TcpSend(buf.to_vec()),
            DataCode::UdpCreated => Message::UdpCreated(exact(env)?),
            DataCode::UdpClosed => Message::UdpClosed(exact(env)?),
            DataCode::UdpConnectRequest => Message::UdpConnectRequest(exact(env)?),
            DataCode::UdpReceive => Message::UdpReceive(UdpDatagram::decode(buf)?),
            DataCode::UdpSend => Message::UdpSend(UdpDatagram::decode(buf)?),
            DataCode::ReqAddHeadRule => Message::AddHeadRule(exact(env)?),
            DataCode::ReqAddTailRule => Message::AddTailRule(exact(env)?),
            DataCode::TcpCanReceive => empty(env, Message::TcpCanReceive)?,
            DataCode::TcpCanSend => empty(env, Message::TcpCanSend)?,
            DataCode::TcpReqSuspend => empty(env, Message::TcpReqSuspend)?,
            DataCode::TcpReqResume => empty(env, Message::TcpReqResume)?,
            DataCode::UdpCanReceive => empty(env, Message::UdpCanReceive)?,
            DataCode::UdpCanSend => empty(env, Message::UdpCanSend)?,
            DataCode::UdpReqSuspend => empty(env, Message::UdpReqSuspend)?,
            DataCode::UdpReqResume => empty(env, Message::UdpReqResume)?,
            DataCode::ReqDeleteRules => empty(env, Message::DeleteRules)?,
            DataCode::TcpDisableUserModeFiltering => {
                empty(env, Message::TcpDisableUserModeFiltering)?
            }
            DataCode::UdpDisableUserModeFiltering => {
                empty(env, Message::UdpDisableUserModeFiltering)?
            }
        };
        Ok(msg)
    }

    /// Decode one encoded envelope straight into `(id, message)`.
    pub fn decode(buf: &[u8]) -> Result<(EndpointId, Self, usize), DecodeError> {
        let (env, used) = Envelope::decode(buf)?;
        Ok((env.id, Message::from_envelope(&env)?, used))
    }
}

/// Fixed-size payload that must fill the buffer exactly.
fn exact<T: WireFormat>(env: &Envelope) -> Result<T, DecodeError> {
    let value = T::decode(&env.buffer)?;
    let extra = env.buffer.len() - T::WIRE_SIZE;
    if extra != 0 {
        return Err(DecodeError::UnexpectedPayload { code: env.code, len: extra });
    }
    Ok(value)
}

fn empty(env: &Envelope, msg: Message) -> Result<Message, DecodeError> {
    if env.buffer.is_empty() {
        Ok(msg)
    } else {
        Err(DecodeError::UnexpectedPayload { code: env.code, len: env.buffer.len() })
    }
}
