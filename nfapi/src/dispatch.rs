// src/dispatch.rs

//! Route decoded `NF_DATA` messages to an [`EventHandler`], the same way the
//! library's worker threads do for live traffic. Used to replay captures.

use nfdriver::{DataCode, EndpointId, Message};

use crate::handler::EventHandler;

/// Outcome of [`dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler callback ran.
    Handled,
    /// A user-to-driver request; there is no callback for it.
    Request(DataCode),
}

/// Invoke the callback matching `message`. Connect requests get `&mut`
/// access so a handler's verdict is visible to the caller afterwards.
pub fn dispatch(handler: &dyn EventHandler, id: EndpointId, message: &mut Message) -> Dispatched {
    match message {
        Message::TcpConnectRequest(info) => handler.tcp_connect_request(id, info),
        Message::TcpConnected(info) => handler.tcp_connected(id, info),
        Message::TcpClosed(info) => handler.tcp_closed(id, info),
        Message::TcpReceive(data) => handler.tcp_receive(id, data),
        Message::TcpSend(data) => handler.tcp_send(id, data),
        Message::TcpCanReceive => handler.tcp_can_receive(id),
        Message::TcpCanSend => handler.tcp_can_send(id),

        Message::UdpCreated(info) => handler.udp_created(id, info),
        Message::UdpConnectRequest(req) => handler.udp_connect_request(id, req),
        Message::UdpClosed(info) => handler.udp_closed(id, info),
        Message::UdpReceive(d) => handler.udp_receive(id, &d.remote_address, &d.data, &d.options),
        Message::UdpSend(d) => handler.udp_send(id, &d.remote_address, &d.data, &d.options),
        Message::UdpCanReceive => handler.udp_can_receive(id),
        Message::UdpCanSend => handler.udp_can_send(id),

        other => return Dispatched::Request(other.code()),
    }
    Dispatched::Handled
}
