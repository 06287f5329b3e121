// src/handler.rs

//! Safe callback surface. The filtering library calls one of these methods
//! per driver event, from its own worker threads.

use nfdriver::{EndpointId, NfTcpConnInfo, NfUdpConnInfo, NfUdpConnRequest, SockAddrBuf, UdpOptions};

/// Receives driver events.
///
/// The four data callbacks are required: the library does not forward
/// intercepted bytes on its own, so an implementation must re-post them
/// (`NfApi::tcp_post_*` / `NfApi::udp_post_*`) or the traffic is dropped.
/// Everything else defaults to a no-op.
///
/// Changes to the `&mut` structs in the connect-request callbacks are seen by
/// the driver (block, redirect).
pub trait EventHandler: Send + Sync {
    fn thread_start(&self) {}
    fn thread_end(&self) {}

    fn tcp_connect_request(&self, _id: EndpointId, _info: &mut NfTcpConnInfo) {}
    fn tcp_connected(&self, _id: EndpointId, _info: &NfTcpConnInfo) {}
    fn tcp_closed(&self, _id: EndpointId, _info: &NfTcpConnInfo) {}
    fn tcp_receive(&self, id: EndpointId, data: &[u8]);
    fn tcp_send(&self, id: EndpointId, data: &[u8]);
    fn tcp_can_receive(&self, _id: EndpointId) {}
    fn tcp_can_send(&self, _id: EndpointId) {}

    fn udp_created(&self, _id: EndpointId, _info: &NfUdpConnInfo) {}
    fn udp_connect_request(&self, _id: EndpointId, _req: &mut NfUdpConnRequest) {}
    fn udp_closed(&self, _id: EndpointId, _info: &NfUdpConnInfo) {}
    fn udp_receive(&self, id: EndpointId, remote: &SockAddrBuf, data: &[u8], options: &UdpOptions);
    fn udp_send(&self, id: EndpointId, remote: &SockAddrBuf, data: &[u8], options: &UdpOptions);
    fn udp_can_receive(&self, _id: EndpointId) {}
    fn udp_can_send(&self, _id: EndpointId) {}
}
