// src/passthrough.rs

//! Default handler of the agent: forwards every intercepted payload
//! unchanged, logs connection lifecycles, blocks configured processes and
//! optionally records everything to a capture.

use std::net::SocketAddr;
use std::sync::Arc;

use log::Level;
use nfdriver::addr::decode_sockaddr;
use nfdriver::{
    EndpointId, FilteringFlag, Message, NfTcpConnInfo, NfUdpConnInfo, NfUdpConnRequest,
    SockAddrBuf, UdpDatagram, UdpOptions,
};

use crate::api::NfApi;
use crate::handler::EventHandler;
use crate::nf_log;
use crate::recorder::Recorder;
use crate::util;

/// Maps a process id to its image path.
pub type ProcessResolver = Box<dyn Fn(u32) -> Option<String> + Send + Sync>;

pub struct PassthroughHandler {
    api: Arc<dyn NfApi>,
    recorder: Option<Recorder>,
    /// Lower-cased image file names.
    blocked: Vec<String>,
    resolve: ProcessResolver,
}

impl PassthroughHandler {
    pub fn new(api: Arc<dyn NfApi>) -> Self {
        Self {
            api,
            recorder: None,
            blocked: Vec::new(),
            resolve: Box::new(|pid| util::process_name(pid).ok()),
        }
    }

    pub fn with_recorder(mut self, recorder: Option<Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Block connections from processes whose image file name is listed.
    /// Matching ignores case and directories.
    pub fn with_blocked_processes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked = names.into_iter().map(|n| util::image_file_name(n.as_ref())).collect();
        self
    }

    pub fn with_resolver(mut self, resolve: ProcessResolver) -> Self {
        self.resolve = resolve;
        self
    }

    fn process_label(&self, pid: u32) -> String {
        (self.resolve)(pid).unwrap_or_else(|| format!("pid {pid}"))
    }

    fn is_blocked(&self, pid: u32) -> bool {
        if self.blocked.is_empty() {
            return false;
        }
        match (self.resolve)(pid) {
            Some(path) => self.blocked.contains(&util::image_file_name(&path)),
            None => false,
        }
    }

    fn record(&self, id: EndpointId, message: Message) {
        if let Some(rec) = &self.recorder {
            rec.record(id, message);
        }
    }

    fn record_udp(&self, id: EndpointId, remote: &SockAddrBuf, data: &[u8], options: &UdpOptions, send: bool) {
        if let Some(rec) = &self.recorder {
            let d = UdpDatagram {
                remote_address: *remote,
                options: options.clone(),
                data: data.to_vec(),
            };
            rec.record(id, if send { Message::UdpSend(d) } else { Message::UdpReceive(d) });
        }
    }
}

fn fmt_addr(addr: Option<SocketAddr>) -> String {
    addr.map_or_else(|| "?".to_string(), |a| a.to_string())
}

impl EventHandler for PassthroughHandler {
    fn thread_start(&self) {
        log::debug!("worker thread started");
    }

    fn thread_end(&self) {
        log::debug!("worker thread stopped");
    }

    fn tcp_connect_request(&self, id: EndpointId, info: &mut NfTcpConnInfo) {
        let pid = info.process_id;
        if self.is_blocked(pid) {
            info.set_filtering_flag(info.filtering_flag() | FilteringFlag::BLOCK);
            nf_log!(
                Level::Warn,
                "policy",
                "blocked TCP {} -> {} from {}",
                id,
                fmt_addr(info.remote_addr()),
                self.process_label(pid)
            );
        }
        self.record(id, Message::TcpConnectRequest(*info));
    }

    fn tcp_connected(&self, id: EndpointId, info: &NfTcpConnInfo) {
        let pid = info.process_id;
        nf_log!(
            Level::Info,
            "tcp",
            "{} connected {:?} {} -> {} ({})",
            id,
            info.direction(),
            fmt_addr(info.local_addr()),
            fmt_addr(info.remote_addr()),
            self.process_label(pid)
        );
        self.record(id, Message::TcpConnected(*info));
    }

    fn tcp_closed(&self, id: EndpointId, info: &NfTcpConnInfo) {
        nf_log!(Level::Info, "tcp", "{} closed {}", id, fmt_addr(info.remote_addr()));
        self.record(id, Message::TcpClosed(*info));
    }

    fn tcp_receive(&self, id: EndpointId, data: &[u8]) {
        for chunk in Message::tcp_receive_chunks(data) {
            self.record(id, chunk);
        }
        if let Err(e) = self.api.tcp_post_receive(id, data) {
            log::warn!("tcp_post_receive({id}, {} bytes): {e}", data.len());
        }
    }

    fn tcp_send(&self, id: EndpointId, data: &[u8]) {
        for chunk in Message::tcp_send_chunks(data) {
            self.record(id, chunk);
        }
        if let Err(e) = self.api.tcp_post_send(id, data) {
            log::warn!("tcp_post_send({id}, {} bytes): {e}", data.len());
        }
    }

    fn tcp_can_receive(&self, id: EndpointId) {
        self.record(id, Message::TcpCanReceive);
    }

    fn tcp_can_send(&self, id: EndpointId) {
        self.record(id, Message::TcpCanSend);
    }

    fn udp_created(&self, id: EndpointId, info: &NfUdpConnInfo) {
        let pid = info.process_id;
        nf_log!(
            Level::Info,
            "udp",
            "{} created on {} ({})",
            id,
            fmt_addr(info.local_addr()),
            self.process_label(pid)
        );
        self.record(id, Message::UdpCreated(*info));
    }

    fn udp_connect_request(&self, id: EndpointId, req: &mut NfUdpConnRequest) {
        let pid = req.process_id;
        if self.is_blocked(pid) {
            req.set_filtering_flag(req.filtering_flag() | FilteringFlag::BLOCK);
            nf_log!(
                Level::Warn,
                "policy",
                "blocked UDP {} -> {} from {}",
                id,
                fmt_addr(req.remote_addr()),
                self.process_label(pid)
            );
        }
        self.record(id, Message::UdpConnectRequest(*req));
    }

    fn udp_closed(&self, id: EndpointId, info: &NfUdpConnInfo) {
        nf_log!(Level::Info, "udp", "{} closed", id);
        self.record(id, Message::UdpClosed(*info));
    }

    fn udp_receive(&self, id: EndpointId, remote: &SockAddrBuf, data: &[u8], options: &UdpOptions) {
        self.record_udp(id, remote, data, options, false);
        if let Err(e) = self.api.udp_post_receive(id, remote, data, options) {
            log::warn!("udp_post_receive({id}) from {}: {e}", fmt_addr(decode_sockaddr(remote)));
        }
    }

    fn udp_send(&self, id: EndpointId, remote: &SockAddrBuf, data: &[u8], options: &UdpOptions) {
        self.record_udp(id, remote, data, options, true);
        if let Err(e) = self.api.udp_post_send(id, remote, data, options) {
            log::warn!("udp_post_send({id}) to {}: {e}", fmt_addr(decode_sockaddr(remote)));
        }
    }

    fn udp_can_receive(&self, id: EndpointId) {
        self.record(id, Message::UdpCanReceive);
    }

    fn udp_can_send(&self, id: EndpointId) {
        self.record(id, Message::UdpCanSend);
    }
}
