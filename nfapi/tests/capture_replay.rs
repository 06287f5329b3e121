// tests/capture_replay.rs

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::Mutex;

use chrono::Utc;
use tempfile::tempdir;

use nfapi::capture::{CaptureReader, CaptureWriter, Frame};
use nfapi::dispatch::{Dispatched, dispatch};
use nfapi::nfdriver::addr::encode_sockaddr;
use nfapi::nfdriver::{
    AF_INET, DataCode, EndpointId, FilteringFlag, Message, NfTcpConnInfo, SockAddrBuf,
    UdpDatagram, UdpFlags, UdpOptions,
};
use nfapi::rule::RuleBuilder;
use nfapi::EventHandler;

#[derive(Default)]
struct Tally {
    lines: Mutex<Vec<String>>,
}

impl Tally {
    fn push(&self, s: String) {
        self.lines.lock().unwrap().push(s);
    }
}

impl EventHandler for Tally {
    fn tcp_connect_request(&self, id: EndpointId, info: &mut NfTcpConnInfo) {
        self.push(format!("{id} connect"));
        info.set_filtering_flag(FilteringFlag::BLOCK);
    }
    fn tcp_receive(&self, id: EndpointId, data: &[u8]) {
        self.push(format!("{id} tcp in {}", data.len()));
    }
    fn tcp_send(&self, id: EndpointId, data: &[u8]) {
        self.push(format!("{id} tcp out {}", data.len()));
    }
    fn udp_receive(&self, id: EndpointId, _: &SockAddrBuf, data: &[u8], o: &UdpOptions) {
        self.push(format!("{id} udp in {} {:?}", data.len(), o.flags));
    }
    fn udp_send(&self, id: EndpointId, _: &SockAddrBuf, data: &[u8], _: &UdpOptions) {
        self.push(format!("{id} udp out {}", data.len()));
    }
}

#[test]
fn capture_file_replays_through_dispatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.nfc");

    let info = NfTcpConnInfo {
        ip_family: AF_INET,
        remote_address: encode_sockaddr(&"203.0.113.7:25".parse().unwrap()),
        ..Default::default()
    };
    let rule = RuleBuilder::new().remote_port(25).action(FilteringFlag::BLOCK).build().unwrap();
    let messages = vec![
        (1, Message::TcpConnectRequest(info)),
        (1, Message::TcpSend(b"EHLO".to_vec())),
        (1, Message::TcpReceive(b"250 ok".to_vec())),
        (
            2,
            Message::UdpReceive(UdpDatagram {
                remote_address: encode_sockaddr(&"198.51.100.3:123".parse().unwrap()),
                options: UdpOptions::new(UdpFlags::MULTICAST, Vec::new()),
                data: vec![0; 48],
            }),
        ),
        (0, Message::AddTailRule(rule)),
    ];

    {
        let mut w = CaptureWriter::new(BufWriter::new(File::create(&path).unwrap()));
        for (id, msg) in messages {
            w.write_frame(Frame { captured_at: Utc::now(), id, message: msg }).unwrap();
        }
        w.flush().unwrap();
    }

    let tally = Tally::default();
    let mut outcomes = Vec::new();
    let mut verdict = None;
    for frame in CaptureReader::new(BufReader::new(File::open(&path).unwrap())) {
        let mut frame = frame.unwrap();
        outcomes.push(dispatch(&tally, frame.id, &mut frame.message));
        if let Message::TcpConnectRequest(info) = &frame.message {
            verdict = Some(info.filtering_flag());
        }
    }

    assert_eq!(
        outcomes,
        vec![
            Dispatched::Handled,
            Dispatched::Handled,
            Dispatched::Handled,
            Dispatched::Handled,
            Dispatched::Request(DataCode::ReqAddTailRule),
        ]
    );
    assert_eq!(verdict, Some(FilteringFlag::BLOCK));
    assert_eq!(
        *tally.lines.lock().unwrap(),
        vec![
            "1 connect".to_string(),
            "1 tcp out 4".to_string(),
            "1 tcp in 6".to_string(),
            format!("2 udp in 48 {:?}", UdpFlags::MULTICAST),
        ]
    );
}

#[test]
fn requests_have_no_callback() {
    let tally = Tally::default();
    for mut msg in [Message::DeleteRules, Message::TcpReqSuspend, Message::UdpDisableUserModeFiltering] {
        let code = msg.code();
        assert_eq!(dispatch(&tally, 0, &mut msg), Dispatched::Request(code));
    }
    assert!(tally.lines.lock().unwrap().is_empty());
}
