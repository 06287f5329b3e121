// tests/passthrough.rs

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{Call, MockApi};
use nfapi::capture::decode_frames;
use nfapi::nfdriver::addr::encode_sockaddr;
use nfapi::nfdriver::{
    AF_INET, DataCode, Direction, FilteringFlag, Message, NF_TCP_PACKET_BUF_SIZE, NfTcpConnInfo,
    NfUdpConnRequest, UdpFlags, UdpOptions,
};
use nfapi::capture::CaptureWriter;
use nfapi::config::RuleSpec;
use nfapi::passthrough::PassthroughHandler;
use nfapi::recorder::{Recorder, run_capture};
use nfapi::rule::RuleBuilder;
use nfapi::{EventHandler, NfApi, NfError, Session};

fn conn(pid: u32) -> NfTcpConnInfo {
    NfTcpConnInfo {
        filtering_flag: FilteringFlag::INDICATE_CONNECT_REQUESTS.bits(),
        process_id: pid,
        direction: Direction::Out as u8,
        ip_family: AF_INET,
        local_address: encode_sockaddr(&"10.0.0.2:50123".parse().unwrap()),
        remote_address: encode_sockaddr(&"203.0.113.9:443".parse().unwrap()),
    }
}

fn fake_names(pid: u32) -> Option<String> {
    match pid {
        100 => Some(r"C:\Tools\NetCat.EXE".to_string()),
        200 => Some(r"C:\Windows\System32\svchost.exe".to_string()),
        _ => None,
    }
}

#[test]
fn session_attaches_and_detaches() {
    let api = MockApi::new();
    let handler = Arc::new(PassthroughHandler::new(api.clone()));
    let session = Session::start(api.clone(), "netfilter2", handler.clone()).unwrap();
    assert_eq!(session.driver_name(), "netfilter2");

    // A second session on the same library is refused.
    let again = Session::start(api.clone(), "netfilter2", handler);
    assert!(matches!(again, Err(NfError::AlreadyInitialized)));

    session.stop();
    assert_eq!(api.calls(), vec![Call::Init("netfilter2".into()), Call::Free]);
}

#[test]
fn payloads_are_posted_back_unchanged() {
    let api = MockApi::new();
    let handler = PassthroughHandler::new(api.clone()).with_resolver(Box::new(fake_names));

    handler.tcp_send(1, b"hello");
    handler.tcp_receive(1, b"world");

    let remote = encode_sockaddr(&"192.0.2.1:53".parse().unwrap());
    let opts = UdpOptions::new(UdpFlags::BROADCAST, vec![0xaa]);
    handler.udp_send(2, &remote, b"query", &opts);
    handler.udp_receive(2, &remote, b"answer", &opts);

    assert_eq!(
        api.calls(),
        vec![
            Call::TcpPostSend(1, b"hello".to_vec()),
            Call::TcpPostReceive(1, b"world".to_vec()),
            Call::UdpPostSend(2, remote, b"query".to_vec(), opts.clone()),
            Call::UdpPostReceive(2, remote, b"answer".to_vec(), opts),
        ]
    );
}

#[test]
fn failed_posts_do_not_panic() {
    let api = MockApi::new();
    api.fail_posts.store(true, Ordering::SeqCst);
    let handler = PassthroughHandler::new(api.clone()).with_resolver(Box::new(fake_names));
    handler.tcp_send(9, b"x");
    assert_eq!(api.calls().len(), 1);
}

#[test]
fn listed_processes_are_blocked() {
    let api = MockApi::new();
    let handler = PassthroughHandler::new(api.clone())
        .with_blocked_processes(["netcat.exe"])
        .with_resolver(Box::new(fake_names));

    let mut blocked = conn(100);
    handler.tcp_connect_request(5, &mut blocked);
    assert!(blocked.filtering_flag().contains(FilteringFlag::BLOCK));
    assert!(blocked.filtering_flag().contains(FilteringFlag::INDICATE_CONNECT_REQUESTS));

    let mut allowed = conn(200);
    handler.tcp_connect_request(6, &mut allowed);
    assert!(!allowed.filtering_flag().contains(FilteringFlag::BLOCK));

    let mut unknown = conn(300);
    handler.tcp_connect_request(7, &mut unknown);
    assert!(!unknown.filtering_flag().contains(FilteringFlag::BLOCK));

    let mut udp = NfUdpConnRequest { process_id: 100, ip_family: AF_INET, ..Default::default() };
    handler.udp_connect_request(8, &mut udp);
    assert_eq!(udp.filtering_flag(), FilteringFlag::BLOCK);
}

#[tokio::test]
async fn events_are_recorded_in_order() {
    let api = MockApi::new();
    let (recorder, rx) = Recorder::channel(64);
    let writer = tokio::spawn(run_capture(
        rx,
        CaptureWriter::new(Vec::new()),
        std::time::Duration::from_millis(10),
    ));

    let handler = Arc::new(
        PassthroughHandler::new(api.clone())
            .with_recorder(Some(recorder))
            .with_resolver(Box::new(fake_names)),
    );
    let session = Session::start(api.clone(), "netfilter2", handler.clone()).unwrap();

    let info = conn(200);
    let live = api.handler();
    live.tcp_connected(4, &info);
    let big = vec![0x5a; NF_TCP_PACKET_BUF_SIZE + 10];
    live.tcp_send(4, &big);
    live.tcp_closed(4, &info);

    drop(live);
    drop(session);
    drop(handler);

    let raw = writer.await.unwrap().unwrap().into_inner();
    let (frames, err) = decode_frames(&raw);
    assert!(err.is_none(), "{:?}", err);

    let codes: Vec<DataCode> = frames.iter().map(|f| f.message.code()).collect();
    assert_eq!(
        codes,
        vec![DataCode::TcpConnected, DataCode::TcpSend, DataCode::TcpSend, DataCode::TcpClosed]
    );
    match &frames[2].message {
        Message::TcpSend(tail) => assert_eq!(tail.len(), 10),
        other => panic!("expected TcpSend, got {:?}", other),
    }
    assert!(frames.iter().all(|f| f.id == 4));

    // The whole payload went back to the driver in one post.
    assert!(api.calls().contains(&Call::TcpPostSend(4, big)));
}

#[test]
fn rules_go_through_the_trait() {
    let api = MockApi::new();
    let rule = nfapi::rule::RuleBuilder::new()
        .remote_port(80)
        .action(FilteringFlag::FILTER)
        .build()
        .unwrap();
    api.add_rule(&rule, true).unwrap();
    api.delete_rules().unwrap();
    assert_eq!(api.calls(), vec![Call::AddRule(rule, true), Call::DeleteRules]);
}

#[test]
fn refused_rule_rolls_back_the_whole_set() {
    let api = MockApi::new();
    *api.rule_capacity.lock().unwrap() = Some(1);
    let handler = Arc::new(PassthroughHandler::new(api.clone()));
    let session = Session::start(api.clone(), "netfilter2", handler).unwrap();

    let spec = |port| RuleSpec {
        rule: RuleBuilder::new().remote_port(port).action(FilteringFlag::FILTER).build().unwrap(),
        to_head: false,
    };
    let rules = [spec(80), spec(443), spec(8080)];
    assert!(matches!(session.install_rules(&rules), Err(NfError::Fail)));
    drop(session);

    assert_eq!(
        api.calls(),
        vec![
            Call::Init("netfilter2".into()),
            Call::AddRule(rules[0].rule, false),
            Call::AddRule(rules[1].rule, false),
            Call::DeleteRules,
            Call::Free,
        ]
    );
}

#[test]
fn accepted_rules_are_installed_in_order() {
    let api = MockApi::new();
    let handler = Arc::new(PassthroughHandler::new(api.clone()));
    let session = Session::start(api.clone(), "netfilter2", handler).unwrap();

    let head = RuleSpec { rule: RuleBuilder::new().remote_port(53).build().unwrap(), to_head: true };
    let tail = RuleSpec { rule: RuleBuilder::new().local_port(22).build().unwrap(), to_head: false };
    session.install_rules(&[head, tail]).unwrap();

    let calls = api.calls();
    assert_eq!(&calls[1..], &[Call::AddRule(head.rule, true), Call::AddRule(tail.rule, false)]);
}
