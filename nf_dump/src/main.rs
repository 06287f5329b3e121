//! Build with `cargo run --release --bin nf_dump -- <capture> [--json]`.
//! Shows every event recorded in an `nfagent` capture file, one per line.

use anyhow::{Context, bail};
use serde_json::{Value, json};
use std::{
    collections::BTreeMap,
    env,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    net::SocketAddr,
};

use nfapi::capture::{CaptureReader, Frame};
use nfapi::nfdriver::addr::decode_sockaddr;
use nfapi::nfdriver::{Message, NfRule, NfTcpConnInfo, UdpDatagram};

const PREVIEW_LEN: usize = 16;

fn addr(a: Option<SocketAddr>) -> String {
    a.map_or_else(|| "?".into(), |a| a.to_string())
}

fn hex_preview(data: &[u8]) -> String {
    let mut s: String = data.iter().take(PREVIEW_LEN).map(|b| format!("{b:02x}")).collect();
    if data.len() > PREVIEW_LEN {
        s.push('…');
    }
    s
}

fn tcp_json(c: &NfTcpConnInfo) -> Value {
    let (pid, flags) = (c.process_id, c.filtering_flag);
    json!({
        "pid": pid,
        "direction": c.direction().map(|d| format!("{d:?}")),
        "local": addr(c.local_addr()),
        "remote": addr(c.remote_addr()),
        "filtering_flag": flags,
    })
}

fn udp_json(d: &UdpDatagram) -> Value {
    json!({
        "remote": addr(decode_sockaddr(&d.remote_address)),
        "flags": d.options.flags.bits(),
        "options_len": d.options.options.len(),
        "len": d.data.len(),
        "preview": hex_preview(&d.data),
    })
}

fn rule_json(r: &NfRule) -> Value {
    let pid = r.process_id;
    json!({
        "protocol": r.protocol().map(|p| format!("{p:?}")),
        "direction": r.direction().map(|d| format!("{d:?}")),
        "pid": pid,
        "local_port": r.local_port(),
        "remote_port": r.remote_port(),
        "local_ip": r.local_ip().map(|ip| ip.to_string()),
        "remote_ip": r.remote_ip().map(|ip| ip.to_string()),
        "filtering_flag": r.filtering_flag().bits(),
    })
}

/// Payload details of one message, `Null` when it carries none.
fn details(message: &Message) -> Value {
    match message {
        Message::TcpConnected(c) | Message::TcpClosed(c) | Message::TcpConnectRequest(c) => {
            tcp_json(c)
        }
        Message::TcpReceive(d) | Message::TcpSend(d) => {
            json!({ "len": d.len(), "preview": hex_preview(d) })
        }
        Message::UdpCreated(c) | Message::UdpClosed(c) => {
            let pid = c.process_id;
            json!({ "pid": pid, "local": addr(c.local_addr()) })
        }
        Message::UdpConnectRequest(r) => {
            let (pid, flags) = (r.process_id, r.filtering_flag);
            json!({
                "pid": pid,
                "local": addr(r.local_addr()),
                "remote": addr(r.remote_addr()),
                "filtering_flag": flags,
            })
        }
        Message::UdpReceive(d) | Message::UdpSend(d) => udp_json(d),
        Message::AddHeadRule(r) | Message::AddTailRule(r) => rule_json(r),
        _ => Value::Null,
    }
}

fn print_frame(out: &mut impl Write, frame: &Frame, as_json: bool) -> io::Result<()> {
    let code = frame.message.code().name();
    let details = details(&frame.message);
    if as_json {
        let line = json!({
            "time": frame.captured_at.to_rfc3339(),
            "id": frame.id,
            "code": code,
            "details": details,
        });
        writeln!(out, "{line}")
    } else if details.is_null() {
        writeln!(out, "{} {:>8} {}", frame.captured_at.to_rfc3339(), frame.id, code)
    } else {
        writeln!(out, "{} {:>8} {} {}", frame.captured_at.to_rfc3339(), frame.id, code, details)
    }
}

fn main() -> anyhow::Result<()> {
    /*── arguments ──────────────────────────────*/
    let mut path = None;
    let mut as_json = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => as_json = true,
            _ if path.is_none() => path = Some(arg),
            other => bail!("unexpected argument {other:?}"),
        }
    }
    let Some(path) = path else {
        bail!("usage: nf_dump <capture> [--json]");
    };

    /*── walk frames ────────────────────────────*/
    let file = File::open(&path).with_context(|| format!("opening {path}"))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();

    let mut reader = CaptureReader::new(BufReader::new(file));
    let mut failure = None;
    for item in reader.by_ref() {
        match item {
            Ok(frame) => {
                *counts.entry(frame.message.code().name()).or_default() += 1;
                print_frame(&mut out, &frame, as_json)?;
            }
            Err(e) => failure = Some(e),
        }
    }
    out.flush()?;

    /*── summary ────────────────────────────────*/
    if !as_json {
        eprintln!("{} frame(s), {} byte(s)", counts.values().sum::<u64>(), reader.offset());
        for (code, n) in &counts {
            eprintln!("  {code:<36} {n}");
        }
    }
    if let Some(e) = failure {
        bail!("stopped at byte {}: {e}", reader.offset());
    }
    Ok(())
}
