// src/c_api.rs

//! C-encoded callback table.
//!
//! `nf_init` takes a table of bare function pointers with no context
//! argument, so the active [`EventHandler`] lives in a process-wide slot and
//! every trampoline looks it up on entry. Only one handler can be installed
//! at a time, which matches the library: one `nf_init` per process.
//!
//! A panic inside a handler must not unwind into the library's threads; the
//! trampolines catch it and log it instead.

use std::ffi::{c_char, c_int, c_uchar};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::{ptr, slice};

use nfdriver::{
    NF_MAX_ADDRESS_LENGTH, NF_UDP_OPTIONS_HEADER_LEN, NfTcpConnInfo, NfUdpConnInfo,
    NfUdpConnRequest, NfUdpOptionsHeader, SockAddrBuf, UdpFlags, UdpOptions,
};

use crate::handler::EventHandler;
use crate::status::{NfError, Result};
use crate::sys::{ENDPOINT_ID, NF_EventHandler};

static ACTIVE: RwLock<Option<Arc<dyn EventHandler>>> = RwLock::new(None);

/// Install `handler` as the target of the trampolines and return the table
/// to pass to `nf_init`.
pub fn install(handler: Arc<dyn EventHandler>) -> Result<NF_EventHandler> {
    let mut slot = ACTIVE.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(NfError::AlreadyInitialized);
    }
    *slot = Some(handler);
    Ok(table())
}

/// Drop the installed handler. Later callbacks become no-ops.
pub fn uninstall() {
    ACTIVE.write().unwrap_or_else(PoisonError::into_inner).take();
}

pub fn is_installed() -> bool {
    ACTIVE.read().unwrap_or_else(PoisonError::into_inner).is_some()
}

/// Table with every slot pointing at its trampoline.
pub fn table() -> NF_EventHandler {
    NF_EventHandler {
        threadStart: Some(thread_start),
        threadEnd: Some(thread_end),
        tcpConnectRequest: Some(tcp_connect_request),
        tcpConnected: Some(tcp_connected),
        tcpClosed: Some(tcp_closed),
        tcpReceive: Some(tcp_receive),
        tcpSend: Some(tcp_send),
        tcpCanReceive: Some(tcp_can_receive),
        tcpCanSend: Some(tcp_can_send),
        udpCreated: Some(udp_created),
        udpConnectRequest: Some(udp_connect_request),
        udpClosed: Some(udp_closed),
        udpReceive: Some(udp_receive),
        udpSend: Some(udp_send),
        udpCanReceive: Some(udp_can_receive),
        udpCanSend: Some(udp_can_send),
    }
}

/// Run `f` against the installed handler, if any. The slot lock is released
/// before the call so a handler may uninstall itself.
fn with_handler(callback: &'static str, f: impl FnOnce(&dyn EventHandler)) {
    let handler = ACTIVE.read().unwrap_or_else(PoisonError::into_inner).clone();
    let Some(handler) = handler else { return };
    if panic::catch_unwind(AssertUnwindSafe(|| f(handler.as_ref()))).is_err() {
        log::error!("event handler panicked in {callback}");
    }
}

// ───── argument conversion ──────────────────────────────────────────────────

/// # Safety
/// `buf` must be valid for `len` bytes when both are non-zero.
unsafe fn data<'a>(buf: *const c_char, len: c_int) -> &'a [u8] {
    match usize::try_from(len) {
        Ok(n) if n > 0 && !buf.is_null() => unsafe { slice::from_raw_parts(buf.cast::<u8>(), n) },
        _ => &[],
    }
}

/// # Safety
/// A non-null `ptr` must be valid for `NF_MAX_ADDRESS_LENGTH` bytes.
unsafe fn sockaddr(ptr: *const c_uchar) -> SockAddrBuf {
    if ptr.is_null() {
        return [0u8; NF_MAX_ADDRESS_LENGTH];
    }
    unsafe { ptr::read(ptr.cast::<SockAddrBuf>()) }
}

/// # Safety
/// A non-null `ptr` must point at a header followed by `options_length` bytes.
unsafe fn options(ptr: *const NfUdpOptionsHeader) -> UdpOptions {
    if ptr.is_null() {
        return UdpOptions::default();
    }
    let header = unsafe { ptr::read(ptr) };
    let len = usize::try_from(header.options_length).unwrap_or(0);
    let bytes = unsafe { slice::from_raw_parts(ptr.cast::<u8>().add(NF_UDP_OPTIONS_HEADER_LEN), len) };
    UdpOptions::new(UdpFlags::from_bits_retain(header.flags), bytes.to_vec())
}

// ───── trampolines ──────────────────────────────────────────────────────────
// The library guarantees every pointer argument is valid for the duration of
// the call and not aliased elsewhere.

unsafe extern "C" fn thread_start() {
    with_handler("threadStart", |h| h.thread_start());
}

unsafe extern "C" fn thread_end() {
    with_handler("threadEnd", |h| h.thread_end());
}

unsafe extern "C" fn tcp_connect_request(id: ENDPOINT_ID, info: *mut NfTcpConnInfo) {
    let Some(info) = (unsafe { info.as_mut() }) else { return };
    with_handler("tcpConnectRequest", |h| h.tcp_connect_request(id, info));
}

unsafe extern "C" fn tcp_connected(id: ENDPOINT_ID, info: *mut NfTcpConnInfo) {
    let Some(info) = (unsafe { info.as_ref() }) else { return };
    with_handler("tcpConnected", |h| h.tcp_connected(id, info));
}

unsafe extern "C" fn tcp_closed(id: ENDPOINT_ID, info: *mut NfTcpConnInfo) {
    let Some(info) = (unsafe { info.as_ref() }) else { return };
    with_handler("tcpClosed", |h| h.tcp_closed(id, info));
}

unsafe extern "C" fn tcp_receive(id: ENDPOINT_ID, buf: *const c_char, len: c_int) {
    let bytes = unsafe { data(buf, len) };
    with_handler("tcpReceive", |h| h.tcp_receive(id, bytes));
}

unsafe extern "C" fn tcp_send(id: ENDPOINT_ID, buf: *const c_char, len: c_int) {
    let bytes = unsafe { data(buf, len) };
    with_handler("tcpSend", |h| h.tcp_send(id, bytes));
}

unsafe extern "C" fn tcp_can_receive(id: ENDPOINT_ID) {
    with_handler("tcpCanReceive", |h| h.tcp_can_receive(id));
}

unsafe extern "C" fn tcp_can_send(id: ENDPOINT_ID) {
    with_handler("tcpCanSend", |h| h.tcp_can_send(id));
}

unsafe extern "C" fn udp_created(id: ENDPOINT_ID, info: *mut NfUdpConnInfo) {
    let Some(info) = (unsafe { info.as_ref() }) else { return };
    with_handler("udpCreated", |h| h.udp_created(id, info));
}

unsafe extern "C" fn udp_connect_request(id: ENDPOINT_ID, req: *mut NfUdpConnRequest) {
    let Some(req) = (unsafe { req.as_mut() }) else { return };
    with_handler("udpConnectRequest", |h| h.udp_connect_request(id, req));
}

unsafe extern "C" fn udp_closed(id: ENDPOINT_ID, info: *mut NfUdpConnInfo) {
    let Some(info) = (unsafe { info.as_ref() }) else { return };
    with_handler("udpClosed", |h| h.udp_closed(id, info));
}

unsafe extern "C" fn udp_receive(
    id: ENDPOINT_ID,
    remote_address: *const c_uchar,
    buf: *const c_char,
    len: c_int,
    opts: *mut NfUdpOptionsHeader,
) {
    let remote = unsafe { sockaddr(remote_address) };
    let bytes = unsafe { data(buf, len) };
    let opts = unsafe { options(opts) };
    with_handler("udpReceive", |h| h.udp_receive(id, &remote, bytes, &opts));
}

unsafe extern "C" fn udp_send(
    id: ENDPOINT_ID,
    remote_address: *const c_uchar,
    buf: *const c_char,
    len: c_int,
    opts: *mut NfUdpOptionsHeader,
) {
    let remote = unsafe { sockaddr(remote_address) };
    let bytes = unsafe { data(buf, len) };
    let opts = unsafe { options(opts) };
    with_handler("udpSend", |h| h.udp_send(id, &remote, bytes, &opts));
}

unsafe extern "C" fn udp_can_receive(id: ENDPOINT_ID) {
    with_handler("udpCanReceive", |h| h.udp_can_receive(id));
}

unsafe extern "C" fn udp_can_send(id: ENDPOINT_ID) {
    with_handler("udpCanSend", |h| h.udp_can_send(id));
}
