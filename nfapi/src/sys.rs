// src/sys.rs

//! Raw ABI of `nfapi.dll` built with `_C_API`: every export is `__cdecl` and
//! the callback table is a packed struct of plain function pointers.
#![allow(non_camel_case_types, non_snake_case)]

use std::ffi::{c_char, c_int, c_uchar};

use nfdriver::{NfRule, NfTcpConnInfo, NfUdpConnInfo, NfUdpConnRequest, NfUdpOptionsHeader};

pub type NF_STATUS = c_int;
pub type ENDPOINT_ID = u64;

// ───── callback signatures ──────────────────────────────────────────────────

pub type ThreadFn = unsafe extern "C" fn();
pub type EndpointFn = unsafe extern "C" fn(id: ENDPOINT_ID);
pub type TcpConnInfoFn = unsafe extern "C" fn(id: ENDPOINT_ID, info: *mut NfTcpConnInfo);
pub type TcpDataFn = unsafe extern "C" fn(id: ENDPOINT_ID, buf: *const c_char, len: c_int);
pub type UdpConnInfoFn = unsafe extern "C" fn(id: ENDPOINT_ID, info: *mut NfUdpConnInfo);
pub type UdpConnRequestFn = unsafe extern "C" fn(id: ENDPOINT_ID, req: *mut NfUdpConnRequest);
/// `options` points at an `NF_UDP_OPTIONS` header followed by its option bytes.
pub type UdpDataFn = unsafe extern "C" fn(
    id: ENDPOINT_ID,
    remote_address: *const c_uchar,
    buf: *const c_char,
    len: c_int,
    options: *mut NfUdpOptionsHeader,
);

/// `NF_EventHandler` in its C encoding. Field order is ABI.
#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
pub struct NF_EventHandler {
    pub threadStart: Option<ThreadFn>,
    pub threadEnd: Option<ThreadFn>,

    pub tcpConnectRequest: Option<TcpConnInfoFn>,
    pub tcpConnected: Option<TcpConnInfoFn>,
    pub tcpClosed: Option<TcpConnInfoFn>,
    pub tcpReceive: Option<TcpDataFn>,
    pub tcpSend: Option<TcpDataFn>,
    pub tcpCanReceive: Option<EndpointFn>,
    pub tcpCanSend: Option<EndpointFn>,

    pub udpCreated: Option<UdpConnInfoFn>,
    pub udpConnectRequest: Option<UdpConnRequestFn>,
    pub udpClosed: Option<UdpConnInfoFn>,
    pub udpReceive: Option<UdpDataFn>,
    pub udpSend: Option<UdpDataFn>,
    pub udpCanReceive: Option<EndpointFn>,
    pub udpCanSend: Option<EndpointFn>,
}

// ───── exported functions ───────────────────────────────────────────────────

pub type nf_init_fn =
    unsafe extern "C" fn(driver_name: *const c_char, handler: *mut NF_EventHandler) -> NF_STATUS;
pub type nf_free_fn = unsafe extern "C" fn();
pub type nf_registerDriver_fn = unsafe extern "C" fn(driver_name: *const c_char) -> NF_STATUS;
pub type nf_unRegisterDriver_fn = unsafe extern "C" fn(driver_name: *const c_char) -> NF_STATUS;

pub type nf_tcpSetConnectionState_fn =
    unsafe extern "C" fn(id: ENDPOINT_ID, suspended: c_int) -> NF_STATUS;
pub type nf_tcpPostSend_fn =
    unsafe extern "C" fn(id: ENDPOINT_ID, buf: *const c_char, len: c_int) -> NF_STATUS;
pub type nf_tcpPostReceive_fn =
    unsafe extern "C" fn(id: ENDPOINT_ID, buf: *const c_char, len: c_int) -> NF_STATUS;
pub type nf_tcpClose_fn = unsafe extern "C" fn(id: ENDPOINT_ID) -> NF_STATUS;
pub type nf_setTCPTimeout_fn = unsafe extern "C" fn(timeout_ms: u32) -> u32;
pub type nf_tcpDisableFiltering_fn = unsafe extern "C" fn(id: ENDPOINT_ID) -> NF_STATUS;

pub type nf_udpSetConnectionState_fn =
    unsafe extern "C" fn(id: ENDPOINT_ID, suspended: c_int) -> NF_STATUS;
pub type nf_udpPostSend_fn = unsafe extern "C" fn(
    id: ENDPOINT_ID,
    remote_address: *const c_uchar,
    buf: *const c_char,
    len: c_int,
    options: *mut NfUdpOptionsHeader,
) -> NF_STATUS;
pub type nf_udpPostReceive_fn = nf_udpPostSend_fn;
pub type nf_udpDisableFiltering_fn = unsafe extern "C" fn(id: ENDPOINT_ID) -> NF_STATUS;

pub type nf_addRule_fn = unsafe extern "C" fn(rule: *mut NfRule, to_head: c_int) -> NF_STATUS;
pub type nf_deleteRules_fn = unsafe extern "C" fn() -> NF_STATUS;
pub type nf_disableFiltering_fn = unsafe extern "C" fn() -> NF_STATUS;
pub type nf_getConnCount_fn = unsafe extern "C" fn() -> u32;
