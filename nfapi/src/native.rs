// src/native.rs

//! [`NfApi`] backed by `nfapi.dll`, resolved at runtime with `LoadLibraryW` /
//! `GetProcAddress` so the build needs no import library.

use std::ffi::c_int;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use std::{io, mem};

use nfdriver::{EndpointId, NfRule, SockAddrBuf, UdpOptions};
use windows_sys::Win32::Foundation::{FreeLibrary, HMODULE};
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use crate::api::NfApi;
use crate::c_api;
use crate::ffi::{c_len, c_string};
use crate::handler::EventHandler;
use crate::status::{NfError, Result, nf_check};
use crate::sys::{self, NF_EventHandler};

/// Every export we call, resolved once at load time.
struct Exports {
    init: sys::nf_init_fn,
    free: sys::nf_free_fn,
    register_driver: sys::nf_registerDriver_fn,
    unregister_driver: sys::nf_unRegisterDriver_fn,
    tcp_set_connection_state: sys::nf_tcpSetConnectionState_fn,
    tcp_post_send: sys::nf_tcpPostSend_fn,
    tcp_post_receive: sys::nf_tcpPostReceive_fn,
    tcp_close: sys::nf_tcpClose_fn,
    set_tcp_timeout: sys::nf_setTCPTimeout_fn,
    tcp_disable_filtering: sys::nf_tcpDisableFiltering_fn,
    udp_set_connection_state: sys::nf_udpSetConnectionState_fn,
    udp_post_send: sys::nf_udpPostSend_fn,
    udp_post_receive: sys::nf_udpPostReceive_fn,
    udp_disable_filtering: sys::nf_udpDisableFiltering_fn,
    add_rule: sys::nf_addRule_fn,
    delete_rules: sys::nf_deleteRules_fn,
    disable_filtering: sys::nf_disableFiltering_fn,
    get_conn_count: sys::nf_getConnCount_fn,
}

pub struct NativeApi {
    module: HMODULE,
    library: String,
    fns: Exports,
    /// The library keeps the pointer passed to `nf_init`; the table must
    /// outlive the session.
    table: Mutex<Option<Box<NF_EventHandler>>>,
}

// The module handle is only passed back to FreeLibrary on drop; the exports
// are thread-safe per the library's contract.
unsafe impl Send for NativeApi {}
unsafe impl Sync for NativeApi {}

impl NativeApi {
    /// Load the library at `path` and resolve all exports.
    pub fn load(path: &Path) -> Result<Self> {
        let library = path.display().to_string();
        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        let module = unsafe { LoadLibraryW(wide.as_ptr()) };
        if module.is_null() {
            return Err(NfError::Load { path: library, source: io::Error::last_os_error() });
        }

        macro_rules! resolve {
            ($name:literal) => {{
                match unsafe { GetProcAddress(module, concat!($name, "\0").as_ptr()) } {
                    // SAFETY: the export has the signature declared in `sys`.
                    Some(f) => unsafe { mem::transmute::<unsafe extern "system" fn() -> isize, _>(f) },
                    None => {
                        unsafe { FreeLibrary(module) };
                        return Err(NfError::MissingSymbol { library, symbol: $name });
                    }
                }
            }};
        }

        let fns = Exports {
            init: resolve!("nf_init"),
            free: resolve!("nf_free"),
            register_driver: resolve!("nf_registerDriver"),
            unregister_driver: resolve!("nf_unRegisterDriver"),
            tcp_set_connection_state: resolve!("nf_tcpSetConnectionState"),
            tcp_post_send: resolve!("nf_tcpPostSend"),
            tcp_post_receive: resolve!("nf_tcpPostReceive"),
            tcp_close: resolve!("nf_tcpClose"),
            set_tcp_timeout: resolve!("nf_setTCPTimeout"),
            tcp_disable_filtering: resolve!("nf_tcpDisableFiltering"),
            udp_set_connection_state: resolve!("nf_udpSetConnectionState"),
            udp_post_send: resolve!("nf_udpPostSend"),
            udp_post_receive: resolve!("nf_udpPostReceive"),
            udp_disable_filtering: resolve!("nf_udpDisableFiltering"),
            add_rule: resolve!("nf_addRule"),
            delete_rules: resolve!("nf_deleteRules"),
            disable_filtering: resolve!("nf_disableFiltering"),
            get_conn_count: resolve!("nf_getConnCount"),
        };

        log::debug!("resolved nfapi exports from {library}");
        Ok(Self { module, library, fns, table: Mutex::new(None) })
    }

    pub fn library(&self) -> &str {
        &self.library
    }
}

impl Drop for NativeApi {
    fn drop(&mut self) {
        unsafe { FreeLibrary(self.module) };
    }
}

impl NfApi for NativeApi {
    fn init(&self, driver_name: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        let name = c_string(driver_name)?;
        let mut table = Box::new(c_api::install(handler)?);
        let status = unsafe { (self.fns.init)(name.as_ptr(), &mut *table) };
        if let Err(e) = nf_check(status) {
            c_api::uninstall();
            return Err(e);
        }
        *self.table.lock().unwrap_or_else(PoisonError::into_inner) = Some(table);
        Ok(())
    }

    fn free(&self) {
        unsafe { (self.fns.free)() };
        c_api::uninstall();
        self.table.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn register_driver(&self, driver_name: &str) -> Result<()> {
        let name = c_string(driver_name)?;
        nf_check(unsafe { (self.fns.register_driver)(name.as_ptr()) })
    }

    fn unregister_driver(&self, driver_name: &str) -> Result<()> {
        let name = c_string(driver_name)?;
        nf_check(unsafe { (self.fns.unregister_driver)(name.as_ptr()) })
    }

    fn tcp_set_connection_state(&self, id: EndpointId, suspended: bool) -> Result<()> {
        nf_check(unsafe { (self.fns.tcp_set_connection_state)(id, c_int::from(suspended)) })
    }

    fn tcp_post_send(&self, id: EndpointId, data: &[u8]) -> Result<()> {
        let len = c_len(data.len())?;
        nf_check(unsafe { (self.fns.tcp_post_send)(id, data.as_ptr().cast(), len) })
    }

    fn tcp_post_receive(&self, id: EndpointId, data: &[u8]) -> Result<()> {
        let len = c_len(data.len())?;
        nf_check(unsafe { (self.fns.tcp_post_receive)(id, data.as_ptr().cast(), len) })
    }

    fn tcp_close(&self, id: EndpointId) -> Result<()> {
        nf_check(unsafe { (self.fns.tcp_close)(id) })
    }

    fn set_tcp_timeout(&self, timeout: Duration) -> Duration {
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let previous = unsafe { (self.fns.set_tcp_timeout)(ms) };
        Duration::from_millis(u64::from(previous))
    }

    fn tcp_disable_filtering(&self, id: EndpointId) -> Result<()> {
        nf_check(unsafe { (self.fns.tcp_disable_filtering)(id) })
    }

    fn udp_set_connection_state(&self, id: EndpointId, suspended: bool) -> Result<()> {
        nf_check(unsafe { (self.fns.udp_set_connection_state)(id, c_int::from(suspended)) })
    }

    fn udp_post_send(
        &self,
        id: EndpointId,
        remote: &SockAddrBuf,
        data: &[u8],
        options: &UdpOptions,
    ) -> Result<()> {
        let len = c_len(data.len())?;
        let mut raw = options.to_raw();
        nf_check(unsafe {
            (self.fns.udp_post_send)(id, remote.as_ptr(), data.as_ptr().cast(), len, raw.as_mut_ptr().cast())
        })
    }

    fn udp_post_receive(
        &self,
        id: EndpointId,
        remote: &SockAddrBuf,
        data: &[u8],
        options: &UdpOptions,
    ) -> Result<()> {
        let len = c_len(data.len())?;
        let mut raw = options.to_raw();
        nf_check(unsafe {
            (self.fns.udp_post_receive)(id, remote.as_ptr(), data.as_ptr().cast(), len, raw.as_mut_ptr().cast())
        })
    }

    fn udp_disable_filtering(&self, id: EndpointId) -> Result<()> {
        nf_check(unsafe { (self.fns.udp_disable_filtering)(id) })
    }

    fn add_rule(&self, rule: &NfRule, to_head: bool) -> Result<()> {
        let mut rule = *rule;
        nf_check(unsafe { (self.fns.add_rule)(&mut rule, c_int::from(to_head)) })
    }

    fn delete_rules(&self) -> Result<()> {
        nf_check(unsafe { (self.fns.delete_rules)() })
    }

    fn disable_filtering(&self) -> Result<()> {
        nf_check(unsafe { (self.fns.disable_filtering)() })
    }

    fn conn_count(&self) -> u32 {
        unsafe { (self.fns.get_conn_count)() }
    }
}
