// tests/common/mod.rs

//! In-memory stand-in for `nfapi.dll` that records every call.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nfapi::nfdriver::{EndpointId, NfRule, SockAddrBuf, UdpOptions};
use nfapi::{EventHandler, NfApi, NfError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init(String),
    Free,
    TcpPostSend(EndpointId, Vec<u8>),
    TcpPostReceive(EndpointId, Vec<u8>),
    UdpPostSend(EndpointId, SockAddrBuf, Vec<u8>, UdpOptions),
    UdpPostReceive(EndpointId, SockAddrBuf, Vec<u8>, UdpOptions),
    AddRule(NfRule, bool),
    DeleteRules,
    Other(&'static str),
}

#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<Call>>,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
    /// Make every post fail with `InvalidEndpointId`.
    pub fail_posts: AtomicBool,
    /// Refuse `add_rule` once this many rules have been accepted.
    pub rule_capacity: Mutex<Option<usize>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// The handler passed to `init`, to drive events by hand.
    pub fn handler(&self) -> Arc<dyn EventHandler> {
        self.handler.lock().unwrap().clone().expect("init was not called")
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn post(&self, call: Call) -> Result<()> {
        self.push(call);
        if self.fail_posts.load(Ordering::SeqCst) {
            Err(NfError::InvalidEndpointId)
        } else {
            Ok(())
        }
    }
}

impl NfApi for MockApi {
    fn init(&self, driver_name: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        let mut slot = self.handler.lock().unwrap();
        if slot.is_some() {
            return Err(NfError::AlreadyInitialized);
        }
        *slot = Some(handler);
        self.push(Call::Init(driver_name.to_owned()));
        Ok(())
    }

    fn free(&self) {
        self.handler.lock().unwrap().take();
        self.push(Call::Free);
    }

    fn register_driver(&self, _driver_name: &str) -> Result<()> {
        self.push(Call::Other("register_driver"));
        Ok(())
    }

    fn unregister_driver(&self, _driver_name: &str) -> Result<()> {
        self.push(Call::Other("unregister_driver"));
        Ok(())
    }

    fn tcp_set_connection_state(&self, _id: EndpointId, _suspended: bool) -> Result<()> {
        self.push(Call::Other("tcp_set_connection_state"));
        Ok(())
    }

    fn tcp_post_send(&self, id: EndpointId, data: &[u8]) -> Result<()> {
        self.post(Call::TcpPostSend(id, data.to_vec()))
    }

    fn tcp_post_receive(&self, id: EndpointId, data: &[u8]) -> Result<()> {
        self.post(Call::TcpPostReceive(id, data.to_vec()))
    }

    fn tcp_close(&self, _id: EndpointId) -> Result<()> {
        self.push(Call::Other("tcp_close"));
        Ok(())
    }

    fn set_tcp_timeout(&self, _timeout: Duration) -> Duration {
        nfapi::api::DEFAULT_TCP_TIMEOUT
    }

    fn tcp_disable_filtering(&self, _id: EndpointId) -> Result<()> {
        self.push(Call::Other("tcp_disable_filtering"));
        Ok(())
    }

    fn udp_set_connection_state(&self, _id: EndpointId, _suspended: bool) -> Result<()> {
        self.push(Call::Other("udp_set_connection_state"));
        Ok(())
    }

    fn udp_post_send(
        &self,
        id: EndpointId,
        remote: &SockAddrBuf,
        data: &[u8],
        options: &UdpOptions,
    ) -> Result<()> {
        self.post(Call::UdpPostSend(id, *remote, data.to_vec(), options.clone()))
    }

    fn udp_post_receive(
        &self,
        id: EndpointId,
        remote: &SockAddrBuf,
        data: &[u8],
        options: &UdpOptions,
    ) -> Result<()> {
        self.post(Call::UdpPostReceive(id, *remote, data.to_vec(), options.clone()))
    }

    fn udp_disable_filtering(&self, _id: EndpointId) -> Result<()> {
        self.push(Call::Other("udp_disable_filtering"));
        Ok(())
    }

    fn add_rule(&self, rule: &NfRule, to_head: bool) -> Result<()> {
        let accepted = self.calls().iter().filter(|c| matches!(c, Call::AddRule(..))).count();
        self.push(Call::AddRule(*rule, to_head));
        match *self.rule_capacity.lock().unwrap() {
            Some(cap) if accepted >= cap => Err(NfError::Fail),
            _ => Ok(()),
        }
    }

    fn delete_rules(&self) -> Result<()> {
        self.push(Call::DeleteRules);
        Ok(())
    }

    fn disable_filtering(&self) -> Result<()> {
        self.push(Call::Other("disable_filtering"));
        Ok(())
    }

    fn conn_count(&self) -> u32 {
        0
    }
}
