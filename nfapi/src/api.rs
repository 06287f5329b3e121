// src/api.rs

//! The exported operations of the filtering library as a trait, so the
//! session and handler code can run against the real DLL or a test double.

use std::sync::Arc;
use std::time::Duration;

use nfdriver::{EndpointId, NfRule, SockAddrBuf, UdpOptions};

use crate::handler::EventHandler;
use crate::status::Result;

/// Default `nf_setTCPTimeout` value of the library.
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(30);

pub trait NfApi: Send + Sync {
    /// Connect to `driver_name` and start delivering events to `handler`.
    fn init(&self, driver_name: &str, handler: Arc<dyn EventHandler>) -> Result<()>;
    /// Stop filtering and release the handler.
    fn free(&self);

    /// Create the driver service entry in the registry.
    fn register_driver(&self, driver_name: &str) -> Result<()>;
    fn unregister_driver(&self, driver_name: &str) -> Result<()>;

    /// Suspend or resume indicating TCP sends and receives.
    fn tcp_set_connection_state(&self, id: EndpointId, suspended: bool) -> Result<()>;
    fn tcp_post_send(&self, id: EndpointId, data: &[u8]) -> Result<()>;
    fn tcp_post_receive(&self, id: EndpointId, data: &[u8]) -> Result<()>;
    fn tcp_close(&self, id: EndpointId) -> Result<()>;
    /// Set the timeout for TCP calls; returns the previous value.
    fn set_tcp_timeout(&self, timeout: Duration) -> Duration;
    /// Stop indicating this connection's packets; it keeps flowing unfiltered.
    fn tcp_disable_filtering(&self, id: EndpointId) -> Result<()>;

    fn udp_set_connection_state(&self, id: EndpointId, suspended: bool) -> Result<()>;
    fn udp_post_send(
        &self,
        id: EndpointId,
        remote: &SockAddrBuf,
        data: &[u8],
        options: &UdpOptions,
    ) -> Result<()>;
    fn udp_post_receive(
        &self,
        id: EndpointId,
        remote: &SockAddrBuf,
        data: &[u8],
        options: &UdpOptions,
    ) -> Result<()>;
    fn udp_disable_filtering(&self, id: EndpointId) -> Result<()>;

    /// Add a rule to the head or tail of the driver's list.
    fn add_rule(&self, rule: &NfRule, to_head: bool) -> Result<()>;
    fn delete_rules(&self) -> Result<()>;
    /// Drop every rule and stop filtering new connections.
    fn disable_filtering(&self) -> Result<()>;
    /// Number of connections currently filtered.
    fn conn_count(&self) -> u32;
}
