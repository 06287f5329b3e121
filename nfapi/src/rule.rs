// src/rule.rs

//! Typed construction of [`NfRule`] values.

use std::net::IpAddr;

use nfdriver::addr::{apply_mask, encode_ip, family_of, prefix_mask};
use nfdriver::{Direction, FilteringFlag, IpAddrBuf, NfRule, Protocol};

use crate::status::{NfError, Result};

/// Address criterion: a single host, or a network when a prefix is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AddrMatch {
    ip: IpAddr,
    prefix: Option<u8>,
}

/// Builder for [`NfRule`]. Unset criteria match anything.
#[derive(Debug, Clone, Default)]
pub struct RuleBuilder {
    protocol: Protocol,
    process_id: u32,
    direction: Direction,
    local_port: u16,
    remote_port: u16,
    local: Option<AddrMatch>,
    remote: Option<AddrMatch>,
    action: FilteringFlag,
}

impl RuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn process_id(mut self, pid: u32) -> Self {
        self.process_id = pid;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    pub fn local_address(mut self, ip: IpAddr) -> Self {
        self.local = Some(AddrMatch { ip, prefix: None });
        self
    }

    pub fn local_network(mut self, ip: IpAddr, prefix: u8) -> Self {
        self.local = Some(AddrMatch { ip, prefix: Some(prefix) });
        self
    }

    pub fn remote_address(mut self, ip: IpAddr) -> Self {
        self.remote = Some(AddrMatch { ip, prefix: None });
        self
    }

    pub fn remote_network(mut self, ip: IpAddr, prefix: u8) -> Self {
        self.remote = Some(AddrMatch { ip, prefix: Some(prefix) });
        self
    }

    /// Flags applied to matching traffic. Defaults to `ALLOW`.
    pub fn action(mut self, action: FilteringFlag) -> Self {
        self.action = action;
        self
    }

    /// Validate and lay the rule out for the driver: ports in network order,
    /// networks reduced to their base address.
    pub fn build(self) -> Result<NfRule> {
        let family = match (self.local, self.remote) {
            (Some(l), Some(r)) if family_of(&l.ip) != family_of(&r.ip) => {
                return Err(NfError::InvalidArgument(format!(
                    "local {} and remote {} differ in address family",
                    l.ip, r.ip
                )));
            }
            (Some(a), _) | (None, Some(a)) => family_of(&a.ip),
            (None, None) => 0,
        };

        let (local_ip_address, local_ip_address_mask) = address_fields(self.local)?;
        let (remote_ip_address, remote_ip_address_mask) = address_fields(self.remote)?;

        Ok(NfRule {
            protocol: self.protocol as i32,
            process_id: self.process_id,
            direction: self.direction as u8,
            local_port: self.local_port.to_be(),
            remote_port: self.remote_port.to_be(),
            ip_family: family,
            local_ip_address,
            local_ip_address_mask,
            remote_ip_address,
            remote_ip_address_mask,
            filtering_flag: self.action.bits(),
        })
    }
}

fn address_fields(m: Option<AddrMatch>) -> Result<(IpAddrBuf, IpAddrBuf)> {
    let Some(m) = m else {
        return Ok(([0; 16], [0; 16]));
    };
    let ip = encode_ip(&m.ip);
    match m.prefix {
        None => Ok((ip, [0; 16])),
        Some(prefix) => {
            let mask = prefix_mask(family_of(&m.ip), prefix).ok_or_else(|| {
                NfError::InvalidArgument(format!("prefix /{prefix} is too long for {}", m.ip))
            })?;
            Ok((apply_mask(&ip, &mask), mask))
        }
    }
}
