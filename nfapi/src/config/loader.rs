// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the agent's TOML file, deserializes it into the raw mirror and
//! converts that into the typed runtime `Config`, turning every `[[rules]]`
//! entry into a ready-to-install `NfRule`.

use std::{fs, net::IpAddr, path::Path, path::PathBuf};

use log::Level;

use crate::config::model::{
    ActionName, CaptureSettings, Config, ConfigError, DirectionName, DriverSettings,
    ProtocolName, RawConfig, RawRule, RuleSpec,
};
use crate::nf_log;
use crate::rule::RuleBuilder;
use nfdriver::FilteringFlag;

/// Load and convert the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    nf_log!(Level::Debug, "config", "reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    nf_log!(
        Level::Info,
        "config",
        "loaded {:?}: driver '{}', {} rule(s)",
        path,
        cfg.driver.name,
        cfg.rules.len()
    );
    Ok(cfg)
}

/// Parse and convert TOML text.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;

    let tcp_timeout = raw
        .driver
        .tcp_timeout
        .as_deref()
        .map(|s| humantime::parse_duration(s).map_err(|e| ConfigError::InvalidDuration(s.into(), e)))
        .transpose()?;

    let rules = raw
        .rules
        .iter()
        .enumerate()
        .map(|(index, r)| convert_rule(index, r))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Config {
        driver: DriverSettings {
            name: raw.driver.name,
            library: PathBuf::from(raw.driver.library),
            register: raw.driver.register,
            tcp_timeout,
        },
        logging: raw.logging,
        capture: raw.capture.map(|c| CaptureSettings {
            path: PathBuf::from(c.path),
            queue_capacity: c.queue_capacity,
        }),
        block_processes: raw.policy.block_processes,
        rules,
    })
}

/// Convert one `[[rules]]` entry. `index` is only used in errors.
pub fn convert_rule(index: usize, raw: &RawRule) -> Result<RuleSpec, ConfigError> {
    let mut b = RuleBuilder::new();
    if let Some(p) = &raw.protocol {
        b = b.protocol(p.parse::<ProtocolName>()?.0);
    }
    if let Some(d) = &raw.direction {
        b = b.direction(d.parse::<DirectionName>()?.0);
    }
    if let Some(pid) = raw.process_id {
        b = b.process_id(pid);
    }
    if let Some(port) = raw.local_port {
        b = b.local_port(port);
    }
    if let Some(port) = raw.remote_port {
        b = b.remote_port(port);
    }
    if let Some(a) = &raw.local_address {
        b = match parse_address(a)? {
            (ip, Some(prefix)) => b.local_network(ip, prefix),
            (ip, None) => b.local_address(ip),
        };
    }
    if let Some(a) = &raw.remote_address {
        b = match parse_address(a)? {
            (ip, Some(prefix)) => b.remote_network(ip, prefix),
            (ip, None) => b.remote_address(ip),
        };
    }

    let mut action = FilteringFlag::ALLOW;
    for name in &raw.action {
        action |= name.parse::<ActionName>()?.0;
    }

    let rule = b
        .action(action)
        .build()
        .map_err(|source| ConfigError::Rule { index, source })?;
    Ok(RuleSpec { rule, to_head: raw.to_head })
}

/// `"10.0.0.1"` or `"10.0.0.0/8"`.
fn parse_address(s: &str) -> Result<(IpAddr, Option<u8>), ConfigError> {
    let invalid = || ConfigError::InvalidAddress(s.into());
    match s.split_once('/') {
        Some((ip, prefix)) => Ok((
            ip.trim().parse::<IpAddr>().map_err(|_| invalid())?,
            Some(prefix.trim().parse::<u8>().map_err(|_| invalid())?),
        )),
        None => Ok((s.trim().parse::<IpAddr>().map_err(|_| invalid())?, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_forms() {
        assert_eq!(parse_address("10.0.0.0/8").unwrap(), ("10.0.0.0".parse().unwrap(), Some(8)));
        assert_eq!(parse_address("::1").unwrap(), ("::1".parse().unwrap(), None));
        assert!(matches!(parse_address("10.0.0/8"), Err(ConfigError::InvalidAddress(_))));
        assert!(matches!(parse_address("10.0.0.0/x"), Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn actions_combine() {
        let raw = RawRule {
            action: vec!["filter".into(), "INDICATE_CONNECT_REQUESTS".into()],
            ..Default::default()
        };
        let spec = convert_rule(0, &raw).unwrap();
        assert_eq!(
            spec.rule.filtering_flag(),
            FilteringFlag::FILTER | FilteringFlag::INDICATE_CONNECT_REQUESTS
        );
    }
}
