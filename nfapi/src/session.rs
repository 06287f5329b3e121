// src/session.rs

//! Scoped filtering session: `nf_init` on start, `nf_free` on drop.

use std::sync::Arc;

use log::Level;

use crate::api::NfApi;
use crate::config::RuleSpec;
use crate::handler::EventHandler;
use crate::nf_log;
use crate::status::Result;

pub struct Session {
    api: Arc<dyn NfApi>,
    driver_name: String,
}

impl Session {
    /// Attach `handler` to the driver. Fails if another session is active.
    pub fn start(
        api: Arc<dyn NfApi>,
        driver_name: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        api.init(driver_name, handler)?;
        nf_log!(Level::Info, "session", "filtering started on driver '{}'", driver_name);
        Ok(Self { api, driver_name: driver_name.to_owned() })
    }

    pub fn api(&self) -> &Arc<dyn NfApi> {
        &self.api
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Add `rules` in order. If one is refused, every rule is removed again
    /// before the error is returned.
    pub fn install_rules(&self, rules: &[RuleSpec]) -> Result<()> {
        for (i, spec) in rules.iter().enumerate() {
            if let Err(e) = self.api.add_rule(&spec.rule, spec.to_head) {
                nf_log!(Level::Error, "session", "rule #{} refused: {}", i, e);
                if let Err(undo) = self.api.delete_rules() {
                    nf_log!(Level::Warn, "session", "rolling back rules: {}", undo);
                }
                return Err(e);
            }
        }
        nf_log!(Level::Info, "session", "installed {} rule(s)", rules.len());
        Ok(())
    }

    /// Equivalent to dropping the session.
    pub fn stop(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.api.free();
        nf_log!(Level::Info, "session", "filtering stopped on driver '{}'", self.driver_name);
    }
}
