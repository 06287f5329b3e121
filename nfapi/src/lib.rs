// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

pub mod macros;

pub mod api;
pub mod c_api;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod ffi;
pub mod handler;
pub mod logging;
#[cfg(windows)]
pub mod native;
pub mod passthrough;
pub mod recorder;
pub mod rule;
pub mod session;
pub mod status;
pub mod sys;
pub mod util;

pub use nfdriver;

pub use api::NfApi;
pub use handler::EventHandler;
pub use session::Session;
pub use status::{NfError, NfStatus, Result};
