// src/main.rs

//! Agent entry-point: Windows service or console fallback.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Open the capture file and spawn its async writer
//! 3. Load `nfapi.dll`, attach the pass-through handler, install rules
//! 4. Wait for Stop / Shutdown (or Ctrl-C on the console)
//! 5. Remove rules, detach from the driver, drain the capture (also when
//!    step 3 fails part way)

// ───── std / 3rd-party imports ──────────────────────────────────────────────
use anyhow::Context;
use chrono::Local;
use std::{
    fs::File,
    future::Future,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::runtime::Runtime;

// ───── local imports ────────────────────────────────────────────────────────
use nfapi::capture::CaptureWriter;
use nfapi::config::{self, Config};
use nfapi::logging::setup_logging;
use nfapi::passthrough::PassthroughHandler;
use nfapi::recorder::{Recorder, run_capture};
use nfapi::{NfApi, Session, util};

// ───── constants ────────────────────────────────────────────────────────────
#[cfg(windows)]
const SERVICE_NAME: &str = "NfAgent";
const CAPTURE_FLUSH_INTERVAL: Duration = Duration::from_millis(250);
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ───── helpers ──────────────────────────────────────────────────────────────

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// Directory that contains the running executable.
fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| fatal!("main", "cannot determine the executable directory"))
}

/// First CLI argument, or `nfagent.toml` next to the executable.
fn config_path(exe_dir: &Path) -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| exe_dir.join("nfagent.toml"))
}

/// `path` as given when absolute, else relative to `base`.
fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

/// Load config and install logging; exits on failure.
fn bootstrap() -> (PathBuf, Config) {
    let exe_dir = exe_dir();
    let cfg = config::load(&config_path(&exe_dir)).unwrap_or_else(|e| fatal!("config", "{}", e));
    setup_logging(&exe_dir, &cfg.logging).unwrap_or_else(|e| fatal!("logging", "{}", e));
    log::info!("Agent bootstrap initiated");
    (exe_dir, cfg)
}

#[cfg(windows)]
fn open_api(exe_dir: &Path, cfg: &Config) -> anyhow::Result<Arc<dyn NfApi>> {
    let path = resolve(exe_dir, &cfg.driver.library);
    let api = nfapi::native::NativeApi::load(&path)?;
    log::info!("Loaded {}", api.library());
    Ok(Arc::new(api))
}

#[cfg(not(windows))]
fn open_api(_exe_dir: &Path, _cfg: &Config) -> anyhow::Result<Arc<dyn NfApi>> {
    anyhow::bail!("the NetFilter driver API is only available on Windows")
}

// ───── agent logic ──────────────────────────────────────────────────────────

/// Run filtering until `shutdown` resolves.
fn run_agent<F: Future<Output = ()>>(exe_dir: &Path, cfg: &Config, shutdown: F) -> anyhow::Result<()> {
    let rt = Runtime::new().context("tokio runtime creation failed")?;

    // 1 ─ Capture
    let mut capture_task = None;
    let recorder = match &cfg.capture {
        Some(c) => {
            let path = resolve(exe_dir, &c.path);
            let file = File::create(&path)
                .with_context(|| format!("creating capture {}", path.display()))?;
            let (recorder, rx) = Recorder::channel(c.queue_capacity);
            let writer = CaptureWriter::new(BufWriter::new(file));
            capture_task = Some(rt.spawn(run_capture(rx, writer, CAPTURE_FLUSH_INTERVAL)));
            log::info!("Capturing to {}", path.display());
            Some(recorder)
        }
        None => None,
    };

    // 2 ─ Driver API, session & rules
    let mut attachment = Attachment::default();
    let result = attach(exe_dir, cfg, recorder.clone(), &mut attachment);

    // 3 ─ Wait for shutdown
    match &result {
        Ok(()) => {
            rt.block_on(shutdown);
            log::warn!("Shutdown initiated");
        }
        Err(e) => log::error!("Startup failed, tearing down: {e:#}"),
    }

    // 4 ─ Teardown
    detach(attachment, cfg);
    if let Some(rec) = &recorder {
        if rec.dropped() > 0 {
            log::warn!("{} event(s) were dropped from the capture", rec.dropped());
        }
    }
    drop(recorder);

    if let Some(task) = capture_task {
        match rt.block_on(async { tokio::time::timeout(CAPTURE_DRAIN_TIMEOUT, task).await }) {
            Ok(Ok(Ok(_))) => {}
            Ok(Ok(Err(e))) => log::error!("capture writer failed: {e}"),
            Ok(Err(e)) => log::error!("capture task aborted: {e}"),
            Err(_) => log::error!("capture did not drain within {:?}", CAPTURE_DRAIN_TIMEOUT),
        }
    }

    if result.is_ok() {
        log::info!("Agent stopped cleanly");
    }
    result
}

/// Driver-side state acquired so far, released by [`detach`].
#[derive(Default)]
struct Attachment {
    api: Option<Arc<dyn NfApi>>,
    registered: bool,
    session: Option<Session>,
}

fn attach(
    exe_dir: &Path,
    cfg: &Config,
    recorder: Option<Recorder>,
    attachment: &mut Attachment,
) -> anyhow::Result<()> {
    if let Err(e) = util::adjust_process_privileges() {
        log::warn!("SeDebugPrivilege unavailable, process names may be missing: {e}");
    }
    let api = attachment.api.insert(open_api(exe_dir, cfg)?).clone();
    if cfg.driver.register {
        api.register_driver(&cfg.driver.name).context("registering driver")?;
        attachment.registered = true;
    }

    let handler = PassthroughHandler::new(api.clone())
        .with_blocked_processes(&cfg.block_processes)
        .with_recorder(recorder);
    let session = Session::start(api.clone(), &cfg.driver.name, Arc::new(handler))
        .context("attaching to driver")?;
    let session = attachment.session.insert(session);

    if let Some(timeout) = cfg.driver.tcp_timeout {
        let previous = api.set_tcp_timeout(timeout);
        log::info!("TCP timeout {:?} (was {:?})", timeout, previous);
    }
    session.install_rules(&cfg.rules).context("installing rules")?;
    log::info!("Agent running, {} connection(s) filtered", api.conn_count());
    Ok(())
}

/// Undo whatever [`attach`] got through, newest first.
fn detach(attachment: Attachment, cfg: &Config) {
    let Attachment { api, registered, session } = attachment;
    if let Some(session) = session {
        if let Err(e) = session.api().delete_rules() {
            log::warn!("deleting rules: {e}");
        }
        drop(session);
    }
    if let (Some(api), true) = (api, registered) {
        if let Err(e) = api.unregister_driver(&cfg.driver.name) {
            log::warn!("unregistering driver: {e}");
        }
    }
}

fn run_console() {
    let (exe_dir, cfg) = bootstrap();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Ctrl-C handler failed: {e}");
        }
    };
    if let Err(e) = run_agent(&exe_dir, &cfg, shutdown) {
        fatal!("agent", "{:#}", e);
    }
}

// ───── service logic ────────────────────────────────────────────────────────

#[cfg(windows)]
mod service {
    use std::{ffi::OsString, sync::mpsc, time::Duration};

    use windows_service::{
        define_windows_service,
        service::{
            ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
            ServiceType,
        },
        service_control_handler::{self, ServiceControlHandlerResult},
        service_dispatcher,
    };

    use super::{SERVICE_NAME, bootstrap, run_agent};

    define_windows_service!(ffi_service_main, service_main);

    /// Hand the process to the SCM. Fails when not launched as a service.
    pub fn start() -> windows_service::Result<()> {
        service_dispatcher::start(SERVICE_NAME, ffi_service_main)
    }

    // Windows SCM entry point.
    fn service_main(_args: Vec<OsString>) {
        let (exe_dir, cfg) = bootstrap();

        let (svc_tx, svc_rx) = mpsc::sync_channel(1);
        let status_handle = match service_control_handler::register(SERVICE_NAME, move |ctrl| {
            match ctrl {
                ServiceControl::Stop | ServiceControl::Shutdown => {
                    log::warn!("Stop requested via SCM");
                    let _ = svc_tx.try_send(());
                    ServiceControlHandlerResult::NoError
                }
                ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
                _ => ServiceControlHandlerResult::NotImplemented,
            }
        }) {
            Ok(h) => h,
            Err(e) => {
                log::error!("SCM registration failed: {e}");
                return;
            }
        };

        let mut status = ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: ServiceState::Running,
            controls_accepted: ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
            exit_code: ServiceExitCode::Win32(0),
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        };
        if let Err(e) = status_handle.set_service_status(status.clone()) {
            log::error!("set_service_status(Running): {e}");
        }

        let shutdown = async move {
            let _ = tokio::task::spawn_blocking(move || svc_rx.recv()).await;
        };
        if let Err(e) = run_agent(&exe_dir, &cfg, shutdown) {
            log::error!("{e:#}");
            status.exit_code = ServiceExitCode::ServiceSpecific(1);
        }

        status.current_state = ServiceState::Stopped;
        if let Err(e) = status_handle.set_service_status(status) {
            log::error!("set_service_status(Stopped): {e}");
        }
    }
}

fn main() {
    // If registering as a service fails, run as a plain console app.
    #[cfg(windows)]
    {
        if let Err(e) = service::start() {
            eprintln!(
                "[{}][ERROR][main] Not a service: {}; falling back to console.",
                Local::now().to_rfc3339(),
                e
            );
            run_console();
        }
    }

    #[cfg(not(windows))]
    {
        eprintln!(
            "[{}][INFO][main] No service manager on this platform, running in the console.",
            Local::now().to_rfc3339()
        );
        run_console();
    }
}
