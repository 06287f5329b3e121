/// Logs a line tagged with the emitting component.
/// Usage:
/// ```rust
/// use log::Level;
/// nfapi::nf_log!(Level::Info, "session", "filtering started");
/// nfapi::nf_log!(Level::Error, "config", "load failed: {}", "missing [driver]");
/// ```
/// The installed `fern` dispatch prefixes timestamp, level, pid and tid, so
/// the record text reads:
/// [session] filtering started
#[macro_export]
macro_rules! nf_log {
    ($level:expr, $component:literal, $fmt:literal $(, $($arg:tt)+)?) => {
        log::log!(
            $level,
            concat!("[", $component, "] ", $fmt)
            $(, $($arg)+)?
        );
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    /// A tiny in-memory logger that captures up to DEBUG.
    struct MemoryLogger {
        buffer: Mutex<String>,
    }

    impl MemoryLogger {
        const fn new() -> Self {
            MemoryLogger { buffer: Mutex::new(String::new()) }
        }

        fn take(&self) -> String {
            std::mem::take(&mut *self.buffer.lock().unwrap())
        }
    }

    static LOGGER: MemoryLogger = MemoryLogger::new();

    impl Log for MemoryLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }
        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                let mut buf = self.buffer.lock().unwrap();
                buf.push_str(&format!("{}\n", record.args()));
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn nf_log_tags_component() {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Debug);
        LOGGER.take();

        nf_log!(Level::Debug, "passthrough", "endpoint {} closed", 42);
        nf_log!(Level::Info, "session", "started");

        let output = LOGGER.take();
        assert!(output.contains("[passthrough] endpoint 42 closed"), "missing payload: {}", output);
        assert!(output.contains("[session] started"), "missing plain form: {}", output);
    }
}
