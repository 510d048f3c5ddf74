//! Tracing initialization: compact stdout plus a rotated daily file.
//!
//! stdout stays at INFO and honors `RUST_LOG`; the file layer keeps full
//! metadata for post-session review.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Hold for the process lifetime; dropping it loses buffered file logs.
pub struct TracingGuards {
    _file_guard: WorkerGuard,
}

pub fn init_tracing(service_name: &str) -> TracingGuards {
    let dir = Path::new("logs");
    if !dir.exists() {
        let _ = fs::create_dir_all(dir);
    }

    let file_appender = tracing_appender::rolling::daily("logs", format!("{service_name}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_filter = EnvFilter::new("drishti=debug,info");

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .compact()
        .with_filter(stdout_filter);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!(service = service_name, "tracing initialized");
    TracingGuards {
        _file_guard: file_guard,
    }
}
