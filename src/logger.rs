use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "{}", now.to_rfc3339())
    }
}

fn log_dir() -> Option<PathBuf> {
    let dir = std::env::var("THINKGATE_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"));
    if !dir.exists() {
        if let Err(e) = fs::create_dir_all(&dir) {
            eprintln!("Failed to create log directory {:?}: {}", dir, e);
            return None;
        }
    }
    Some(dir)
}

pub fn init_logger() {
    let _ = tracing_log::LogTracer::init();

    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::Layer::new()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_timer(LocalTimer);

    let registry = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer);

    match log_dir() {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "thinkgate.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::Layer::new()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_timer(LocalTimer);
            let _ = registry.with(file_layer).try_init();
            std::mem::forget(guard);
            info!("Log system initialized (Console + File persistence)");
        }
        None => {
            let _ = registry.try_init();
            warn!("[W-LOG-DIR] file_logging_disabled_console_only");
        }
    }
}
