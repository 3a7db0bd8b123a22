use std::path::Path;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_log::LogTracer;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::fs::log_dir;

static RELOAD: OnceCell<reload::Handle<EnvFilter, Registry>> = OnceCell::new();

/// Keeps the non-blocking file writer alive. Dropping it flushes pending lines.
pub struct LoggingGuards {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(component: &str, root: &Path, cfg: &LoggingConfig) -> Result<LoggingGuards> {
    let (filter_layer, handle) = reload::Layer::new(build_filter(cfg));
    let _ = RELOAD.set(handle);

    let console_layer = cfg.console.then(|| {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .compact()
    });

    let base = tracing_subscriber::registry()
        .with(filter_layer)
        .with(ErrorLayer::default())
        .with(console_layer);

    let dir = log_dir(root);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        base.try_init().ok();
        let _ = LogTracer::init();
        tracing::warn!("File logging disabled ({}): {}", dir.display(), err);
        return Ok(LoggingGuards { _file_guard: None });
    }

    let appender = tracing_appender::rolling::daily(&dir, component_log_name(component));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_writer(writer);

    base.with(file_layer).try_init().ok();
    let _ = LogTracer::init();

    Ok(LoggingGuards {
        _file_guard: Some(guard),
    })
}

pub fn apply(cfg: &LoggingConfig) -> Result<()> {
    let handle = RELOAD
        .get()
        .ok_or_else(|| anyhow::anyhow!("logging not initialized"))?;
    handle.reload(build_filter(cfg))?;
    Ok(())
}

fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    if !cfg.enabled {
        return EnvFilter::new("off");
    }
    EnvFilter::try_new(cfg.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub(crate) fn component_log_name(component: &str) -> String {
    format!("{component}.log")
}
