use anyhow::Result;
use trimpad_ui::config::{self, UiConfig};

fn main() -> Result<()> {
    let root = config::root_from_env();
    let mut log_cfg = trimpad_logging::fs::read_config(&root);
    let _logging_guards = trimpad_logging::init("trimpad", &root, &log_cfg)?;
    if let Ok(level) = std::env::var("TRIMPAD_LOG_LEVEL") {
        log_cfg.level = level;
        if let Err(err) = trimpad_logging::apply(&log_cfg) {
            tracing::warn!("Ignoring TRIMPAD_LOG_LEVEL: {:#}", err);
        }
    }
    if let Err(err) = trimpad_logging::run_retention(&root, &log_cfg) {
        tracing::warn!("Log retention failed: {:#}", err);
    }

    // Wrap the whole run in a component span for log identity
    let span = tracing::info_span!("trimpad", component = "trimpad");
    let _span_guard = span.enter();

    let mut ui_cfg = UiConfig::load(&root).unwrap_or_else(|err| {
        tracing::warn!("Using default configuration: {:#}", err);
        UiConfig::default()
    });
    ui_cfg.apply_env();

    if let Err(err) = trimpad_ui::run(&ui_cfg) {
        tracing::error!("trimpad failed: {:#}", err);
        return Err(err);
    }
    Ok(())
}
