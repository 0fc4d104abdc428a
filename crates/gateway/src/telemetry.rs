//! Structured logging setup: a layered `tracing_subscriber` registry with
//! a console format selectable at startup. No OpenTelemetry export or
//! flame profiling here -- neither is needed by this process.

use tracing_log::{log::LevelFilter, LogTracer};
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

#[derive(Debug, Clone, Copy)]
pub enum ConsoleLogging {
    Off,
    Pretty,
    Json,
}

pub fn init_telemetry(console_logging: ConsoleLogging) {
    LogTracer::init_with_filter(LevelFilter::Trace).ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(env_filter);

    let result = match console_logging {
        ConsoleLogging::Off => tracing::subscriber::set_global_default(registry),
        ConsoleLogging::Pretty => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().with_target(true).pretty()),
        ),
        ConsoleLogging::Json => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().with_target(true).json()),
        ),
    };

    if let Err(e) = result {
        eprintln!("failed to set global default subscriber: {e:?}");
    }
}
