use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogFormat;

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let base = fmt::layer().with_target(true);
    let fmt_layer = match format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Text => base.boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
