use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan, prelude::*};

const QUIET_TARGETS: [&str; 5] = ["hyper", "h2", "rustls", "reqwest", "reqwest_eventsource"];

fn build_filter(level: &str) -> EnvFilter {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{target}=off").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NONE)
        .event_format(
            tracing_subscriber::fmt::format()
                .compact()
                .without_time()
                .with_ansi(true),
        )
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(build_filter(level)))
        .try_init();
}

#[macro_export]
macro_rules! verbose_log {
    ($verbose:expr, $($arg:tt)*) => {
        if $verbose {
            tracing::info!($($arg)*);
        }
    };
}
