use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with optional quiet mode.
///
/// When `quiet` is true, only error-level events are emitted.
/// When `quiet` is false, info-level and above events are emitted (default).
pub fn init_logging(quiet: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(EnvFilter::from_default_env().add_directive(default_directive(quiet)))
        .init();
}

fn default_directive(quiet: bool) -> Directive {
    let (directive, fallback) = if quiet {
        ("axmirror_core=error", LevelFilter::ERROR)
    } else {
        ("axmirror_core=info", LevelFilter::INFO)
    };
    directive.parse().unwrap_or_else(|_| fallback.into())
}
