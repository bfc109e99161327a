//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// with `--debug`. `--log-json` switches to one JSON object per line.
pub fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(debug)
        .with_line_number(debug);

    if json {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_ansi(true).init();
    }
}
