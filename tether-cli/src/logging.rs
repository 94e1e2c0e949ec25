use tracing_subscriber::{fmt, EnvFilter};

/// Logs go to stderr so command output on stdout stays parseable.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
