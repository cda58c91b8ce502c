use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "opsecret=info";

/// Install the global subscriber. Logs go to stderr; stdout carries output.
///
/// A valid, non-empty `RUST_LOG` replaces the `opsecret=info` default.
pub fn init(json: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_from(rust_log.as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn filter_from(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}
