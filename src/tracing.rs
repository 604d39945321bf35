use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use crate::util::env::env_opt;

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set. `LOG_FORMAT=json` switches to one JSON object per line. Logs go to
/// stderr so stdout stays free for the run report.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = env_opt("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
