//! Diagnostic tracing, configured through `RUST_LOG`.
//!
//! Output goes to stderr so that streamed model text on stdout stays clean.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `verbose` raises the fallback level from `warn` to `taskforge=debug`;
/// an explicit `RUST_LOG` always wins.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        "warn,taskforge=debug,taskforge_llm=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
