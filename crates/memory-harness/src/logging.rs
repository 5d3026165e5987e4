//! Log setup for the `mem` binary.
//!
//! Logs go to stderr so stdout stays parseable (`--json`, `mem load` output
//! consumed by hooks). The filter comes from `MEM_LOG` when set; otherwise
//! `-v` flags pick the level (none: warn, `-v`: info, `-vv`: debug,
//! `-vvv`: trace).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "MEM_LOG";

/// Default filter directive for a verbosity count.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level_for(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
