//! Log output for pipefeed binaries.
//!
//! The filter is taken from `PIPEFEED_LOG` when set, else from `RUST_LOG`,
//! else from the level the binary passes in. Only the first call to
//! [`init_tracing`] installs a subscriber; the rest are no-ops.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "PIPEFEED_LOG";

/// Install the process-wide subscriber writing to stderr.
///
/// With `json` each event is one JSON object per line. `level` only applies
/// when no filter variable is present.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = build_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}
