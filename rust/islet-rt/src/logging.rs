//! Opt-in `tracing` subscriber for hosts that do not install their own.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `ISLET_LOG=islet_rt=debug`.
pub const LOG_ENV: &str = "ISLET_LOG";

static INIT: OnceCell<()> = OnceCell::new();

/// Install a fmt subscriber filtered by `ISLET_LOG` (default `info`).
///
/// Safe to call more than once, and a no-op when the host already set a
/// global subscriber.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
