//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "lexguard=info,lexguard_core=info";

/// Install the global subscriber.
///
/// Reads `LEXGUARD_LOG` for per-target levels, e.g.
/// `LEXGUARD_LOG=lexguard_core=debug,sqlx=warn`, falling back to
/// `lexguard=info,lexguard_core=info`. Output goes to stderr so CLI stdout
/// stays machine-readable. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("LEXGUARD_LOG")
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .init();
    });
}
