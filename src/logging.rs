//! # Console logging.
//!
//! Installs a `tracing-subscriber` fmt subscriber. The filter comes from
//! `RUST_LOG` when set, else from the `default_filter` argument.
//!
//! ```no_run
//! worklane::logging::init("worklane=debug,info").unwrap();
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Installs the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init(default_filter: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
