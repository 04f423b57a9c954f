//! Tracing subscriber setup for the binary.

use tracing_subscriber::{EnvFilter, fmt};

pub const DEFAULT_FILTER: &str = "hubkit=info,hub_backend=info,tower_http=info";
pub const VERBOSE_FILTER: &str = "hubkit=debug,hub_backend=debug,tower_http=debug";

/// `RUST_LOG` wins; otherwise the default (or verbose) directives apply.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    })
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init(verbose: bool, json: bool) {
    let builder = fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}
