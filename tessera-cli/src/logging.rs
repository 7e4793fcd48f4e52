//! Subscriber setup. Records from the `log` facade used by the library
//! crates are bridged into the same subscriber.

use tessera_core::settings;

/// `RUST_LOG` if set, else `debug` with `--verbose`, else `logging.level`.
pub fn init(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let configured = settings::load()
        .map(|s| s.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    let fallback = if verbose { "debug".to_string() } else { configured };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
