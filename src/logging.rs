//! Subscriber setup for the binary. The library only emits `tracing` events.

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber. `RUST_LOG` wins when set; otherwise the
/// level follows the `debug` setting. Calling this twice is harmless.
pub fn init(debug: bool) {
    let fallback = if debug { "covwatch=debug" } else { "covwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
