//! Logging setup.
//!
//! Library code logs through `tracing`; binaries call [`init`] once at startup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "pastewatch=info,pastewatch_client=info";

/// Install a global `tracing` subscriber honouring `RUST_LOG`.
///
/// Calling it twice is harmless; the second installation is ignored.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_target(false)
        .try_init();
}
