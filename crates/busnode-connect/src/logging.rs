//! `tracing` subscriber installation.
//!
//! The library itself only emits events through the `tracing` macros.  An
//! embedding program calls [`init`] once at start-up to print them.

use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_level` (`"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`).
///
/// Returns `false` if a global subscriber was already installed; the existing
/// one is left in place.
pub fn init(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init()
        .is_ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
