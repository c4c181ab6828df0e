//! Development helper: install a `tracing` subscriber when `RUST_LOG` is set.

/// Initialize a formatting subscriber filtered by `RUST_LOG`.
///
/// Tests, benches and demos call `trellis::dev_tracing::init_tracing()` to
/// see connection and reactor logs. Does nothing when `RUST_LOG` is unset or
/// a global subscriber is already installed, so calling it from every test
/// is fine.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
