//! # Logging Setup
//!
//! Library code only emits `tracing` events; it never installs a global
//! subscriber itself (that decision belongs to the host binary). This
//! module provides the one the demo binary (`src/bin/jennynet_demo.rs`)
//! installs, adapted from the teacher's `logging.rs` colorized
//! formatter but simplified: a library-adjacent demo should not force
//! ANSI colour on every consumer's terminal, so this keeps only a
//! compact, env-filterable subscriber.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a process-global `tracing` subscriber reading its filter from
/// `RUST_LOG` (default `info`). Intended for binaries embedding
/// `jennynet`, not for the library itself.
pub fn init_demo_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
