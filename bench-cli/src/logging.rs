//! Tracing initialization (§6.6, ambient). `EnvFilter` driven by
//! `LOG_LEVEL` (already layered into `BenchConfig` by
//! `with_env_overrides`), falling back to the `RUST_LOG` convention
//! `tracing-subscriber` understands natively, then `info`. Plain stdout
//! formatting — this binary runs attended or under a process supervisor,
//! never as its own log-rotating daemon.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry().with(fmt::layer().with_target(true)).with(filter).init();
}
