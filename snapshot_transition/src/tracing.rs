use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

/// Installs a global subscriber printing the events `RUST_LOG` selects,
/// tagged with the thread that emitted them so that worker output can be
/// told apart.
///
/// Fails if a global subscriber is already set.
pub fn try_init() -> anyhow::Result<()> {
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}
