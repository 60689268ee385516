use anyhow::Result;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, Layer};

/// Maps repeated `-v` flags to a default level, unless RUST_LOG overrides.
pub fn get_env_filter(verbosity: u8) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbosity {
            0 => tracing_subscriber::filter::LevelFilter::WARN,
            1 => tracing_subscriber::filter::LevelFilter::INFO,
            2 => tracing_subscriber::filter::LevelFilter::DEBUG,
            _ => tracing_subscriber::filter::LevelFilter::TRACE,
        };
        tracing_subscriber::EnvFilter::default().add_directive(level.into())
    })
}

pub fn setup_tracing(verbosity: u8) -> Result<()> {
    let env_filter_layer = get_env_filter(verbosity);
    let log_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr);
    let subscriber =
        tracing_subscriber::Registry::default().with(log_layer.with_filter(env_filter_layer));

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        error!("logger was already initiated, continuing: {:?}", e);
    }
    Ok(())
}
