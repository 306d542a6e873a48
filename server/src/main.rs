use clap::Parser;
use stagelink_server::{
    config::{Args, Config, LogFormat},
    serve,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// jemalloc is an allocator that is more efficient for the server.
#[cfg(feature = "jemalloc")]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?.with_args(&args);

    init_logging(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind,
        "Starting stagelink relay"
    );

    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Interrupted, shutting down");
                    shutdown.cancel();
                }
                Err(err) => tracing::error!("Cannot listen for ctrl-c: {err}"),
            }
        }
    });

    serve(&config, shutdown).await?;

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .init(),
    }
}
