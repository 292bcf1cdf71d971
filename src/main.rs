use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use redis_series_sink::server::{create_router, AppState};
use redis_series_sink::{connect, RedisStore, RetryPolicy, SeriesSink, SinkConfig};

/// Batched time-series write sink backed by Redis.
#[derive(Parser, Debug)]
#[command(name = "redis-series-sink", about = "Batched time-series write sink backed by Redis")]
struct Cli {
    /// Redis connection URL.
    #[arg(long, env = "SINK_REDIS_URL", default_value = "redis://127.0.0.1:6379/")]
    redis_url: String,

    /// Destination table: key namespace all partitions live under.
    #[arg(long, env = "SINK_TABLE")]
    table: String,

    /// Listen address for the ingest API.
    #[arg(long, env = "SINK_LISTEN", default_value = "0.0.0.0:9201")]
    listen: String,

    /// Maximum items per batch-write call.
    #[arg(long, default_value_t = 25)]
    max_batch_size: usize,

    /// First retry backoff in milliseconds; doubles per attempt.
    #[arg(long, default_value_t = 500)]
    retry_base_ms: u64,

    /// Retry budget in seconds per unprocessed set.
    #[arg(long, default_value_t = 180)]
    retry_max_elapsed_secs: u64,

    /// Cap on concurrently retrying unprocessed sets.
    #[arg(long, default_value_t = 64)]
    retry_max_units: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = SinkConfig {
        table: cli.table,
        max_batch_size: cli.max_batch_size,
        retry: RetryPolicy {
            base_backoff_ms: cli.retry_base_ms,
            max_elapsed_secs: cli.retry_max_elapsed_secs,
            max_units: cli.retry_max_units,
        },
    };
    config.validate()?;

    // One shared multiplexed connection serves the write path and all
    // background retries.
    info!(url = %cli.redis_url, "connecting to Redis");
    let conn = connect(&cli.redis_url)
        .await
        .with_context(|| format!("cannot connect to Redis at {}", cli.redis_url))?;

    let store = RedisStore::new(conn, config.table.clone());
    let state = Arc::new(AppState {
        sink: SeriesSink::new(store, config),
    });

    let app = create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("cannot bind {}", cli.listen))?;

    info!(listen = %cli.listen, "ingest API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Stop in-flight retry units before exiting; anything still pending
    // is logged as dropped.
    state.sink.shutdown().await;

    Ok(())
}
