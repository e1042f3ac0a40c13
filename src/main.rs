use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use wombat_pwa::{
    application::{
        error::AppError,
        interceptor::{NetworkFirst, RequestHandler},
    },
    cache::CacheConfig,
    config,
    infra::{error::InfraError, http, storage, telemetry, upstream::ReqwestFetcher},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let storage = storage::build_storage(&settings.cache)?;
    let fetcher = Arc::new(ReqwestFetcher::new(&settings.upstream)?);
    let cache_config = CacheConfig::from(&settings.cache);

    info!(
        upstream = %fetcher.upstream(),
        cache = %cache_config.cache_name,
        precache_entries = cache_config.precache_manifest.len(),
        "network-first interceptor ready"
    );

    let handler: Arc<dyn RequestHandler> =
        Arc::new(NetworkFirst::new(fetcher, storage, cache_config));
    let router = http::build_router(handler);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
