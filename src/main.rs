//! Service entry point for linkarr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use linkarr_core::{
    AppState, CatalogClient, Database, DownloadManager, DownloadRepository, HttpAgentClient,
    LinkVerifier, SearchService, TmdbClient, router, serve,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Arc::new(args.into_settings());
    settings.validate()?;
    debug!(
        catalog = %settings.catalog_base_url,
        agent = %settings.agent_url,
        download_dir = %settings.download_dir.display(),
        "Settings resolved"
    );
    info!(version = env!("CARGO_PKG_VERSION"), "Linkarr starting");

    let credentials = settings.catalog_credentials();
    if credentials.is_none() {
        warn!("Catalog credentials not configured; searches will return no results");
    }
    let options = settings.http_options();

    let db = Database::new(&settings.database_path())
        .await
        .with_context(|| format!("opening database in {}", settings.data_dir.display()))?;
    let catalog = Arc::new(CatalogClient::new(
        &settings.catalog_base_url,
        credentials,
        options,
    )?);
    let verifier = LinkVerifier::new(catalog.clone());
    let search = SearchService::new(catalog.clone(), verifier, settings.search_limits());
    let tmdb = Arc::new(TmdbClient::new(
        &settings.tmdb_base_url,
        settings.tmdb_api_key.clone(),
        options,
    )?);
    let agent = Arc::new(HttpAgentClient::new(&settings.agent_url, options)?);
    let downloads = Arc::new(
        DownloadManager::new(
            agent,
            DownloadRepository::new(db.clone()),
            settings.download_dir.clone(),
        )
        .await?
        .with_failed_retention(settings.failed_retention()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = tokio::spawn(
        downloads
            .clone()
            .run_reconciler(settings.reconcile_interval(), shutdown_rx),
    );

    let state = AppState::new(settings.clone(), search, tmdb, downloads, catalog)?;
    let address = settings.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(address = %address, public_url = %settings.public_url, "Listening");

    serve(listener, router(state), async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "Could not listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    })
    .await?;

    let _ = shutdown_tx.send(true);
    if let Err(error) = reconciler.await {
        warn!(error = %error, "Reconciliation loop ended abnormally");
    }
    db.close().await;
    info!("Linkarr stopped");
    Ok(())
}
