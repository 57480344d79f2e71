//! objforged - HTTP front end for the objforge gateway.
//!
//! ## Endpoints
//!
//! - `POST /upload`: store an image (multipart field `image`) and run the submit engine
//! - `POST /generate-obj/{filename}`: derive the mesh and download it
//! - `POST /jobs/{filename}`, `GET /jobs/{id}`, `GET /jobs/{id}/artifact`: queued derives
//! - `GET /health`, `GET /metrics`

mod cli;
mod http;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use objforge_core::telemetry::{init_tracing, level_for};
use objforge_core::{Gateway, JobQueue, METRICS};
use tracing::{info, warn};

use cli::Cli;
use http::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for(cli.verbose));

    let config = cli.gateway_config().context("invalid configuration")?;
    info!(
        upload_dir = %config.upload_dir.display(),
        output_dir = %config.output_dir.display(),
        submit_engine = %config.submit_engine,
        derive_engine = %config.derive_engine,
        "gateway configured"
    );
    let gateway = Gateway::new(config).context("failed to initialise gateway")?;
    let jobs = JobQueue::spawn(gateway.clone(), cli.job_workers, cli.queue_capacity)
        .with_retention(cli.job_retention);

    let state = Arc::new(AppState {
        gateway,
        jobs,
        max_upload_bytes: cli.max_upload_bytes,
    });

    let make_svc = make_service_fn(move |_conn| {
        let state = Arc::clone(&state);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| http::handle(req, Arc::clone(&state))))
        }
    });

    let server = Server::try_bind(&cli.bind)
        .with_context(|| format!("failed to bind {}", cli.bind))?
        .serve(make_svc);
    info!(addr = %cli.bind, version = objforge_core::VERSION, "objforged listening");

    server
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    METRICS.flush();
    info!("objforged stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
