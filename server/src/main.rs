mod config;
mod services;

use clap::Parser;
use cloudjob::{JobOrchestrator, RemoteExecutionChannel};
use config::ServerArgs;
use protobuf::remote_jobs_server::RemoteJobsServer;
use services::jobservice::RemoteJobsService;
use std::net::SocketAddr;
use tonic::transport::{Server, ServerTlsConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();
    args.validate()?;
    let catalog = args.provider_catalog()?;
    let tls = args.tls_config()?;
    tracing::info!(providers = ?catalog.provider_names(), "providers available");

    let channel = RemoteExecutionChannel::over_ssh();
    let orchestrator = match args.max_active_jobs {
        Some(limit) => {
            JobOrchestrator::spawn_limited(catalog, channel, args.message_capacity, limit)
        }
        None => JobOrchestrator::spawn(catalog, channel, args.message_capacity),
    };
    serve(args.listen, tls, orchestrator).await
}

async fn serve(
    addr: SocketAddr,
    tls: Option<ServerTlsConfig>,
    orchestrator: JobOrchestrator,
) -> Result<(), Box<dyn std::error::Error>> {
    let job_service = RemoteJobsService::new(orchestrator);

    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder.tls_config(tls)?;
    }
    tracing::info!(%addr, "listening");

    builder
        .add_service(RemoteJobsServer::new(job_service))
        .serve(addr)
        .await?;

    Ok(())
}
