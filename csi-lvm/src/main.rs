mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use libcsi::metadata::{ApiServerClient, ApiServerConfig};
use libcsi::transport::client::CsiClient;
use libcsi::transport::server::CsiServer;
use libcsi::transport::tls;
use libcsi::{CsiMessage, LvmDriver, LvmDriverConfig};
use liblvmd::GrpcConnector;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, ClientArgs, Command, LogFormat, ServeArgs};

fn init_tracing(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, &cli.log_level);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Probe(args) => probe(args).await,
        Command::DeleteVolume { client, volume_id } => delete_volume(client, volume_id).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let api = match &args.api_server {
        Some(url) => ApiServerConfig {
            url: url.clone(),
            token_file: args.api_token_file.clone(),
            ca_file: args.api_ca_file.clone(),
            insecure_skip_tls_verify: args.api_insecure,
        },
        None => ApiServerConfig::in_cluster().context("no --api-server and not in a cluster")?,
    };
    let metadata = ApiServerClient::new(&api).context("build API server client")?;
    let connector = GrpcConnector::new(Duration::from_secs(args.connect_timeout));

    let mut config = LvmDriverConfig::new(&args.node_id);
    config.driver_name = args.driver_name.clone();
    config.volume_group = args.vg_name.clone();
    config.lvmd_port = args.lvmd_port;
    let driver = LvmDriver::new(config, Arc::new(metadata), Arc::new(connector));

    let tls_config = tls::server_config(&args.tls_cert, &args.tls_key)
        .await
        .context("load server TLS material")?;
    let server = Arc::new(CsiServer::new(args.endpoint, tls_config, Arc::new(driver))?);
    info!(
        node = %args.node_id,
        volume_group = %args.vg_name,
        api_server = %api.url,
        "csi-lvm started"
    );

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve().await })
    };
    tokio::signal::ctrl_c().await.context("wait for shutdown signal")?;
    info!("shutting down");
    server.shutdown();
    if let Err(e) = serving.await? {
        warn!(error = %e, "server loop ended with error");
    }
    Ok(())
}

async fn connect(args: &ClientArgs) -> Result<CsiClient> {
    let tls_config = tls::client_config(&args.ca_cert)
        .await
        .context("load CA certificate")?;
    Ok(CsiClient::connect(args.server, &args.server_name, tls_config).await?)
}

async fn probe(args: ClientArgs) -> Result<()> {
    let client = connect(&args).await?;
    let response = client.call(&CsiMessage::Probe).await?;
    client.close();
    match response {
        CsiMessage::ProbeResult(true) => {
            println!("ready");
            Ok(())
        }
        CsiMessage::ProbeResult(false) => bail!("plugin not ready"),
        other => bail!("unexpected response: {other}"),
    }
}

async fn delete_volume(args: ClientArgs, volume_id: String) -> Result<()> {
    let client = connect(&args).await?;
    let response = client
        .call(&CsiMessage::DeleteVolume(volume_id.clone().into()))
        .await?;
    client.close();
    match response {
        CsiMessage::Ok => {
            println!("deleted {volume_id}");
            Ok(())
        }
        other => bail!("unexpected response: {other}"),
    }
}
