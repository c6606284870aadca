#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use tokio::task::JoinError;
use tracing::{error, info};

mod cli;
mod config;
mod discord;
mod media;
mod mirror;
mod utils;
mod web;

use cli::Cli;
use config::Config;
use media::{AttachmentFetcher, HttpSession};
use mirror::MirrorCore;
use web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(Config::load(cli.config.as_deref())?);
    utils::logging::init_tracing(&config.logging);

    if cli.check_config {
        info!("config is valid");
        return Ok(());
    }

    info!(
        "channel mirror starting up source={} target={}",
        config.mirror.source_channel_id, config.mirror.target_channel_id
    );

    let session = Arc::new(HttpSession::new());
    let fetcher = Arc::new(AttachmentFetcher::new(session.clone()));
    let discord_client = Arc::new(discord::DiscordClient::new(config.clone(), session).await?);

    let mirror = Arc::new(MirrorCore::new(
        &config.mirror,
        discord_client.clone(),
        fetcher.clone(),
    ));
    discord_client.set_mirror(mirror).await;

    let web_server = WebServer::new(config.clone());
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("liveness server error: {}", e);
        }
    });

    let gateway = discord_client.clone();
    let mirror_handle = tokio::spawn(async move { gateway.run().await });

    let outcome = tokio::select! {
        _ = web_handle => Ok(()),
        joined = mirror_handle => gateway_outcome(joined),
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c");
            Ok(())
        },
    };

    discord_client.stop().await?;
    fetcher.session().close().await;

    info!("channel mirror shutting down");
    outcome
}

fn gateway_outcome(joined: Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!("discord client error: {err}");
            Err(err)
        }
        Err(join_err) => Err(anyhow!("discord client task failed: {join_err}")),
    }
}
