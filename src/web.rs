use std::sync::Arc;

use anyhow::Result;
use salvo::prelude::*;
use tracing::info;

use crate::config::Config;

pub mod handlers;

use self::handlers::liveness::alive;

pub fn create_router() -> Router {
    Router::new().get(alive)
}

/// Uptime endpoint. Runs on its own task and shares nothing with the relay.
#[derive(Clone)]
pub struct WebServer {
    config: Arc<Config>,
}

impl WebServer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!(
            "{}:{}",
            self.config.liveness.bind_address, self.config.liveness.port
        );
        info!("starting liveness server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor).serve(create_router()).await;

        Ok(())
    }
}
