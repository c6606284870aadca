use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::mirror::{Attachment, FetchedFile};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: StatusCode },
    #[error("failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch(&self, attachment: &Attachment) -> Result<FetchedFile, FetchError>;
}

/// HTTP client shared by every attachment download. It lives for one gateway
/// connection: opened on ready, dropped on disconnect, and recreated on the
/// next use after that.
#[derive(Default)]
pub struct HttpSession {
    client: Mutex<Option<Client>>,
}

impl HttpSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self) -> Result<(), reqwest::Error> {
        self.client().await.map(|_| ())
    }

    /// Returns the live client, creating one if the session is closed.
    pub async fn client(&self) -> Result<Client, reqwest::Error> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder().user_agent(USER_AGENT).build()?;
        debug!("opened attachment http session");
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Drops the client and its pooled connections. Returns whether a session
    /// was actually open.
    pub async fn close(&self) -> bool {
        let closed = self.client.lock().await.take().is_some();
        if closed {
            info!("closed attachment http session");
        }
        closed
    }
}

pub struct AttachmentFetcher {
    session: Arc<HttpSession>,
}

impl AttachmentFetcher {
    pub fn new(session: Arc<HttpSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> Arc<HttpSession> {
        self.session.clone()
    }
}

#[async_trait]
impl AttachmentSource for AttachmentFetcher {
    async fn fetch(&self, attachment: &Attachment) -> Result<FetchedFile, FetchError> {
        let url = attachment.url.as_str();
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        debug!("downloading attachment from {}", url);

        let client = self.session.client().await.map_err(transport)?;
        let response = client.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let data = response.bytes().await.map_err(transport)?.to_vec();

        debug!("downloaded {} bytes from {}", data.len(), url);

        Ok(FetchedFile {
            filename: attachment.filename.clone(),
            data,
        })
    }
}
