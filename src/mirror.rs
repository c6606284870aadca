use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::MirrorConfig;
use crate::media::{AttachmentSource, FetchError};

pub mod backfill;
pub mod payload;

pub use self::payload::{
    Attachment, ChatMessage, FetchedFile, MirrorPayload, build_payload, is_authorized,
    is_backfill_command,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing permissions: {0}")]
    Forbidden(String),
    #[error("discord api error: {0}")]
    Api(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("channel {0} not found or missing permissions")]
    ChannelUnavailable(u64),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Outbound side of the chat platform as seen by the relay.
#[async_trait]
pub trait MirrorGateway: Send + Sync {
    /// Whether `channel_id` is visible to the bot.
    async fn resolve_channel(&self, channel_id: u64) -> bool;

    async fn send_payload(
        &self,
        channel_id: u64,
        payload: MirrorPayload,
    ) -> Result<(), DispatchError>;

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<(), DispatchError>;

    /// Up to `limit` messages posted in `channel_id` before `before`, oldest first.
    async fn recent_messages(
        &self,
        channel_id: u64,
        before: u64,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, DispatchError>;
}

pub struct MirrorCore {
    gateway: Arc<dyn MirrorGateway>,
    attachments: Arc<dyn AttachmentSource>,
    source_channel_id: u64,
    target_channel_id: u64,
    authorized_roles: HashSet<u64>,
}

impl MirrorCore {
    pub fn new(
        config: &MirrorConfig,
        gateway: Arc<dyn MirrorGateway>,
        attachments: Arc<dyn AttachmentSource>,
    ) -> Self {
        Self {
            gateway,
            attachments,
            source_channel_id: config.source_channel_id,
            target_channel_id: config.target_channel_id,
            authorized_roles: config.authorized_role_ids.clone(),
        }
    }

    /// Entry point for every inbound message. Never fails; each failure is
    /// logged and confined to this message.
    pub async fn handle_message(&self, message: ChatMessage) {
        if message.author_is_bot {
            return;
        }

        if is_backfill_command(&message.content) {
            debug!(
                "backfill command detected channel_id={} author={}",
                message.channel_id, message.author_name
            );
            self.handle_backfill_command(&message).await;
            return;
        }

        if message.channel_id != self.source_channel_id {
            return;
        }

        let message_id = message.id;
        match self.relay(&message).await {
            Ok(()) => info!(
                "mirrored message message_id={} target={}",
                message_id, self.target_channel_id
            ),
            Err(err) => log_relay_error(message_id, &err),
        }
    }

    /// Transforms `message` and sends it to the target channel. Shared by the
    /// live relay and the backfill command.
    pub(crate) async fn relay(&self, message: &ChatMessage) -> Result<(), RelayError> {
        if !self.gateway.resolve_channel(self.target_channel_id).await {
            return Err(RelayError::ChannelUnavailable(self.target_channel_id));
        }

        let files = self.fetch_attachments(&message.attachments).await;
        let payload = build_payload(message, files);
        if payload.is_empty() {
            debug!("relaying empty message message_id={}", message.id);
        }

        debug!(
            "relay outbound prepared message_id={} content_len={} files={} embeds={}",
            message.id,
            payload.content.as_deref().map_or(0, str::len),
            payload.files.len(),
            payload.embeds.len()
        );

        self.gateway
            .send_payload(self.target_channel_id, payload)
            .await?;
        Ok(())
    }

    /// Fetches every attachment concurrently; failures are logged and left
    /// out, the rest keep their source order.
    async fn fetch_attachments(&self, attachments: &[Attachment]) -> Vec<FetchedFile> {
        let results = join_all(
            attachments
                .iter()
                .map(|attachment| self.attachments.fetch(attachment)),
        )
        .await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(file) => Some(file),
                Err(err @ FetchError::Status { .. }) => {
                    warn!("failed to fetch attachment: {err}");
                    None
                }
                Err(err @ FetchError::Transport { .. }) => {
                    error!("error fetching attachment: {err:?}");
                    None
                }
            })
            .collect()
    }
}

fn log_relay_error(message_id: u64, err: &RelayError) {
    match err {
        RelayError::ChannelUnavailable(channel_id) => error!(
            "target channel {} not found or missing permissions, dropping message_id={}",
            channel_id, message_id
        ),
        RelayError::Dispatch(DispatchError::Forbidden(detail)) => error!(
            "missing permissions sending to target channel message_id={}: {}",
            message_id, detail
        ),
        RelayError::Dispatch(DispatchError::Api(detail)) => error!(
            "discord http error while sending message_id={}: {}",
            message_id, detail
        ),
        RelayError::Dispatch(DispatchError::Unexpected(err)) => error!(
            "unexpected error relaying message_id={}: {:?}",
            message_id, err
        ),
    }
}
