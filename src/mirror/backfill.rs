use tracing::{debug, error, info};

use super::{ChatMessage, MirrorCore, RelayError, is_authorized, log_relay_error};

/// How many recent source messages one `!Update` replays.
pub const BACKFILL_COUNT: u8 = 2;

pub const BACKFILL_DENIED_REPLY: &str = "You do not have permission to use this command.";

pub fn backfill_done_reply() -> String {
    format!("Mirrored the last {BACKFILL_COUNT} messages.")
}

impl MirrorCore {
    /// Replays the most recent source messages preceding `command` through
    /// the regular relay path, oldest first.
    pub async fn handle_backfill_command(&self, command: &ChatMessage) {
        if !is_authorized(command, &self.authorized_roles) {
            debug!(
                "backfill command denied channel_id={} author={}",
                command.channel_id, command.author_name
            );
            self.reply(command.channel_id, BACKFILL_DENIED_REPLY).await;
            return;
        }

        for channel_id in [self.source_channel_id, self.target_channel_id] {
            if !self.gateway.resolve_channel(channel_id).await {
                error!(
                    "backfill aborted: channel {} not found or missing permissions",
                    channel_id
                );
                return;
            }
        }

        let history = match self
            .gateway
            .recent_messages(self.source_channel_id, command.id, BACKFILL_COUNT)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                error!(
                    "backfill aborted: failed to read source channel {}: {}",
                    self.source_channel_id, err
                );
                return;
            }
        };

        info!(
            "backfill started by {} replaying {} message(s)",
            command.author_name,
            history.len()
        );

        for message in &history {
            if message.author_is_bot {
                debug!("backfill skipping bot message message_id={}", message.id);
                continue;
            }
            if let Err(err) = self.relay(message).await {
                log_relay_error(message.id, &err);
                if matches!(err, RelayError::ChannelUnavailable(_)) {
                    return;
                }
            }
        }

        self.reply(command.channel_id, &backfill_done_reply()).await;
    }

    async fn reply(&self, channel_id: u64, content: &str) {
        if let Err(err) = self.gateway.send_text(channel_id, content).await {
            error!("failed to reply in channel {}: {}", channel_id, err);
        }
    }
}
