use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use serenity::all::{
    ChannelId, Client as SerenityClient, ConnectionStage, Context as SerenityContext,
    CreateAttachment, CreateEmbed, CreateMessage, EventHandler as SerenityEventHandler,
    GatewayIntents, GetMessages, Http, Message as SerenityMessage, MessageId, Ready,
    ResumedEvent, ShardStageUpdateEvent,
};
use serenity::cache::Cache;
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::media::HttpSession;
use crate::mirror::{
    Attachment, ChatMessage, DispatchError, MirrorCore, MirrorGateway, MirrorPayload,
};

const READY_TIMEOUT_SECONDS: u64 = 30;

#[derive(Clone)]
pub struct DiscordClient {
    config: Arc<Config>,
    session: Arc<HttpSession>,
    login_state: Arc<AsyncMutex<DiscordLoginState>>,
    mirror: Arc<RwLock<Option<Arc<MirrorCore>>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
    cache: Arc<RwLock<Option<Arc<Cache>>>>,
}

/// A running gateway connection. `stopped` fires when the serenity client
/// returns, whatever the reason.
#[derive(Default)]
struct DiscordLoginState {
    gateway_task: Option<JoinHandle<()>>,
    stopped: Option<oneshot::Receiver<()>>,
}

struct MirrorEventHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
    cache: Arc<RwLock<Option<Arc<Cache>>>>,
    mirror: Arc<RwLock<Option<Arc<MirrorCore>>>>,
    session: Arc<HttpSession>,
    dispatch_lock: AsyncMutex<()>,
}

#[serenity::async_trait]
impl SerenityEventHandler for MirrorEventHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({})",
            ready.user.name, ready.user.id
        );
        *self.http.write().await = Some(ctx.http.clone());
        *self.cache.write().await = Some(ctx.cache.clone());

        apply_session_transition(&self.session, SessionTransition::Open).await;

        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
    }

    async fn resume(&self, _ctx: SerenityContext, _event: ResumedEvent) {
        debug!("discord gateway session resumed");
        apply_session_transition(&self.session, SessionTransition::Open).await;
    }

    async fn shard_stage_update(&self, _ctx: SerenityContext, event: ShardStageUpdateEvent) {
        debug!(
            "discord shard {:?} stage {:?} -> {:?}",
            event.shard_id, event.old, event.new
        );
        apply_session_transition(&self.session, stage_transition(&event.new)).await;
    }

    async fn message(&self, _ctx: SerenityContext, msg: SerenityMessage) {
        if msg.author.bot {
            return;
        }

        let mirror = self.mirror.read().await.clone();
        let Some(mirror) = mirror else {
            debug!("ignoring discord message before mirror binding");
            return;
        };

        // one message at a time; order across messages is best-effort since
        // serenity spawns a task per event
        let _guard = self.dispatch_lock.lock().await;
        mirror.handle_message(chat_message_from(&msg)).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTransition {
    Open,
    Close,
    Keep,
}

fn stage_transition(stage: &ConnectionStage) -> SessionTransition {
    match stage {
        ConnectionStage::Disconnected => SessionTransition::Close,
        _ => SessionTransition::Keep,
    }
}

async fn apply_session_transition(session: &HttpSession, transition: SessionTransition) {
    match transition {
        SessionTransition::Open => {
            if let Err(err) = session.open().await {
                error!("failed to open attachment http session: {err}");
            }
        }
        SessionTransition::Close => {
            session.close().await;
        }
        SessionTransition::Keep => {}
    }
}

pub(crate) fn mirror_intents() -> GatewayIntents {
    GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT
}

fn chat_message_from(msg: &SerenityMessage) -> ChatMessage {
    let role_ids = msg
        .member
        .as_ref()
        .map(|member| member.roles.iter().map(|role_id| role_id.get()).collect())
        .unwrap_or_default();

    ChatMessage {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        author_name: msg.author.name.clone(),
        author_is_bot: msg.author.bot,
        content: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|attachment| Attachment::from_url(attachment.url.clone()))
            .collect(),
        embeds: msg.embeds.clone(),
        role_ids,
    }
}

fn build_create_message(payload: MirrorPayload) -> CreateMessage {
    let mut builder = CreateMessage::new();

    if let Some(content) = payload.content {
        builder = builder.content(content);
    }

    if !payload.files.is_empty() {
        builder = builder.add_files(
            payload
                .files
                .into_iter()
                .map(|file| CreateAttachment::bytes(file.data, file.filename)),
        );
    }

    if !payload.embeds.is_empty() {
        builder = builder.embeds(payload.embeds.into_iter().map(CreateEmbed::from).collect());
    }

    builder
}

fn classify_discord_error(err: serenity::Error) -> DispatchError {
    match err {
        serenity::Error::Http(http_err) => {
            let status = http_err.status_code().map(|status| status.as_u16());
            classify_http_failure(status, http_err.to_string())
        }
        other => DispatchError::Unexpected(anyhow!(other)),
    }
}

fn classify_http_failure(status: Option<u16>, detail: String) -> DispatchError {
    match status {
        Some(403) => DispatchError::Forbidden(detail),
        _ => DispatchError::Api(detail),
    }
}

/// Looks the channel up in the gateway cache, then over REST on a miss.
async fn channel_reachable(cache: Option<&Arc<Cache>>, http: &Arc<Http>, channel_id: u64) -> bool {
    let channel = ChannelId::new(channel_id);
    let lookup = match cache {
        Some(cache) => channel.to_channel((cache, http.as_ref())).await,
        None => channel.to_channel(http).await,
    };

    match lookup {
        Ok(_) => true,
        Err(err) => {
            debug!("failed to resolve discord channel {}: {}", channel_id, err);
            false
        }
    }
}

/// Aborts the gateway task and waits for it. Returns whether it was still
/// running.
async fn abort_gateway_task(task: JoinHandle<()>) -> bool {
    task.abort();
    match task.await {
        Ok(()) => {
            debug!("discord gateway task had already exited");
            false
        }
        Err(join_err) if join_err.is_cancelled() => {
            info!("discord gateway task aborted");
            true
        }
        Err(join_err) => {
            error!("discord gateway task panicked: {join_err}");
            false
        }
    }
}

impl DiscordClient {
    pub async fn new(config: Arc<Config>, session: Arc<HttpSession>) -> Result<Self> {
        info!("initializing discord client");
        Ok(Self {
            config,
            session,
            login_state: Arc::new(AsyncMutex::new(DiscordLoginState::default())),
            mirror: Arc::new(RwLock::new(None)),
            http: Arc::new(RwLock::new(None)),
            cache: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn set_mirror(&self, mirror: Arc<MirrorCore>) {
        *self.mirror.write().await = Some(mirror);
    }

    /// Connects to the gateway and waits for Ready. A second call while
    /// connected is a no-op.
    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.gateway_task.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let mut gateway_client =
            SerenityClient::builder(self.config.discord.bot_token.expose_secret(), mirror_intents())
                .event_handler(self.event_handler(ready_tx))
                .await
                .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let (stopped_tx, stopped_rx) = oneshot::channel();
        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start().await {
                error!("discord gateway stopped: {err}");
            }
            let _ = stopped_tx.send(());
        });

        let failure = match tokio::time::timeout(Duration::from_secs(READY_TIMEOUT_SECONDS), ready_rx)
            .await
        {
            Ok(Ok(())) => {
                state.gateway_task = Some(gateway_task);
                state.stopped = Some(stopped_rx);
                info!("mirror bot connected to the discord gateway");
                return Ok(());
            }
            Ok(Err(_)) => "discord gateway exited before receiving Ready event",
            Err(_) => "timed out waiting for discord Ready event",
        };

        abort_gateway_task(gateway_task).await;
        Err(anyhow!(failure))
    }

    /// Logs in and returns once the gateway connection has ended for good.
    pub async fn run(&self) -> Result<()> {
        self.login().await?;

        let stopped = self.login_state.lock().await.stopped.take();
        if let Some(stopped) = stopped {
            let _ = stopped.await;
        }

        warn!("discord gateway connection ended");
        self.session.close().await;
        Ok(())
    }

    /// Tears down the gateway connection, if any, and the attachment session.
    pub async fn stop(&self) -> Result<()> {
        let gateway_task = self.login_state.lock().await.gateway_task.take();
        if let Some(gateway_task) = gateway_task {
            abort_gateway_task(gateway_task).await;
        }

        self.session.close().await;
        info!("discord client stopped");
        Ok(())
    }

    fn event_handler(&self, ready_tx: oneshot::Sender<()>) -> MirrorEventHandler {
        MirrorEventHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            http: self.http.clone(),
            cache: self.cache.clone(),
            mirror: self.mirror.clone(),
            session: self.session.clone(),
            dispatch_lock: AsyncMutex::new(()),
        }
    }

    async fn http(&self) -> Result<Arc<Http>, DispatchError> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| DispatchError::Unexpected(anyhow!("discord http client not available")))
    }
}

#[async_trait]
impl MirrorGateway for DiscordClient {
    async fn resolve_channel(&self, channel_id: u64) -> bool {
        let Ok(http) = self.http().await else {
            warn!("discord http client not available, cannot resolve channel {}", channel_id);
            return false;
        };

        let cache = self.cache.read().await.clone();
        channel_reachable(cache.as_ref(), &http, channel_id).await
    }

    async fn send_payload(
        &self,
        channel_id: u64,
        payload: MirrorPayload,
    ) -> Result<(), DispatchError> {
        let http = self.http().await?;
        let files = payload.files.len();

        let message = ChannelId::new(channel_id)
            .send_message(&http, build_create_message(payload))
            .await
            .map_err(classify_discord_error)?;

        debug!(
            "sent mirrored message to channel {}, message_id={} files={}",
            channel_id, message.id, files
        );
        Ok(())
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<(), DispatchError> {
        let http = self.http().await?;

        ChannelId::new(channel_id)
            .send_message(&http, CreateMessage::new().content(content))
            .await
            .map_err(classify_discord_error)?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel_id: u64,
        before: u64,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, DispatchError> {
        let http = self.http().await?;

        let mut messages = ChannelId::new(channel_id)
            .messages(
                &http,
                GetMessages::new().before(MessageId::new(before)).limit(limit),
            )
            .await
            .map_err(classify_discord_error)?;

        // discord returns newest first
        messages.reverse();
        Ok(messages.iter().map(chat_message_from).collect())
    }
}
