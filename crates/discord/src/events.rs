use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::commands::{
    normalize_command, BotCommandService, CommandParseError, CommandRouter, MessagePayload,
};
use crate::embeds::MessageTemplate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub sequence: Option<u64>,
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready(ReadyEvent),
    MessageCreate(MessagePayload),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> DiscordEventType {
        match self {
            Self::Ready(_) => DiscordEventType::Ready,
            Self::MessageCreate(_) => DiscordEventType::MessageCreate,
            Self::Unsupported { .. } => DiscordEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscordEventType {
    Ready,
    MessageCreate,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuildSummary {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyEvent {
    pub bot_user_id: String,
    pub username: String,
    pub guilds: Vec<GuildSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded { channel_id: String, message: MessageTemplate },
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("command in channel {channel_id} could not be parsed: {source}")]
    Parse {
        channel_id: String,
        #[source]
        source: CommandParseError,
    },
}

impl EventHandlerError {
    /// Channel and text to send back to the author, when there is one.
    pub fn reply(&self) -> Option<(&str, MessageTemplate)> {
        match self {
            Self::Parse { channel_id, source } => Some((
                channel_id.as_str(),
                MessageTemplate::text(format!("Could not read that command: {source}.")),
            )),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> DiscordEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<DiscordEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// The bot's own user id, learned from the READY event.
#[derive(Debug, Default)]
pub struct BotIdentity {
    user_id: RwLock<Option<String>>,
}

impl BotIdentity {
    pub fn set(&self, user_id: &str) {
        if let Ok(mut guard) = self.user_id.write() {
            *guard = Some(user_id.to_owned());
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().ok().and_then(|guard| guard.clone())
    }
}

/// Registers the READY and MESSAGE_CREATE handlers around one shared identity.
pub fn command_dispatcher<S>(service: S, prefix: &str) -> EventDispatcher
where
    S: BotCommandService + 'static,
{
    let identity = Arc::new(BotIdentity::default());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReadyHandler::new(Arc::clone(&identity)));
    dispatcher.register(MessageCreateHandler::new(service, prefix, identity));
    dispatcher
}

pub struct ReadyHandler {
    identity: Arc<BotIdentity>,
}

impl ReadyHandler {
    pub fn new(identity: Arc<BotIdentity>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl EventHandler for ReadyHandler {
    fn event_type(&self) -> DiscordEventType {
        DiscordEventType::Ready
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::Ready(ready) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.identity.set(&ready.bot_user_id);
        info!(
            event_name = "ingress.discord.ready",
            bot_user_id = %ready.bot_user_id,
            username = %ready.username,
            guild_count = ready.guilds.len(),
            "logged in to discord"
        );
        for guild in &ready.guilds {
            info!(
                event_name = "ingress.discord.guild_available",
                guild_id = %guild.id,
                guild_name = %guild.name,
                "bot is in server"
            );
        }
        Ok(HandlerResult::Processed)
    }
}

pub struct MessageCreateHandler<S> {
    router: CommandRouter<S>,
    identity: Arc<BotIdentity>,
}

impl<S> MessageCreateHandler<S>
where
    S: BotCommandService,
{
    pub fn new(service: S, prefix: &str, identity: Arc<BotIdentity>) -> Self {
        Self { router: CommandRouter::new(service, prefix), identity }
    }
}

#[async_trait]
impl<S> EventHandler for MessageCreateHandler<S>
where
    S: BotCommandService + 'static,
{
    fn event_type(&self) -> DiscordEventType {
        DiscordEventType::MessageCreate
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MessageCreate(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let bot_user_id = self.identity.user_id();
        if payload.author_is_bot || bot_user_id.as_deref() == Some(payload.author_id.as_str()) {
            return Ok(HandlerResult::Ignored);
        }

        let channel_id = payload.channel_id.clone();
        let Some(command) =
            normalize_command(payload.clone(), self.router.prefix(), bot_user_id.as_deref())
                .map_err(|source| EventHandlerError::Parse { channel_id: channel_id.clone(), source })?
        else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "ingress.discord.command_received",
            correlation_id = %ctx.correlation_id,
            verb = %command.verb,
            author_id = %command.author_id,
            channel_id = %command.channel_id,
            "command received"
        );

        let message = match self.router.route(&command).await {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    event_name = "ingress.discord.command_failed",
                    correlation_id = %ctx.correlation_id,
                    verb = %command.verb,
                    error = %error,
                    "command failed"
                );
                error.to_message(self.router.prefix(), &command.request_id)
            }
        };
        Ok(HandlerResult::Responded { channel_id, message })
    }
}
