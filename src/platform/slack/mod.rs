// ABOUTME: Slack adapter using slack-morphism: Socket Mode for inbound messages, Web API for output
// ABOUTME: Resolves the relayed channel, caches user names and admin flags, posts under foreign identities

pub mod markup;

use anyhow::{Context, Result};
use chatrelay_core::config::SlackConfig;
use chatrelay_core::events::{InboundEvent, SlackEvent};
use chatrelay_core::traits::{ModerationAction, Network, OutboundMessage, RelaySink};
use slack_morphism::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::reconnect::Backoff;

// =============================================================================
// Shared Web API context
// =============================================================================

/// What the relay knows about a Slack user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackUserRecord {
    pub name: String,
    pub is_admin: bool,
}

/// users.info cache. Entries are never evicted; a relay serves one channel.
#[derive(Default)]
struct UserDirectory {
    users: Mutex<HashMap<String, SlackUserRecord>>,
}

impl UserDirectory {
    fn cached(&self, user_id: &str) -> Option<SlackUserRecord> {
        self.users
            .lock()
            .ok()
            .and_then(|users| users.get(user_id).cloned())
    }

    fn remember(&self, user_id: &str, record: SlackUserRecord) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(user_id.to_string(), record);
        }
    }
}

/// Client, token and user cache shared by the listener and the outbound task
#[derive(Clone)]
struct SlackContext {
    client: Arc<SlackHyperClient>,
    bot_token: SlackApiToken,
    users: Arc<UserDirectory>,
}

impl SlackContext {
    /// Resolve a user through the cache, falling back to users.info
    async fn user(&self, user_id: &str) -> Result<SlackUserRecord> {
        if let Some(record) = self.users.cached(user_id) {
            return Ok(record);
        }

        let session = self.client.open_session(&self.bot_token);
        let response = session
            .users_info(&SlackApiUsersInfoRequest::new(user_id.into()))
            .await
            .with_context(|| format!("Failed to call users.info for {}", user_id))?;

        let user = response.user;
        let name = user
            .name
            .clone()
            .or_else(|| user.profile.as_ref().and_then(|p| p.display_name.clone()))
            .filter(|n| !n.is_empty())
            .with_context(|| format!("Slack user {} has no name", user_id))?;
        let record = SlackUserRecord {
            name,
            is_admin: user.flags.is_admin.unwrap_or(false)
                || user.flags.is_owner.unwrap_or(false),
        };

        self.users.remember(user_id, record.clone());
        Ok(record)
    }

    async fn channel_members(&self, channel: &SlackChannelId) -> Result<Vec<String>> {
        let session = self.client.open_session(&self.bot_token);
        let response = session
            .conversations_members(
                &SlackApiConversationsMembersRequest::new().with_channel(channel.clone()),
            )
            .await
            .context("Failed to get Slack channel members")?;
        Ok(response.members.into_iter().map(|id| id.to_string()).collect())
    }
}

// =============================================================================
// Socket Mode callbacks (fn pointers, state via SlackClientEventsUserState)
// =============================================================================

#[derive(Clone)]
struct SlackBridgeState {
    tx: mpsc::Sender<InboundEvent>,
    /// Bot's own user ID, so the relay never echoes itself
    bot_user_id: String,
    context: SlackContext,
}

async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bridge = {
        let guard = states.read().await;
        guard
            .get_user_state::<SlackBridgeState>()
            .cloned()
            .ok_or("SlackBridgeState not found in user state")?
    };

    if let SlackEventCallbackBody::Message(msg_event) = event.event {
        handle_message_event(&bridge, &msg_event).await;
    }
    Ok(())
}

async fn handle_message_event(bridge: &SlackBridgeState, msg_event: &SlackMessageEvent) {
    // Edits, joins, bot posts and other subtypes are not chat lines
    if msg_event.subtype.is_some() || msg_event.sender.bot_id.is_some() {
        return;
    }
    let Some(user_id) = msg_event.sender.user.as_ref().map(|u| u.to_string()) else {
        return;
    };
    if user_id == bridge.bot_user_id {
        return;
    }
    let Some(channel_id) = msg_event.origin.channel.as_ref().map(|c| c.to_string()) else {
        return;
    };
    let raw = msg_event
        .content
        .as_ref()
        .and_then(|c| c.text.as_ref())
        .map(|t| t.to_string())
        .unwrap_or_default();
    if raw.is_empty() {
        return;
    }

    let user = match bridge.context.user(&user_id).await {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::warn!(network = "slack", user_id = %user_id, error = %e, "Could not resolve Slack user");
            None
        }
    };
    let users = &bridge.context.users;
    let text = markup::to_plain(&raw, |id| users.cached(id).map(|u| u.name));

    let event = SlackEvent::Message {
        channel_id,
        user_id,
        user_name: user.as_ref().map(|u| u.name.clone()),
        is_admin: user.is_some_and(|u| u.is_admin),
        text,
    };
    if bridge.tx.send(event.into()).await.is_err() {
        tracing::warn!(network = "slack", "Relay event channel closed");
    }
}

fn socket_mode_error_handler(
    err: Box<dyn std::error::Error + Send + Sync>,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> HttpStatusCode {
    tracing::error!(network = "slack", error = %err, "Socket Mode error");
    HttpStatusCode::OK
}

// =============================================================================
// Sink
// =============================================================================

#[derive(Debug)]
enum Outbound {
    Message(OutboundMessage),
    Kick { target: String },
    ListMembers { requester: String },
}

/// Outbound half of the Slack adapter
#[derive(Clone)]
pub struct SlackSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SlackSink {
    fn push(&self, item: Outbound) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| anyhow::anyhow!("Slack outbound task has stopped"))
    }
}

impl RelaySink for SlackSink {
    fn network(&self) -> Network {
        Network::Slack
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        self.push(Outbound::Message(message))
    }

    fn moderate(&self, action: ModerationAction) -> Result<()> {
        match action {
            ModerationAction::Kick { target, .. } => self.push(Outbound::Kick { target }),
            ModerationAction::ListMembers { requester } => {
                self.push(Outbound::ListMembers { requester })
            }
            ModerationAction::Ban { .. } | ModerationAction::Unban { .. } => {
                anyhow::bail!("Slack channels do not support bans")
            }
        }
    }

    fn renders_identity(&self) -> bool {
        true
    }
}

// =============================================================================
// Connection task
// =============================================================================

/// Start the Slack adapter. Authentication, channel resolution and the
/// Socket Mode connection happen on the returned task, retried with backoff,
/// so a Slack outage at startup never stops the relay. `SlackEvent::Connected`
/// is reported once the channel is known.
pub fn spawn(config: &SlackConfig, events: mpsc::Sender<InboundEvent>) -> (SlackSink, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(config.clone(), events, rx));
    (SlackSink { tx }, handle)
}

/// A live Slack connection: Web API context, relayed channel and the
/// Socket Mode listener feeding the relay
struct Link {
    context: SlackContext,
    channel: SlackChannelId,
    listener: SlackClientSocketModeListener<SlackClientHyperHttpsConnector>,
}

async fn run(
    config: SlackConfig,
    events: mpsc::Sender<InboundEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let icons = Icons {
        steam: config.steam_icon_url.clone(),
        irc: config.irc_icon_url.clone(),
    };
    let mut backoff = Backoff::default();

    loop {
        let started = Instant::now();
        match establish(&config, &events).await {
            Ok(Some(link)) => {
                // slack-morphism keeps the Socket Mode websockets alive from here on
                deliver(&link.context, &link.channel, &icons, &mut outbound).await;
                link.listener.shutdown().await;
                return;
            }
            Ok(None) => return,
            Err(e) => {
                metrics::counter!("slack_connect_failures_total").increment(1);
                let delay = backoff.on_failure(started.elapsed());
                let detail = format!("{:#}", e);
                tracing::error!(
                    network = "slack",
                    error = %detail,
                    retry_in_secs = delay.as_secs(),
                    attempt = backoff.attempts(),
                    "Slack connection failed"
                );

                let wake = tokio::time::sleep(delay);
                tokio::pin!(wake);
                loop {
                    tokio::select! {
                        _ = &mut wake => break,
                        item = outbound.recv() => match item {
                            Some(item) => tracing::debug!(network = "slack", ?item, "Dropping Slack output while disconnected"),
                            None => return,
                        },
                    }
                }
            }
        }
    }
}

/// Authenticate, resolve the channel and start Socket Mode. `Ok(None)` means
/// the relay is gone and the adapter should stop.
async fn establish(config: &SlackConfig, events: &mpsc::Sender<InboundEvent>) -> Result<Option<Link>> {
    let client = Arc::new(SlackClient::new(
        SlackClientHyperConnector::new().context("Failed to create Slack HTTP connector")?,
    ));
    let bot_token = SlackApiToken::new(SlackApiTokenValue(config.bot_token.clone()));
    let app_token = SlackApiToken::new(SlackApiTokenValue(config.app_token.clone()));

    let auth = client
        .open_session(&bot_token)
        .auth_test()
        .await
        .context("Failed to call Slack auth.test, check bot_token")?;
    let bot_user_id = auth.user_id.to_string();
    tracing::info!(bot_user = %bot_user_id, team = %auth.team, "Slack bot authenticated");

    let channel = resolve_channel(&client, &bot_token, config).await?;
    tracing::info!(channel = %config.channel, channel_id = %channel, "Resolved Slack channel");

    let context = SlackContext {
        client: Arc::clone(&client),
        bot_token,
        users: Arc::new(UserDirectory::default()),
    };

    let bridge_state = SlackBridgeState {
        tx: events.clone(),
        bot_user_id,
        context: context.clone(),
    };
    let callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(handle_push_event);
    let listener_environment = Arc::new(
        SlackClientEventsListenerEnvironment::new(client)
            .with_error_handler(socket_mode_error_handler)
            .with_user_state(bridge_state),
    );
    let listener = SlackClientSocketModeListener::new(
        &SlackClientSocketModeConfig::new(),
        listener_environment,
        callbacks,
    );
    listener
        .listen_for(&app_token)
        .await
        .context("Failed to start Socket Mode listener, check app_token")?;
    tracing::info!(network = "slack", "Socket Mode connected");

    let connected = SlackEvent::Connected {
        channel_id: channel.to_string(),
    };
    if events.send(connected.into()).await.is_err() {
        listener.shutdown().await;
        return Ok(None);
    }

    Ok(Some(Link {
        context,
        channel,
        listener,
    }))
}

async fn resolve_channel(
    client: &SlackHyperClient,
    bot_token: &SlackApiToken,
    config: &SlackConfig,
) -> Result<SlackChannelId> {
    let session = client.open_session(bot_token);
    let wanted = config.channel.trim_start_matches('#');
    let mut cursor: Option<SlackCursorId> = None;

    loop {
        let kind = if config.private {
            SlackConversationType::Private
        } else {
            SlackConversationType::Public
        };
        let mut request = SlackApiConversationsListRequest::new()
            .with_types(vec![kind])
            .with_exclude_archived(true)
            .with_limit(200);
        if let Some(next) = cursor.take() {
            request = request.with_cursor(next);
        }

        let response = session
            .conversations_list(&request)
            .await
            .context("Failed to call conversations.list")?;

        if let Some(found) = response.channels.iter().find(|c| {
            c.id.to_string() == wanted || c.name.as_deref() == Some(wanted)
        }) {
            return Ok(found.id.clone());
        }

        cursor = response
            .response_metadata
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.0.is_empty());
        if cursor.is_none() {
            anyhow::bail!(
                "Slack channel {} not found (is the bot a member?)",
                config.channel
            );
        }
    }
}

// =============================================================================
// Outbound task
// =============================================================================

struct Icons {
    steam: Option<String>,
    irc: Option<String>,
}

impl Icons {
    fn for_network(&self, network: Network) -> Option<String> {
        match network {
            Network::Steam => self.steam.clone(),
            Network::Irc => self.irc.clone(),
            Network::Slack => None,
        }
    }
}

async fn deliver(
    context: &SlackContext,
    channel: &SlackChannelId,
    icons: &Icons,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Message(message) => post(context, channel, icons, message).await,
            Outbound::Kick { target } => kick(context, channel, &target).await,
            Outbound::ListMembers { requester } => list_members(context, channel, &requester).await,
        };
        if let Err(e) = result {
            metrics::counter!("slack_api_errors_total").increment(1);
            let detail = format!("{:#}", e);
            tracing::warn!(network = "slack", error = %detail, "Slack API call failed");
        }
    }
    tracing::info!(network = "slack", "Slack outbound task stopped");
}

async fn post(
    context: &SlackContext,
    channel: &SlackChannelId,
    icons: &Icons,
    message: OutboundMessage,
) -> Result<()> {
    let content = SlackMessageContent::new().with_text(markup::escape(&message.text));
    let mut request = SlackApiChatPostMessageRequest::new(channel.clone(), content);
    if let Some(author) = message.author {
        request = request.with_username(author.name);
        if let Some(icon) = icons.for_network(author.network) {
            request = request.with_icon_url(icon);
        }
    }

    context
        .client
        .open_session(&context.bot_token)
        .chat_post_message(&request)
        .await
        .context("Failed to send Slack message")?;
    Ok(())
}

/// Find a channel member by user ID or name (with or without a leading @)
async fn find_member(
    context: &SlackContext,
    channel: &SlackChannelId,
    target: &str,
) -> Result<String> {
    let target = target.trim_start_matches('@');
    for member in context.channel_members(channel).await? {
        if member == target {
            return Ok(member);
        }
        match context.user(&member).await {
            Ok(record) if record.name.eq_ignore_ascii_case(target) => return Ok(member),
            Ok(_) => {}
            Err(e) => tracing::debug!(user_id = %member, error = %e, "Skipping unresolvable member"),
        }
    }
    anyhow::bail!("No Slack channel member matches {}", target)
}

async fn kick(context: &SlackContext, channel: &SlackChannelId, target: &str) -> Result<()> {
    let user_id = find_member(context, channel, target).await?;
    context
        .client
        .open_session(&context.bot_token)
        .conversations_kick(&SlackApiConversationsKickRequest::new(
            channel.clone(),
            user_id.clone().into(),
        ))
        .await
        .with_context(|| format!("Failed to kick {} from Slack channel", user_id))?;
    Ok(())
}

async fn list_members(
    context: &SlackContext,
    channel: &SlackChannelId,
    requester: &str,
) -> Result<()> {
    let mut names = Vec::new();
    for member in context.channel_members(channel).await? {
        match context.user(&member).await {
            Ok(record) => names.push(record.name),
            Err(_) => names.push(member),
        }
    }
    names.sort_by_key(|n| n.to_lowercase());

    let text = format!("Users in this channel: {}", names.join(", "));
    let request = SlackApiChatPostEphemeralRequest::new(
        channel.clone(),
        requester.into(),
        SlackMessageContent::new().with_text(markup::escape(&text)),
    );
    context
        .client
        .open_session(&context.bot_token)
        .chat_post_ephemeral(&request)
        .await
        .context("Failed to send Slack member list")?;
    Ok(())
}
