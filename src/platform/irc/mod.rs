// ABOUTME: IRC adapter: drives the `irc` crate's tokio client for one relayed channel
// ABOUTME: Maps channel traffic to relay events and reads operator status from the client's user lists

use anyhow::{Context, Result};
use chatrelay_core::config::IrcConfig;
use chatrelay_core::events::{InboundEvent, IrcEvent, MessageKind, PresenceChange};
use chatrelay_core::traits::{ModerationAction, Network, OutboundMessage, RelaySink};
use futures_util::StreamExt;
use irc::client::data::{AccessLevel, User};
use irc::client::prelude::{ChannelMode, Client, Command, Config, Message, Mode, Response};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::reconnect::Backoff;

/// Longest text sent in one PRIVMSG, leaving room for the command and target
/// inside the 512-byte line limit
const MAX_TEXT_BYTES: usize = 400;

/// How long the QUIT gets to reach the server on shutdown
const QUIT_FLUSH: Duration = Duration::from_secs(2);

/// Work handed from the relay to the connection task
#[derive(Debug, Clone, PartialEq)]
enum Outbound {
    Message(OutboundMessage),
    Moderate(ModerationAction),
}

/// Outbound half of the IRC adapter
#[derive(Clone)]
pub struct IrcSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl IrcSink {
    /// Spawn the connection task for `config.channel`
    pub fn spawn(config: &IrcConfig, events: mpsc::Sender<InboundEvent>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(config.clone(), rx, events));
        (Self { tx }, handle)
    }

    fn push(&self, item: Outbound) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| anyhow::anyhow!("IRC connection task has stopped"))
    }
}

impl RelaySink for IrcSink {
    fn network(&self) -> Network {
        Network::Irc
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        self.push(Outbound::Message(message))
    }

    fn moderate(&self, action: ModerationAction) -> Result<()> {
        self.push(Outbound::Moderate(action))
    }
}

/// Client settings for one connection. The client joins `channel` itself
/// once the MOTD is over, answers PING and walks `alt_nicks` on collisions.
fn client_config(config: &IrcConfig) -> Config {
    Config {
        nickname: Some(config.nickname.clone()),
        alt_nicks: vec![
            format!("{}_", config.nickname),
            format!("{}__", config.nickname),
        ],
        username: Some(config.username().to_string()),
        realname: Some(config.realname.clone()),
        server: Some(config.server.clone()),
        port: Some(config.port),
        password: config.password.clone(),
        use_tls: Some(config.tls),
        channels: vec![config.channel.clone()],
        ..Config::default()
    }
}

// =============================================================================
// Connection task
// =============================================================================

enum Stop {
    Shutdown,
    RelayGone,
    Lost(String),
}

async fn run(
    config: IrcConfig,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<InboundEvent>,
) {
    let mut backoff = Backoff::default();

    loop {
        let started = Instant::now();
        let reason = match serve(&config, &mut outbound, &events).await {
            Ok(Stop::Shutdown) => {
                tracing::info!(network = "irc", "IRC connection closed");
                return;
            }
            Ok(Stop::RelayGone) => return,
            Ok(Stop::Lost(reason)) => reason,
            Err(e) => format!("{:#}", e),
        };

        let delay = backoff.on_failure(started.elapsed());
        tracing::warn!(
            network = "irc",
            reason = %reason,
            retry_in_secs = delay.as_secs(),
            "IRC connection lost"
        );
        metrics::counter!("irc_disconnects_total").increment(1);
        let lost = IrcEvent::Disconnected { reason };
        if events.send(lost.into()).await.is_err() {
            return;
        }

        let wake = tokio::time::sleep(delay);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                _ = &mut wake => break,
                item = outbound.recv() => match item {
                    Some(_) => tracing::debug!(network = "irc", "Dropping IRC output while disconnected"),
                    None => return,
                },
            }
        }
    }
}

async fn serve(
    config: &IrcConfig,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::Sender<InboundEvent>,
) -> Result<Stop> {
    tracing::info!(server = %config.server, port = config.port, tls = config.tls, "Connecting to IRC");
    let mut client = Client::from_config(client_config(config))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", config.server, config.port))?;
    client.identify().context("Failed to register with the IRC server")?;
    // Polling the stream also flushes the client's outgoing queue
    let mut stream = client.stream().context("IRC client stream unavailable")?;
    let mut channel = RelayChannel::new(&config.channel);

    loop {
        tokio::select! {
            message = stream.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Ok(Stop::Lost(e.to_string())),
                    None => return Ok(Stop::Lost("server closed the connection".to_string())),
                };
                if let Command::ERROR(ref reason) = message.command {
                    return Ok(Stop::Lost(reason.clone()));
                }

                let is_operator = |nick: &str| channel_operator(&client, &config.channel, nick);
                let step = channel.handle(&message, client.current_nickname(), is_operator);
                if step.rejoin {
                    client
                        .send_join(&config.channel)
                        .context("Failed to queue IRC JOIN")?;
                }
                for event in step.events {
                    if events.send(event.into()).await.is_err() {
                        return Ok(Stop::RelayGone);
                    }
                }
            }
            item = outbound.recv() => {
                let Some(item) = item else {
                    let _ = client.send_quit("relay shutting down");
                    let _ = tokio::time::timeout(QUIT_FLUSH, async {
                        while let Some(Ok(_)) = stream.next().await {}
                    })
                    .await;
                    return Ok(Stop::Shutdown);
                };
                if channel.joined {
                    deliver(&client, &config.channel, item)?;
                } else {
                    tracing::debug!(network = "irc", "Not in channel yet, dropping IRC output");
                }
            }
        }
    }
}

fn deliver(client: &Client, channel: &str, item: Outbound) -> Result<()> {
    match item {
        Outbound::Message(message) => {
            for chunk in text_chunks(&message.text) {
                client
                    .send_privmsg(channel, chunk)
                    .context("Failed to queue IRC message")?;
            }
        }
        Outbound::Moderate(ModerationAction::Kick { target, reason }) => {
            let Some(target) = nick_param(&target) else {
                return Ok(());
            };
            let reason = reason.replace(['\r', '\n'], " ");
            client
                .send(Command::KICK(channel.to_string(), target, Some(reason)))
                .context("Failed to queue IRC KICK")?;
        }
        Outbound::Moderate(ModerationAction::Ban { target }) => {
            if let Some(mask) = ban_mask(&target) {
                let modes = vec![Mode::Plus(ChannelMode::Ban, Some(mask))];
                client
                    .send(Command::ChannelMODE(channel.to_string(), modes))
                    .context("Failed to queue IRC ban")?;
            }
        }
        Outbound::Moderate(ModerationAction::Unban { target }) => {
            if let Some(mask) = ban_mask(&target) {
                let modes = vec![Mode::Minus(ChannelMode::Ban, Some(mask))];
                client
                    .send(Command::ChannelMODE(channel.to_string(), modes))
                    .context("Failed to queue IRC unban")?;
            }
        }
        Outbound::Moderate(ModerationAction::ListMembers { requester }) => {
            let Some(requester) = nick_param(&requester) else {
                return Ok(());
            };
            let users = client.list_users(channel).unwrap_or_default();
            for chunk in text_chunks(&member_list(channel, &users)) {
                client
                    .send_notice(&requester, chunk)
                    .context("Failed to queue IRC notice")?;
            }
        }
    }
    Ok(())
}

// =============================================================================
// Channel traffic
// =============================================================================

fn is_operator_level(level: &AccessLevel) -> bool {
    matches!(
        level,
        AccessLevel::Owner | AccessLevel::Admin | AccessLevel::Oper | AccessLevel::HalfOp
    )
}

fn channel_operator(client: &Client, channel: &str, nick: &str) -> bool {
    client.list_users(channel).is_some_and(|users| {
        users.iter().any(|user| {
            user.get_nickname().eq_ignore_ascii_case(nick)
                && is_operator_level(&user.highest_access_level())
        })
    })
}

/// What one server message produced
#[derive(Debug, Default)]
struct Step {
    events: Vec<IrcEvent>,
    rejoin: bool,
}

/// Membership of the relayed channel as seen from the message stream.
/// The client keeps the user lists; this only tracks whether we are in.
struct RelayChannel {
    name: String,
    joined: bool,
}

impl RelayChannel {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            joined: false,
        }
    }

    fn is_channel(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.name)
    }

    fn presence(&self, nick: &str, change: PresenceChange, actor: Option<&str>) -> IrcEvent {
        IrcEvent::Presence {
            channel: self.name.clone(),
            nick: nick.to_string(),
            change,
            actor: actor.map(str::to_string),
        }
    }

    fn handle(&mut self, message: &Message, me: &str, is_operator: impl Fn(&str) -> bool) -> Step {
        let mut step = Step::default();
        let source = message.source_nickname().unwrap_or_default();
        let is_me = source.eq_ignore_ascii_case(me);

        match message.command {
            Command::Response(Response::RPL_WELCOME, _) => {
                step.events.push(IrcEvent::Registered);
            }
            Command::JOIN(ref chanlist, _, _) if self.is_channel(chanlist) => {
                if is_me {
                    tracing::info!(channel = %self.name, "Joined IRC channel");
                    self.joined = true;
                } else {
                    step.events
                        .push(self.presence(source, PresenceChange::Entered, None));
                }
            }
            Command::PART(ref chanlist, _) if self.is_channel(chanlist) => {
                if is_me {
                    self.joined = false;
                } else {
                    step.events.push(self.presence(source, PresenceChange::Left, None));
                }
            }
            // Servers only send QUIT for users sharing a channel with us
            Command::QUIT(_) if !is_me => {
                step.events.push(IrcEvent::Presence {
                    channel: String::new(),
                    nick: source.to_string(),
                    change: PresenceChange::Disconnected,
                    actor: None,
                });
            }
            Command::KICK(ref chanlist, ref target, _) if self.is_channel(chanlist) => {
                if target.eq_ignore_ascii_case(me) {
                    tracing::warn!(by = %source, "Kicked from IRC channel, rejoining");
                    self.joined = false;
                    step.rejoin = true;
                } else {
                    step.events
                        .push(self.presence(target, PresenceChange::Kicked, Some(source)));
                }
            }
            Command::ChannelMODE(ref chan, ref modes) if self.is_channel(chan) => {
                for mode in modes {
                    if let Mode::Plus(ChannelMode::Ban, Some(mask)) = mode {
                        if let Some(nick) = banned_nick(mask) {
                            step.events
                                .push(self.presence(&nick, PresenceChange::Banned, Some(source)));
                        }
                    }
                }
            }
            Command::PRIVMSG(ref target, ref body) if self.is_channel(target) && !is_me => {
                let (kind, text) = decode_body(body);
                // CTCP other than ACTION
                if text.starts_with('\u{1}') {
                    return step;
                }
                step.events.push(IrcEvent::Message {
                    channel: self.name.clone(),
                    nick: source.to_string(),
                    body: text,
                    kind,
                    is_operator: is_operator(source),
                });
            }
            _ => {}
        }
        step
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Split a PRIVMSG body into its kind and text
fn decode_body(body: &str) -> (MessageKind, String) {
    if let Some(action) = body
        .strip_prefix("\u{1}ACTION ")
        .map(|s| s.trim_end_matches('\u{1}'))
    {
        return (MessageKind::Emote, action.to_string());
    }
    (MessageKind::Message, body.to_string())
}

/// One chunk per non-empty line; long lines split on character boundaries
fn text_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        let mut current = String::new();
        for ch in line.chars() {
            if current.len() + ch.len_utf8() > MAX_TEXT_BYTES {
                chunks.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
    }
    chunks
}

/// First word of a nickname argument, stripped of control characters
fn nick_param(value: &str) -> Option<String> {
    value
        .split_whitespace()
        .next()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
}

/// Nick part of a ban mask, unless it is a wildcard
fn banned_nick(mask: &str) -> Option<String> {
    let nick = mask.split('!').next().unwrap_or_default();
    if nick.is_empty() || nick.contains(['*', '?']) {
        None
    } else {
        Some(nick.to_string())
    }
}

/// A bare nickname bans `nick!*@*`; full masks are used as given
fn ban_mask(target: &str) -> Option<String> {
    let target = nick_param(target)?;
    if target.contains(['!', '@']) {
        Some(target)
    } else {
        Some(format!("{}!*@*", target))
    }
}

/// "Users in #chan: @op, +voice, plain", operators first
fn member_list(channel: &str, users: &[User]) -> String {
    let mut members: Vec<(bool, String, String)> = Vec::new();
    for user in users {
        let nick = user.get_nickname();
        let key = nick.to_ascii_lowercase();
        if members.iter().any(|(_, seen, _)| *seen == key) {
            continue;
        }
        let level = user.highest_access_level();
        let symbol = match level {
            AccessLevel::Owner => "~",
            AccessLevel::Admin => "&",
            AccessLevel::Oper => "@",
            AccessLevel::HalfOp => "%",
            AccessLevel::Voice => "+",
            AccessLevel::Member => "",
        };
        members.push((is_operator_level(&level), key, format!("{}{}", symbol, nick)));
    }
    members.sort_by(|(a_op, a, _), (b_op, b, _)| b_op.cmp(a_op).then_with(|| a.cmp(b)));
    let names: Vec<String> = members.into_iter().map(|(_, _, name)| name).collect();
    format!("Users in {}: {}", channel, names.join(", "))
}
