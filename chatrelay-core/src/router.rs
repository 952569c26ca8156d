// ABOUTME: Routes inbound events from each network to the other two
// ABOUTME: Formats chat and presence lines, applies moderation commands on the originating network

use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio::time::Instant;

use crate::commands::{parse_moderation, ModerationCommand, Requirement};
use crate::config::{Config, SteamConfig};
use crate::events::{
    InboundEvent, IrcEvent, MessageKind, PresenceChange, SlackEvent, SteamEvent, SteamMember,
};
use crate::format::Templates;
use crate::supervisor::SteamSupervisor;
use crate::traits::{ModerationAction, Network, OutboundMessage, RelaySink, SteamClient};

/// Event router. Owned by the relay loop; every method runs on that one
/// task, so nothing here needs a lock.
pub struct Router<C: SteamClient> {
    steam: SteamSupervisor<C>,
    steam_config: SteamConfig,
    irc: Option<Box<dyn RelaySink>>,
    irc_channel: Option<String>,
    slack: Option<Box<dyn RelaySink>>,
    /// Slack channel ID, known once the adapter reports `Connected`
    slack_channel: Option<String>,
    templates: Templates,
    roster: HashMap<String, SteamMember>,
}

impl<C: SteamClient> Router<C> {
    pub fn new(steam: SteamSupervisor<C>, config: &Config) -> Self {
        Self {
            steam,
            steam_config: config.steam.clone(),
            irc: None,
            irc_channel: None,
            slack: None,
            slack_channel: None,
            templates: config.templates.clone(),
            roster: HashMap::new(),
        }
    }

    /// Attach the IRC sink and the channel it relays
    pub fn with_irc(mut self, sink: Box<dyn RelaySink>, channel: impl Into<String>) -> Self {
        self.irc = Some(sink);
        self.irc_channel = Some(channel.into());
        self
    }

    pub fn with_slack(mut self, sink: Box<dyn RelaySink>) -> Self {
        self.slack = Some(sink);
        self
    }

    pub fn steam(&self) -> &SteamSupervisor<C> {
        &self.steam
    }

    pub fn steam_member(&self, id: &str) -> Option<&SteamMember> {
        self.roster.get(id)
    }

    /// Initial Steam log-on
    pub fn start(&mut self, now: Instant) -> Result<()> {
        self.steam.start(now)
    }

    /// Watchdog tick; returns when the delayed log-on is due, if a reconnect started
    pub fn watchdog_check(&mut self, now: Instant) -> Option<Instant> {
        self.steam.check(now)
    }

    /// Delayed log-on after a forced log-off
    pub fn reconnect_log_on(&mut self) -> Result<()> {
        self.steam.log_on()
    }

    /// Single entry point for inbound events. Failures are contained per
    /// originating network: they are logged and the relay keeps going.
    pub fn dispatch(&mut self, event: InboundEvent, now: Instant) {
        let network = event.network();
        let result = match event {
            InboundEvent::Steam(event) => self.on_steam(event, now),
            InboundEvent::Irc(event) => self.on_irc(event),
            InboundEvent::Slack(event) => self.on_slack(event),
        };

        if let Err(e) = result {
            metrics::counter!("relay_event_errors_total", "network" => network.id()).increment(1);
            let detail = format!("{:#}", e);
            tracing::error!(
                network = %network,
                error = %detail,
                at = %chrono::Utc::now().to_rfc3339(),
                "Failed to handle inbound event"
            );
        }
    }

    // =========================================================================
    // Steam
    // =========================================================================

    fn on_steam(&mut self, event: SteamEvent, now: Instant) -> Result<()> {
        if !matches!(event, SteamEvent::LoggedOff { .. }) {
            self.steam.record_activity(now);
        }

        match event {
            SteamEvent::LoggedOn => {
                tracing::info!("Logged on to Steam");
                let flushed = self.steam.on_logged_on()?;
                if flushed > 0 {
                    tracing::info!(flushed, "Flushed queued Steam messages");
                }
            }
            SteamEvent::LoggedOff { reason } => {
                tracing::warn!(reason = %reason, "Logged off from Steam");
                self.steam.on_logged_off();
            }
            SteamEvent::Servers(servers) => self.steam.store_servers(&servers)?,
            SteamEvent::Sentry(data) => self.steam.store_sentry(&data)?,
            SteamEvent::Member { room, member } => {
                if room == self.steam.chatroom() {
                    self.roster.insert(member.id.clone(), member);
                }
            }
            SteamEvent::ChatMessage {
                room,
                chatter,
                body,
                kind,
            } => {
                if room != self.steam.chatroom() {
                    tracing::debug!(room = %room, "Ignoring Steam message from another room");
                    return Ok(());
                }
                let member = self
                    .roster
                    .get(&chatter)
                    .cloned()
                    .with_context(|| format!("Unknown Steam chatter {} in {}", chatter, room))?;

                let relayed = self.forward_chat(Network::Steam, &member.name, &body, kind);

                let moderated = match parse_moderation(&body) {
                    Some(command) => {
                        let allowed = match command.requirement() {
                            Requirement::None => true,
                            Requirement::Kick => member.permissions.kick,
                            Requirement::Ban => member.permissions.ban,
                        };
                        self.moderate(Network::Steam, command, &member.name, &member.id, allowed)
                    }
                    None => Ok(()),
                };
                combine(relayed, moderated)?;
            }
            SteamEvent::MemberState {
                room,
                acted_on,
                acted_by,
                change,
            } => {
                if room != self.steam.chatroom() {
                    return Ok(());
                }
                let subject = self
                    .roster
                    .get(&acted_on)
                    .map(|m| m.name.clone())
                    .with_context(|| format!("Unknown Steam member {} in {}", acted_on, room))?;
                let label = format!(
                    "{} ({})",
                    subject,
                    self.steam_config.profile_link(&acted_on)
                );
                let actor = acted_by.map(|id| {
                    self.roster
                        .get(&id)
                        .map(|m| m.name.clone())
                        .unwrap_or(id)
                });

                let result =
                    self.forward_presence(Network::Steam, change, &label, actor.as_deref());
                if change != PresenceChange::Entered {
                    self.roster.remove(&acted_on);
                }
                result?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // IRC
    // =========================================================================

    fn on_irc(&mut self, event: IrcEvent) -> Result<()> {
        match event {
            IrcEvent::Registered => tracing::info!("Registered with IRC server"),
            IrcEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "IRC connection lost")
            }
            IrcEvent::Message {
                channel,
                nick,
                body,
                kind,
                is_operator,
            } => {
                if !self.is_irc_channel(&channel) {
                    tracing::debug!(channel = %channel, "Ignoring IRC message outside the relayed channel");
                    return Ok(());
                }

                let relayed = self.forward_chat(Network::Irc, &nick, &body, kind);

                let moderated = match parse_moderation(&body) {
                    Some(command) => {
                        let allowed = command.requirement() == Requirement::None || is_operator;
                        self.moderate(Network::Irc, command, &nick, &nick, allowed)
                    }
                    None => Ok(()),
                };
                combine(relayed, moderated)?;
            }
            IrcEvent::Presence {
                channel,
                nick,
                change,
                actor,
            } => {
                // QUIT carries no channel; the adapter only reports members it saw here
                if !channel.is_empty() && !self.is_irc_channel(&channel) {
                    return Ok(());
                }
                self.forward_presence(Network::Irc, change, &nick, actor.as_deref())?;
            }
        }
        Ok(())
    }

    fn is_irc_channel(&self, channel: &str) -> bool {
        self.irc_channel
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(channel))
    }

    // =========================================================================
    // Slack
    // =========================================================================

    fn on_slack(&mut self, event: SlackEvent) -> Result<()> {
        match event {
            SlackEvent::Connected { channel_id } => {
                tracing::info!(channel_id = %channel_id, "Slack channel resolved");
                self.slack_channel = Some(channel_id);
            }
            SlackEvent::Message {
                channel_id,
                user_id,
                user_name,
                is_admin,
                text,
            } => {
                if self.slack_channel.as_deref() != Some(channel_id.as_str()) {
                    tracing::debug!(channel_id = %channel_id, "Ignoring Slack message outside the relayed channel");
                    return Ok(());
                }
                let name = user_name.with_context(|| format!("Unknown Slack user {}", user_id))?;

                let relayed = self.forward_chat(Network::Slack, &name, &text, MessageKind::Message);

                let moderated = match parse_moderation(&text) {
                    Some(command) => {
                        let allowed = command.requirement() == Requirement::None || is_admin;
                        self.moderate(Network::Slack, command, &name, &user_id, allowed)
                    }
                    None => Ok(()),
                };
                combine(relayed, moderated)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    fn forward_chat(
        &mut self,
        origin: Network,
        name: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<()> {
        let rendered = self.templates.chat_line(kind, name, body);
        self.fan_out(origin, |identity| {
            if identity {
                OutboundMessage::authored(body, name, origin)
            } else {
                OutboundMessage::plain(rendered.clone())
            }
        })
    }

    fn forward_presence(
        &mut self,
        origin: Network,
        change: PresenceChange,
        name: &str,
        actor: Option<&str>,
    ) -> Result<()> {
        let line = self.templates.presence_line(origin, change, name, actor);
        self.fan_out(origin, |_| OutboundMessage::plain(line.clone()))
    }

    /// Deliver to every network except `origin`. Steam goes through the
    /// delivery queue; the others are sent directly. Every target is tried
    /// even if an earlier one fails.
    fn fan_out<F>(&mut self, origin: Network, compose: F) -> Result<()>
    where
        F: Fn(bool) -> OutboundMessage,
    {
        let mut failures = Vec::new();

        if origin != Network::Steam {
            let message = compose(self.steam.client().renders_identity());
            let delivery = self.steam.send(message);
            tracing::trace!(?delivery, from = %origin, "Relayed to Steam");
            metrics::counter!("relay_messages_total", "from" => origin.id(), "to" => "steam")
                .increment(1);
        }

        for sink in [self.irc.as_deref(), self.slack.as_deref()]
            .into_iter()
            .flatten()
        {
            let target = sink.network();
            if target == origin {
                continue;
            }
            match sink.send(compose(sink.renders_identity())) {
                Ok(()) => {
                    metrics::counter!("relay_messages_total", "from" => origin.id(), "to" => target.id())
                        .increment(1);
                }
                Err(e) => failures.push(format!("{}: {:#}", target, e)),
            }
        }

        if !failures.is_empty() {
            anyhow::bail!(
                "Relaying from {} failed for {}",
                origin,
                failures.join("; ")
            );
        }
        Ok(())
    }

    // =========================================================================
    // Moderation
    // =========================================================================

    /// Run a moderation command on the network it was issued on
    fn moderate(
        &mut self,
        origin: Network,
        command: ModerationCommand,
        issuer_name: &str,
        issuer_id: &str,
        allowed: bool,
    ) -> Result<()> {
        if !allowed {
            tracing::debug!(
                network = %origin,
                issuer = %issuer_name,
                command = command.name(),
                "Ignoring moderation command from user without permission"
            );
            return Ok(());
        }

        let reason = format!("requested by {}", issuer_name);
        let actions = match command {
            ModerationCommand::Kick { target } => vec![ModerationAction::Kick { target, reason }],
            ModerationCommand::KickBan { target } => vec![
                ModerationAction::Ban {
                    target: target.clone(),
                },
                ModerationAction::Kick { target, reason },
            ],
            ModerationCommand::Unban { target } => vec![ModerationAction::Unban { target }],
            ModerationCommand::UserList => vec![ModerationAction::ListMembers {
                requester: issuer_id.to_string(),
            }],
        };

        let sink: &dyn RelaySink = match origin {
            Network::Steam => self.steam.client(),
            Network::Irc => self.irc.as_deref().context("IRC is not configured")?,
            Network::Slack => self.slack.as_deref().context("Slack is not configured")?,
        };

        // A failed ban still lets the kick of `.kb` go out
        let mut failures = Vec::new();
        for action in actions {
            let name = action.name();
            match sink.moderate(action) {
                Ok(()) => tracing::info!(
                    network = %origin,
                    issuer = %issuer_name,
                    action = name,
                    "Moderation action issued"
                ),
                Err(e) => failures.push(format!("{} {} failed: {:#}", origin, name, e)),
            }
        }
        if !failures.is_empty() {
            anyhow::bail!(failures.join("; "));
        }
        Ok(())
    }
}

/// Keep both outcomes of a relayed command: the relay and the moderation
/// action run independently and either failure is reported.
fn combine(relayed: Result<()>, moderated: Result<()>) -> Result<()> {
    match (relayed, moderated) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(relay), Err(moderation)) => {
            anyhow::bail!("{:#}; {:#}", relay, moderation)
        }
    }
}
