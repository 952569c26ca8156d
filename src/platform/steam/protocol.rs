// ABOUTME: Newline-delimited JSON protocol spoken with the Steam sidecar process
// ABOUTME: Commands are tagged by "op", events by "event"; binary sentry data travels as base64

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chatrelay_core::events::{
    ChatPermissions, MessageKind, PresenceChange, SteamEvent, SteamMember,
};
use chatrelay_core::traits::{ModerationAction, SteamLogOn};
use serde::{Deserialize, Serialize};

// =============================================================================
// Commands (relay -> sidecar)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SidecarCommand {
    LogOn {
        account_name: String,
        password: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        auth_code: Option<String>,
        /// Base64 sentry blob
        #[serde(skip_serializing_if = "Option::is_none")]
        sentry: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        servers: Option<serde_json::Value>,
    },
    LogOff,
    SetPersonaOnline,
    JoinChat {
        room: String,
    },
    SendMessage {
        room: String,
        text: String,
    },
    Kick {
        room: String,
        target: String,
    },
    Ban {
        room: String,
        target: String,
    },
    Unban {
        room: String,
        target: String,
    },
    ListMembers {
        room: String,
        requester: String,
    },
}

impl SidecarCommand {
    pub fn log_on(request: SteamLogOn) -> Self {
        SidecarCommand::LogOn {
            account_name: request.account_name,
            password: request.password,
            auth_code: request.auth_code,
            sentry: request.sentry.map(|blob| BASE64.encode(blob)),
            servers: request.servers,
        }
    }

    /// Moderation action scoped to `room`
    pub fn moderation(room: &str, action: ModerationAction) -> Self {
        let room = room.to_string();
        match action {
            ModerationAction::Kick { target, .. } => SidecarCommand::Kick { room, target },
            ModerationAction::Ban { target } => SidecarCommand::Ban { room, target },
            ModerationAction::Unban { target } => SidecarCommand::Unban { room, target },
            ModerationAction::ListMembers { requester } => {
                SidecarCommand::ListMembers { room, requester }
            }
        }
    }

    /// Serialize as one protocol line, newline included
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self).context("Failed to encode sidecar command")?;
        line.push('\n');
        Ok(line)
    }

    pub fn op(&self) -> &'static str {
        match self {
            SidecarCommand::LogOn { .. } => "log_on",
            SidecarCommand::LogOff => "log_off",
            SidecarCommand::SetPersonaOnline => "set_persona_online",
            SidecarCommand::JoinChat { .. } => "join_chat",
            SidecarCommand::SendMessage { .. } => "send_message",
            SidecarCommand::Kick { .. } => "kick",
            SidecarCommand::Ban { .. } => "ban",
            SidecarCommand::Unban { .. } => "unban",
            SidecarCommand::ListMembers { .. } => "list_members",
        }
    }
}

// =============================================================================
// Events (sidecar -> relay)
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireKind {
    #[default]
    Message,
    Emote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireChange {
    Entered,
    Left,
    Disconnected,
    Kicked,
    Banned,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SidecarEvent {
    LoggedOn,
    LoggedOff {
        #[serde(default)]
        reason: String,
    },
    Servers {
        servers: serde_json::Value,
    },
    Sentry {
        data: String,
    },
    Member {
        room: String,
        id: String,
        name: String,
        #[serde(default)]
        can_kick: bool,
        #[serde(default)]
        can_ban: bool,
    },
    ChatMessage {
        room: String,
        chatter: String,
        body: String,
        #[serde(default)]
        kind: WireKind,
    },
    MemberState {
        room: String,
        acted_on: String,
        #[serde(default)]
        acted_by: Option<String>,
        change: WireChange,
    },
    Debug {
        message: String,
    },
}

impl SidecarEvent {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).with_context(|| format!("Malformed sidecar line: {}", line))
    }

    /// Convert to the relay's event vocabulary. `Debug` events have no
    /// counterpart and yield `None`.
    pub fn into_steam_event(self) -> Result<Option<SteamEvent>> {
        let event = match self {
            SidecarEvent::LoggedOn => SteamEvent::LoggedOn,
            SidecarEvent::LoggedOff { reason } => SteamEvent::LoggedOff { reason },
            SidecarEvent::Servers { servers } => SteamEvent::Servers(servers),
            SidecarEvent::Sentry { data } => {
                let blob = BASE64
                    .decode(data.as_bytes())
                    .context("Sentry payload is not valid base64")?;
                SteamEvent::Sentry(blob)
            }
            SidecarEvent::Member {
                room,
                id,
                name,
                can_kick,
                can_ban,
            } => SteamEvent::Member {
                room,
                member: SteamMember {
                    id,
                    name,
                    permissions: ChatPermissions {
                        kick: can_kick,
                        ban: can_ban,
                    },
                },
            },
            SidecarEvent::ChatMessage {
                room,
                chatter,
                body,
                kind,
            } => SteamEvent::ChatMessage {
                room,
                chatter,
                body,
                kind: match kind {
                    WireKind::Message => MessageKind::Message,
                    WireKind::Emote => MessageKind::Emote,
                },
            },
            SidecarEvent::MemberState {
                room,
                acted_on,
                acted_by,
                change,
            } => SteamEvent::MemberState {
                room,
                acted_on,
                acted_by,
                change: match change {
                    WireChange::Entered => PresenceChange::Entered,
                    WireChange::Left => PresenceChange::Left,
                    WireChange::Disconnected => PresenceChange::Disconnected,
                    WireChange::Kicked => PresenceChange::Kicked,
                    WireChange::Banned => PresenceChange::Banned,
                },
            },
            SidecarEvent::Debug { message } => {
                tracing::debug!(target: "steam_sidecar", "{}", message);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}
