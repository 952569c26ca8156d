// ABOUTME: Inbound event vocabulary produced by the network adapters
// ABOUTME: One enum per network, wrapped in InboundEvent for the single relay channel

use crate::traits::Network;

/// How a chat line was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Message,
    Emote,
}

/// Membership change of a user in the relayed room/channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Entered,
    Left,
    Disconnected,
    Kicked,
    Banned,
}

/// Moderation rights of a Steam chat member
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatPermissions {
    pub kick: bool,
    pub ban: bool,
}

/// A known member of the Steam chat room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamMember {
    /// 64-bit SteamID rendered as a decimal string
    pub id: String,
    pub name: String,
    pub permissions: ChatPermissions,
}

/// Events from the Steam sidecar
#[derive(Debug, Clone, PartialEq)]
pub enum SteamEvent {
    LoggedOn,
    LoggedOff {
        reason: String,
    },
    /// Updated server list, persisted verbatim
    Servers(serde_json::Value),
    /// New sentry blob, persisted verbatim
    Sentry(Vec<u8>),
    /// Roster update for a chat member
    Member {
        room: String,
        member: SteamMember,
    },
    ChatMessage {
        room: String,
        chatter: String,
        body: String,
        kind: MessageKind,
    },
    MemberState {
        room: String,
        acted_on: String,
        acted_by: Option<String>,
        change: PresenceChange,
    },
}

/// Events from the IRC connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    Registered,
    Disconnected {
        reason: String,
    },
    Message {
        channel: String,
        nick: String,
        body: String,
        kind: MessageKind,
        /// Whether the sender holds channel operator (or half-op) status
        is_operator: bool,
    },
    Presence {
        channel: String,
        nick: String,
        change: PresenceChange,
        actor: Option<String>,
    },
}

/// Events from the Slack Socket Mode listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackEvent {
    /// Socket Mode is up and the relayed channel name resolved to `channel_id`
    Connected { channel_id: String },
    Message {
        channel_id: String,
        user_id: String,
        /// Resolved display name; `None` when users.info failed
        user_name: Option<String>,
        /// Workspace admin or owner
        is_admin: bool,
        /// Text with Slack markup already decoded
        text: String,
    },
}

/// Any event entering the relay loop
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Steam(SteamEvent),
    Irc(IrcEvent),
    Slack(SlackEvent),
}

impl InboundEvent {
    /// Network the event originated from
    pub fn network(&self) -> Network {
        match self {
            InboundEvent::Steam(_) => Network::Steam,
            InboundEvent::Irc(_) => Network::Irc,
            InboundEvent::Slack(_) => Network::Slack,
        }
    }
}

impl From<SteamEvent> for InboundEvent {
    fn from(event: SteamEvent) -> Self {
        InboundEvent::Steam(event)
    }
}

impl From<IrcEvent> for InboundEvent {
    fn from(event: IrcEvent) -> Self {
        InboundEvent::Irc(event)
    }
}

impl From<SlackEvent> for InboundEvent {
    fn from(event: SlackEvent) -> Self {
        InboundEvent::Slack(event)
    }
}
