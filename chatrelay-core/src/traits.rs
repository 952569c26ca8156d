// ABOUTME: Boundary traits between the relay core and the three network adapters
// ABOUTME: Every adapter exposes send + moderate; Steam additionally exposes its session lifecycle

use anyhow::Result;
use std::fmt;

// =============================================================================
// Networks and outbound content
// =============================================================================

/// The three chat networks bridged by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Steam,
    Irc,
    Slack,
}

impl Network {
    /// Stable lowercase identifier, used as a log field and metrics label
    pub fn id(&self) -> &'static str {
        match self {
            Network::Steam => "steam",
            Network::Irc => "irc",
            Network::Slack => "slack",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Network::Steam => "Steam",
            Network::Irc => "IRC",
            Network::Slack => "Slack",
        };
        f.write_str(label)
    }
}

/// Who said something, for sinks that can show a foreign identity natively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub network: Network,
}

/// A message leaving the relay toward one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Text to post. Already rendered through a template when the target
    /// sink does not render identities itself.
    pub text: String,
    /// Original author, when the message relays a user's chat line
    pub author: Option<Author>,
}

impl OutboundMessage {
    /// A message posted as the relay itself (presence lines, notices)
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: None,
        }
    }

    /// A relayed chat line attributed to a user on another network
    pub fn authored(text: impl Into<String>, name: impl Into<String>, network: Network) -> Self {
        Self {
            text: text.into(),
            author: Some(Author {
                name: name.into(),
                network,
            }),
        }
    }
}

/// Privileged operation performed on the network the command came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    Kick { target: String, reason: String },
    Ban { target: String },
    Unban { target: String },
    /// Deliver the member list privately to `requester`
    ListMembers { requester: String },
}

impl ModerationAction {
    pub fn name(&self) -> &'static str {
        match self {
            ModerationAction::Kick { .. } => "kick",
            ModerationAction::Ban { .. } => "ban",
            ModerationAction::Unban { .. } => "unban",
            ModerationAction::ListMembers { .. } => "list_members",
        }
    }
}

// =============================================================================
// Adapter boundary
// =============================================================================

/// Outbound half of a network adapter.
///
/// Both operations are fire-and-forget: implementations hand the request to
/// their own I/O task and return immediately. An `Err` means the request
/// could not even be handed over (the adapter's task is gone), never that
/// the remote side rejected it.
pub trait RelaySink: Send + Sync {
    /// Which network this sink delivers to
    fn network(&self) -> Network;

    /// Post a message to the relayed channel
    fn send(&self, message: OutboundMessage) -> Result<()>;

    /// Perform a moderation action on the relayed channel
    fn moderate(&self, action: ModerationAction) -> Result<()>;

    /// Whether this sink shows `OutboundMessage::author` itself (e.g. a
    /// username override). When false the router renders the author into
    /// the text.
    fn renders_identity(&self) -> bool {
        false
    }
}

/// Everything needed to open a Steam session
#[derive(Clone, Default)]
pub struct SteamLogOn {
    pub account_name: String,
    pub password: String,
    pub auth_code: Option<String>,
    /// Cached sentry blob from a previous session, if any
    pub sentry: Option<Vec<u8>>,
    /// Cached server list from a previous session, if any
    pub servers: Option<serde_json::Value>,
}

// Custom Debug impl to redact credentials
impl fmt::Debug for SteamLogOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteamLogOn")
            .field("account_name", &self.account_name)
            .field("password", &"[REDACTED]")
            .field("auth_code", &self.auth_code.as_ref().map(|_| "[REDACTED]"))
            .field("sentry", &self.sentry.as_ref().map(|s| s.len()))
            .field("servers", &self.servers.is_some())
            .finish()
    }
}

/// Steam adapter: a sink plus explicit session control for the supervisor
pub trait SteamClient: RelaySink {
    fn log_on(&self, request: SteamLogOn) -> Result<()>;

    fn log_off(&self) -> Result<()>;

    fn set_persona_online(&self) -> Result<()>;

    fn join_chat(&self, room: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_display_and_id() {
        assert_eq!(Network::Steam.to_string(), "Steam");
        assert_eq!(Network::Irc.to_string(), "IRC");
        assert_eq!(Network::Slack.id(), "slack");
    }

    #[test]
    fn test_log_on_debug_redacts_secrets() {
        let request = SteamLogOn {
            account_name: "relaybot".to_string(),
            password: "hunter2".to_string(),
            auth_code: Some("X7Y8Z".to_string()),
            sentry: Some(vec![1, 2, 3]),
            servers: None,
        };
        let debug_str = format!("{:?}", request);
        assert!(debug_str.contains("relaybot"));
        assert!(!debug_str.contains("hunter2"));
        assert!(!debug_str.contains("X7Y8Z"));
    }

    #[test]
    fn test_authored_message_carries_author() {
        let msg = OutboundMessage::authored("hi", "gabe", Network::Steam);
        assert_eq!(msg.author.as_ref().map(|a| a.name.as_str()), Some("gabe"));
        assert!(OutboundMessage::plain("x").author.is_none());
    }
}
