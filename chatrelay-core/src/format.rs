// ABOUTME: Per-event message templates used when relaying between networks
// ABOUTME: Templates use {name}, {body}, {network} and {actor} placeholders

use serde::{Deserialize, Serialize};

use crate::events::{MessageKind, PresenceChange};
use crate::traits::Network;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Templates {
    pub message: String,
    pub emote: String,
    pub entered: String,
    pub left: String,
    pub disconnected: String,
    pub kicked: String,
    pub banned: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            message: "<{name}> {body}".to_string(),
            emote: "* {name} {body}".to_string(),
            entered: "{network} - {name} entered chat.".to_string(),
            left: "{network} - {name} left chat.".to_string(),
            disconnected: "{network} - {name} disconnected.".to_string(),
            kicked: "{network} - {name} was kicked by {actor}.".to_string(),
            banned: "{network} - {name} was banned by {actor}.".to_string(),
        }
    }
}

impl Templates {
    /// Render a relayed chat line
    pub fn chat_line(&self, kind: MessageKind, name: &str, body: &str) -> String {
        let template = match kind {
            MessageKind::Message => &self.message,
            MessageKind::Emote => &self.emote,
        };
        render(template, &[("name", name), ("body", body)])
    }

    /// Render a presence line. `actor` falls back to "someone" when unknown.
    pub fn presence_line(
        &self,
        network: Network,
        change: PresenceChange,
        name: &str,
        actor: Option<&str>,
    ) -> String {
        let template = match change {
            PresenceChange::Entered => &self.entered,
            PresenceChange::Left => &self.left,
            PresenceChange::Disconnected => &self.disconnected,
            PresenceChange::Kicked => &self.kicked,
            PresenceChange::Banned => &self.banned,
        };
        let network = network.to_string();
        render(
            template,
            &[
                ("network", network.as_str()),
                ("name", name),
                ("actor", actor.unwrap_or("someone")),
            ],
        )
    }
}

/// Single-pass placeholder substitution. Values are never re-scanned, so a
/// user typing "{name}" in a message is relayed literally. A placeholder
/// starts at the `{` nearest its `}`, so "{{name}" renders as "{" + name.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(close) = rest.find('}') {
        let head = &rest[..close];
        match head.rfind('{') {
            Some(open) => {
                out.push_str(&head[..open]);
                let key = &head[open + 1..];
                match vars.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
            }
            None => out.push_str(&rest[..=close]),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}
