// ABOUTME: Moderation command parsing for relayed chat lines
// ABOUTME: Recognizes .k, .kb, .unban and .userlist; malformed commands parse to nothing

/// A moderation command recognized in a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationCommand {
    /// `.k <target>`
    Kick { target: String },
    /// `.kb <target>`: ban, then kick
    KickBan { target: String },
    /// `.unban <target>`
    Unban { target: String },
    /// `.userlist`
    UserList,
}

/// What a user needs on the originating network to run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    None,
    Kick,
    Ban,
}

impl ModerationCommand {
    pub fn requirement(&self) -> Requirement {
        match self {
            ModerationCommand::Kick { .. } => Requirement::Kick,
            ModerationCommand::KickBan { .. } | ModerationCommand::Unban { .. } => {
                Requirement::Ban
            }
            ModerationCommand::UserList => Requirement::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModerationCommand::Kick { .. } => ".k",
            ModerationCommand::KickBan { .. } => ".kb",
            ModerationCommand::Unban { .. } => ".unban",
            ModerationCommand::UserList => ".userlist",
        }
    }
}

/// Parse a chat line into a moderation command.
///
/// Only the first whitespace-separated token selects the command; the
/// second token is the target. Returns `None` for ordinary messages and
/// for commands missing their target.
pub fn parse_moderation(body: &str) -> Option<ModerationCommand> {
    let mut parts = body.split_whitespace();
    let head = parts.next()?;
    let target = parts.next().map(str::to_string);

    match head {
        ".k" => target.map(|target| ModerationCommand::Kick { target }),
        ".kb" => target.map(|target| ModerationCommand::KickBan { target }),
        ".unban" => target.map(|target| ModerationCommand::Unban { target }),
        ".userlist" => Some(ModerationCommand::UserList),
        _ => None,
    }
}
