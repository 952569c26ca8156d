// ABOUTME: Conversion between Slack message markup and the plain text relayed elsewhere
// ABOUTME: Decodes <@user|name>, <#channel|name>, <url|label> and HTML entities; escapes outbound text

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn link_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"<([^<>]+)>").ok())
        .as_ref()
}

/// Turn Slack markup into plain text. `resolve_user` maps a user ID to a
/// display name for mentions that carry no label.
pub fn to_plain<F>(text: &str, resolve_user: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let replaced = match link_pattern() {
        Some(re) => re
            .replace_all(text, |caps: &Captures| {
                render_link(caps.get(1).map_or("", |m| m.as_str()), &resolve_user)
            })
            .into_owned(),
        None => text.to_string(),
    };
    unescape(&replaced)
}

fn render_link<F>(inner: &str, resolve_user: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let (target, label) = match inner.split_once('|') {
        Some((target, label)) => (target, Some(label)),
        None => (inner, None),
    };

    if let Some(user) = target.strip_prefix('@') {
        let name = label
            .map(str::to_string)
            .or_else(|| resolve_user(user))
            .unwrap_or_else(|| user.to_string());
        return format!("@{}", name);
    }
    if let Some(channel) = target.strip_prefix('#') {
        return format!("#{}", label.unwrap_or(channel));
    }
    if let Some(special) = target.strip_prefix('!') {
        // <!here>, <!channel>, <!subteam^ID|@team>
        return match label {
            Some(label) => label.to_string(),
            None => format!("@{}", special),
        };
    }

    let url = target.strip_prefix("mailto:").unwrap_or(target);
    match label {
        Some(label) if label != url => format!("{} ({})", label, url),
        _ => url.to_string(),
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Escape the three characters Slack treats as markup
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_users(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_labelled_mention() {
        assert_eq!(to_plain("hi <@U123|alice>", no_users), "hi @alice");
    }

    #[test]
    fn test_bare_mention_is_resolved() {
        let resolve = |id: &str| (id == "U123").then(|| "alice".to_string());
        assert_eq!(to_plain("<@U123> <@U999>", resolve), "@alice @U999");
    }

    #[test]
    fn test_channels_and_specials() {
        assert_eq!(
            to_plain("<#C01|general> <!here>", no_users),
            "#general @here"
        );
    }

    #[test]
    fn test_links() {
        assert_eq!(
            to_plain("<https://example.com>", no_users),
            "https://example.com"
        );
        assert_eq!(
            to_plain("<https://example.com|the site>", no_users),
            "the site (https://example.com)"
        );
        assert_eq!(
            to_plain("<mailto:a@b.c|a@b.c>", no_users),
            "a@b.c"
        );
    }

    #[test]
    fn test_entities_round_trip() {
        let original = "<bob> says a & b > c";
        let escaped = escape(original);
        assert_eq!(escaped, "&lt;bob&gt; says a &amp; b &gt; c");
        assert_eq!(to_plain(&escaped, no_users), original);
    }
}
