// ABOUTME: Network adapters for the relay
// ABOUTME: Steam (sidecar process) is always built; IRC and Slack are feature-gated

#[cfg(feature = "irc")]
pub mod irc;
#[cfg(feature = "slack")]
pub mod slack;
pub mod steam;

#[cfg(feature = "irc")]
pub use irc::IrcSink;
#[cfg(feature = "slack")]
pub use slack::SlackSink;
pub use steam::SidecarClient;
