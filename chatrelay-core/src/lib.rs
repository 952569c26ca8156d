// ABOUTME: Platform-agnostic core of the Steam/IRC/Slack relay
// ABOUTME: Event vocabulary, adapter traits, delivery queue, watchdog, supervisor and router

pub mod cache;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod events;
pub mod format;
pub mod paths;
pub mod relay;
pub mod router;
pub mod supervisor;
pub mod traits;
pub mod watchdog;

pub use delivery::{ConnectionState, Delivery, DeliveryQueue};
pub use events::{
    ChatPermissions, InboundEvent, IrcEvent, MessageKind, PresenceChange, SlackEvent, SteamEvent,
    SteamMember,
};
pub use router::Router;
pub use supervisor::SteamSupervisor;
pub use traits::{
    Author, ModerationAction, Network, OutboundMessage, RelaySink, SteamClient, SteamLogOn,
};
pub use watchdog::{Watchdog, WatchdogState};
