// ABOUTME: Root library module for the Steam/IRC/Slack relay binary
// ABOUTME: Concrete network adapters plus re-exports of the platform-agnostic core

pub mod cli;
pub mod logging;
pub mod platform;
pub mod reconnect;

// Re-export platform-agnostic modules from chatrelay-core
pub use chatrelay_core::config;
pub use chatrelay_core::events;
pub use chatrelay_core::paths;
pub use chatrelay_core::relay;
pub use chatrelay_core::router;
pub use chatrelay_core::traits;

pub use chatrelay_core::{InboundEvent, Network, RelaySink, Router, SteamSupervisor};
