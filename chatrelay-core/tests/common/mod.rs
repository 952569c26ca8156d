// ABOUTME: Shared mocks for chatrelay-core integration tests
// ABOUTME: Recording Steam client and recording IRC/Slack sinks with failure injection

#![allow(dead_code)]

use anyhow::Result;
use chatrelay_core::config::Config;
use chatrelay_core::traits::{
    ModerationAction, Network, OutboundMessage, RelaySink, SteamClient, SteamLogOn,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Everything the core asked the Steam client to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SteamCall {
    LogOn { sentry: Option<Vec<u8>> },
    LogOff,
    SetOnline,
    JoinChat(String),
    Send(String),
    Moderate(ModerationAction),
}

#[derive(Clone, Default)]
pub struct MockSteam {
    calls: Arc<Mutex<Vec<SteamCall>>>,
    fail_sends: Arc<AtomicBool>,
}

impl MockSteam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SteamCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SteamCall::Send(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: fn(&SteamCall) -> bool) -> usize {
        self.calls().iter().filter(|c| wanted(c)).count()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: SteamCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RelaySink for MockSteam {
    fn network(&self) -> Network {
        Network::Steam
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("sidecar is gone");
        }
        self.record(SteamCall::Send(message.text));
        Ok(())
    }

    fn moderate(&self, action: ModerationAction) -> Result<()> {
        self.record(SteamCall::Moderate(action));
        Ok(())
    }
}

impl SteamClient for MockSteam {
    fn log_on(&self, request: SteamLogOn) -> Result<()> {
        self.record(SteamCall::LogOn {
            sentry: request.sentry,
        });
        Ok(())
    }

    fn log_off(&self) -> Result<()> {
        self.record(SteamCall::LogOff);
        Ok(())
    }

    fn set_persona_online(&self) -> Result<()> {
        self.record(SteamCall::SetOnline);
        Ok(())
    }

    fn join_chat(&self, room: &str) -> Result<()> {
        self.record(SteamCall::JoinChat(room.to_string()));
        Ok(())
    }
}

/// Recording sink standing in for the IRC or Slack adapter
#[derive(Clone)]
pub struct MockSink {
    network: Network,
    identity: bool,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    actions: Arc<Mutex<Vec<ModerationAction>>>,
    fail: Arc<AtomicBool>,
}

impl MockSink {
    pub fn irc() -> Self {
        Self::new(Network::Irc, false)
    }

    pub fn slack() -> Self {
        Self::new(Network::Slack, true)
    }

    fn new(network: Network, identity: bool) -> Self {
        Self {
            network,
            identity,
            sent: Arc::new(Mutex::new(Vec::new())),
            actions: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn actions(&self) -> Vec<ModerationAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl RelaySink for MockSink {
    fn network(&self) -> Network {
        self.network
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("{} outbound task stopped", self.network);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn moderate(&self, action: ModerationAction) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("{} outbound task stopped", self.network);
        }
        self.actions.lock().unwrap().push(action);
        Ok(())
    }

    fn renders_identity(&self) -> bool {
        self.identity
    }
}

pub const CHATROOM: &str = "103582791429521412";

/// Config with the cache files inside `data_dir`
pub fn test_config(data_dir: &Path) -> Config {
    let toml_str = format!(
        r#"
[steam]
account_name = "relaybot"
password = "hunter2"
chatroom = "{}"

[storage]
data_dir = "{}"
"#,
        CHATROOM,
        data_dir.display()
    );
    Config::from_toml(&toml_str).unwrap()
}

/// Config with a short watchdog for loop tests
pub fn fast_watchdog_config(data_dir: &Path) -> Config {
    let mut config = test_config(data_dir);
    config.watchdog.inactivity_threshold_secs = 12;
    config.watchdog.check_interval_secs = 5;
    config.watchdog.reconnect_grace_secs = 1;
    config
}
