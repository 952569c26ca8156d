// ABOUTME: Steam session supervisor: owns the delivery queue, the watchdog and the client
// ABOUTME: Drives log-on/log-off, flushes queued messages on authentication, persists cache files

use anyhow::{Context, Result};
use tokio::time::Instant;

use crate::cache::{SentryStore, ServerListCache};
use crate::config::{SteamConfig, StorageConfig, WatchdogConfig};
use crate::delivery::{ConnectionState, Delivery, DeliveryQueue};
use crate::traits::{OutboundMessage, SteamClient, SteamLogOn};
use crate::watchdog::{Watchdog, WatchdogState};

/// Plain state machine around one Steam client. No timers of its own: the
/// relay loop calls `check` on every watchdog tick and `log_on` when the
/// returned deadline passes.
pub struct SteamSupervisor<C: SteamClient> {
    client: C,
    account_name: String,
    password: String,
    auth_code: Option<String>,
    chatroom: String,
    servers: ServerListCache,
    sentry: SentryStore,
    queue: DeliveryQueue,
    watchdog: Watchdog,
}

impl<C: SteamClient> SteamSupervisor<C> {
    pub fn new(
        client: C,
        steam: &SteamConfig,
        watchdog: &WatchdogConfig,
        storage: &StorageConfig,
        now: Instant,
    ) -> Self {
        Self {
            client,
            account_name: steam.account_name.clone(),
            password: steam.password.clone(),
            auth_code: steam.auth_code.clone(),
            chatroom: steam.chatroom.clone(),
            servers: ServerListCache::new(storage.servers_path()),
            sentry: SentryStore::new(storage.sentry_path()),
            queue: DeliveryQueue::new(),
            watchdog: Watchdog::new(
                watchdog.inactivity_threshold(),
                watchdog.reconnect_grace(),
                now,
            ),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn chatroom(&self) -> &str {
        &self.chatroom
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.queue.state()
    }

    pub fn watchdog_state(&self) -> WatchdogState {
        self.watchdog.state()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.pending_len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.queue.pending()
    }

    /// Initial log-on at startup. The watchdog treats it like a forced
    /// reconnect, so a failed first attempt is retried on the next check.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        self.watchdog.begin_reconnect(now);
        self.log_on()
    }

    /// Send to the chat room now, or queue until authenticated
    pub fn send(&mut self, message: OutboundMessage) -> Delivery {
        self.queue.enqueue_or_send(&self.client, message)
    }

    /// Any inbound Steam event proves the session is alive
    pub fn record_activity(&mut self, now: Instant) {
        self.watchdog.record_activity(now);
    }

    /// Authentication succeeded: go online, join the room, flush the queue.
    /// Returns the number of flushed messages.
    pub fn on_logged_on(&mut self) -> Result<usize> {
        self.watchdog.on_authenticated();

        if let Err(e) = self.client.set_persona_online() {
            tracing::warn!(error = %e, "Failed to set Steam persona online");
        }
        self.client
            .join_chat(&self.chatroom)
            .with_context(|| format!("Failed to join Steam chat {}", self.chatroom))?;

        self.queue.on_authenticated(&self.client)
    }

    pub fn on_logged_off(&mut self) {
        self.queue.on_disconnected();
    }

    /// Watchdog evaluation. When the session is stale this logs off and
    /// returns the instant at which `log_on` should run.
    pub fn check(&mut self, now: Instant) -> Option<Instant> {
        if !self.watchdog.check(now) {
            return None;
        }

        if let Err(e) = self.client.log_off() {
            tracing::warn!(error = %e, "Steam log-off failed, reconnecting anyway");
        }
        self.queue.on_disconnected();

        let grace = self.watchdog.begin_reconnect(now);
        tracing::info!(grace_secs = grace.as_secs(), "Steam reconnect scheduled");
        Some(now + grace)
    }

    /// Log on with the stored credentials. The sentry blob and server list
    /// are re-read from disk so a blob issued since startup is used.
    pub fn log_on(&mut self) -> Result<()> {
        let request = SteamLogOn {
            account_name: self.account_name.clone(),
            password: self.password.clone(),
            auth_code: self.auth_code.clone(),
            sentry: self.sentry.load(),
            servers: self.servers.load(),
        };

        tracing::info!(
            account = %request.account_name,
            has_sentry = request.sentry.is_some(),
            "Logging on to Steam"
        );
        self.queue.on_connecting();
        self.client.log_on(request).context("Failed to request Steam log-on")
    }

    pub fn store_servers(&self, servers: &serde_json::Value) -> Result<()> {
        self.servers
            .store(servers)
            .context("Failed to persist Steam server list")
    }

    pub fn store_sentry(&self, data: &[u8]) -> Result<()> {
        self.sentry
            .store(data)
            .context("Failed to persist Steam sentry")?;
        tracing::info!(bytes = data.len(), "Stored new Steam sentry");
        Ok(())
    }
}
