// ABOUTME: The relay event loop: one task owning the router, the watchdog timer and reconnect deadline
// ABOUTME: Adapters feed InboundEvents through an mpsc channel; timers re-enter the loop via select!

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::events::InboundEvent;
use crate::router::Router;
use crate::traits::SteamClient;

/// Run until `shutdown` resolves or every adapter has dropped its sender.
///
/// The watchdog check fires every `check_interval` for the life of the
/// loop, whether or not the previous check started a reconnect.
pub async fn run<C, S>(
    mut router: Router<C>,
    mut events: mpsc::Receiver<InboundEvent>,
    check_interval: Duration,
    shutdown: S,
) -> Result<Router<C>>
where
    C: SteamClient,
    S: Future<Output = ()>,
{
    let started = Instant::now();
    if let Err(e) = router.start(started) {
        // Not fatal: the watchdog retries on its next check
        tracing::error!(error = %e, "Initial Steam log-on failed");
    }

    let mut ticker = tokio::time::interval_at(started + check_interval, check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut log_on_at: Option<Instant> = None;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Relay loop shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(event) => router.dispatch(event, Instant::now()),
                None => {
                    tracing::warn!("All adapters closed their event channels");
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Some(at) = router.watchdog_check(Instant::now()) {
                    log_on_at = Some(at);
                }
            }
            _ = tokio::time::sleep_until(log_on_at.unwrap_or(started)), if log_on_at.is_some() => {
                log_on_at = None;
                if let Err(e) = router.reconnect_log_on() {
                    tracing::error!(error = %e, "Steam reconnect log-on failed");
                }
            }
        }
    }

    Ok(router)
}
