// ABOUTME: Steam adapter that drives an external sidecar process over stdin/stdout
// ABOUTME: Respawns the sidecar with backoff and replays the last log-on after a crash

pub mod protocol;

pub use protocol::{SidecarCommand, SidecarEvent};

use anyhow::{Context, Result};
use chatrelay_core::config::SteamConfig;
use chatrelay_core::events::{InboundEvent, SteamEvent};
use chatrelay_core::traits::{
    ModerationAction, Network, OutboundMessage, RelaySink, SteamClient, SteamLogOn,
};
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::reconnect::Backoff;

/// How long a sidecar that closed stdout gets to exit before it is killed
const EXIT_WAIT: Duration = Duration::from_secs(5);

/// Handle to the sidecar task. Cheap to clone; every call only enqueues a
/// command for the task.
#[derive(Clone)]
pub struct SidecarClient {
    room: String,
    commands: mpsc::UnboundedSender<SidecarCommand>,
}

impl SidecarClient {
    /// Spawn the sidecar supervisor task. Steam events are forwarded to
    /// `events`; the task ends when every client handle is dropped or the
    /// event receiver is gone.
    pub fn spawn(
        config: &SteamConfig,
        events: mpsc::Sender<InboundEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let process = SidecarProcess {
            program: config.sidecar.clone(),
            args: config.sidecar_args.clone(),
        };
        let handle = tokio::spawn(supervise(process, rx, events));
        (
            Self {
                room: config.chatroom.clone(),
                commands: tx,
            },
            handle,
        )
    }

    fn push(&self, command: SidecarCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow::anyhow!("Steam sidecar task has stopped"))
    }
}

impl RelaySink for SidecarClient {
    fn network(&self) -> Network {
        Network::Steam
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        self.push(SidecarCommand::SendMessage {
            room: self.room.clone(),
            text: message.text,
        })
    }

    fn moderate(&self, action: ModerationAction) -> Result<()> {
        self.push(SidecarCommand::moderation(&self.room, action))
    }
}

impl SteamClient for SidecarClient {
    fn log_on(&self, request: SteamLogOn) -> Result<()> {
        self.push(SidecarCommand::log_on(request))
    }

    fn log_off(&self) -> Result<()> {
        self.push(SidecarCommand::LogOff)
    }

    fn set_persona_online(&self) -> Result<()> {
        self.push(SidecarCommand::SetPersonaOnline)
    }

    fn join_chat(&self, room: &str) -> Result<()> {
        self.push(SidecarCommand::JoinChat {
            room: room.to_string(),
        })
    }
}

// =============================================================================
// Sidecar process supervision
// =============================================================================

struct SidecarProcess {
    program: String,
    args: Vec<String>,
}

impl SidecarProcess {
    fn spawn(&self) -> Result<Child> {
        if self.program.contains('\0') {
            anyhow::bail!("Invalid sidecar path");
        }
        tracing::info!(binary = %self.program, "Spawning Steam sidecar");

        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn Steam sidecar {}", self.program))
    }
}

/// State that outlives a single sidecar process
#[derive(Default)]
struct Session {
    /// Log-on to replay when the sidecar has to be restarted
    log_on: Option<SidecarCommand>,
    /// Chat lines accepted from the relay that no logged-on sidecar has
    /// received yet, oldest first
    held: VecDeque<SidecarCommand>,
}

impl Session {
    fn track(&mut self, command: &SidecarCommand) {
        match command {
            SidecarCommand::LogOn { .. } => self.log_on = Some(command.clone()),
            SidecarCommand::LogOff => self.log_on = None,
            _ => {}
        }
    }

    fn hold(&mut self, command: SidecarCommand) {
        tracing::info!(held = self.held.len() + 1, "Holding Steam message until the sidecar is logged on");
        self.held.push_back(command);
    }

    /// Report every held line when the adapter stops for good
    fn abandon_held(&mut self) {
        for command in self.held.drain(..) {
            if let SidecarCommand::SendMessage { text, .. } = command {
                tracing::warn!(text = %text, "Steam message never delivered");
            }
        }
    }
}

/// Why a sidecar session ended
enum Exit {
    /// Every client handle was dropped
    Shutdown,
    /// The relay stopped listening for events
    RelayGone,
    /// The process died or its pipes broke
    Crashed(String),
}

async fn supervise(
    process: SidecarProcess,
    mut commands: mpsc::UnboundedReceiver<SidecarCommand>,
    events: mpsc::Sender<InboundEvent>,
) {
    let mut backoff = Backoff::default();
    let mut session = Session::default();

    loop {
        let started = Instant::now();
        let exit = match process.spawn() {
            Ok(child) => run_session(child, &mut session, &mut commands, &events).await,
            Err(e) => Exit::Crashed(format!("{:#}", e)),
        };

        let reason = match exit {
            Exit::Shutdown => {
                tracing::info!("Steam sidecar shut down");
                session.abandon_held();
                return;
            }
            Exit::RelayGone => {
                tracing::warn!("Relay stopped receiving Steam events, stopping sidecar");
                session.abandon_held();
                return;
            }
            Exit::Crashed(reason) => reason,
        };

        metrics::counter!("steam_sidecar_restarts_total").increment(1);
        let delay = backoff.on_failure(started.elapsed());
        tracing::error!(
            reason = %reason,
            retry_in_secs = delay.as_secs(),
            attempt = backoff.attempts(),
            "Steam sidecar exited"
        );

        let lost = SteamEvent::LoggedOff {
            reason: format!("sidecar exited: {}", reason),
        };
        if events.send(lost.into()).await.is_err() {
            session.abandon_held();
            return;
        }

        // Keep tracking log-on/log-off while waiting so the replay is current
        let wake = tokio::time::sleep(delay);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                _ = &mut wake => break,
                command = commands.recv() => match command {
                    Some(command @ SidecarCommand::SendMessage { .. }) => session.hold(command),
                    Some(command) => {
                        session.track(&command);
                        tracing::debug!(op = command.op(), "Dropping Steam command while sidecar is down");
                    }
                    None => {
                        session.abandon_held();
                        return;
                    }
                },
            }
        }
    }
}

async fn run_session(
    mut child: Child,
    session: &mut Session,
    commands: &mut mpsc::UnboundedReceiver<SidecarCommand>,
    events: &mpsc::Sender<InboundEvent>,
) -> Exit {
    let (mut stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
        (Some(stdin), Some(stdout)) => (stdin, stdout),
        _ => return Exit::Crashed("sidecar pipes unavailable".to_string()),
    };
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "steam_sidecar", "{}", line);
            }
        });
    }

    if let Some(replay) = session.log_on.clone() {
        tracing::info!("Replaying Steam log-on to restarted sidecar");
        if let Err(e) = write_command(&mut stdin, &replay).await {
            return Exit::Crashed(format!("{:#}", e));
        }
    }

    // Chat lines wait for this process to report `logged_on`
    let mut logged_on = false;
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    return Exit::Shutdown;
                };
                let is_chat = matches!(command, SidecarCommand::SendMessage { .. });
                if is_chat && (!logged_on || !session.held.is_empty()) {
                    session.hold(command);
                } else {
                    session.track(&command);
                    if let Err(e) = write_command(&mut stdin, &command).await {
                        if is_chat {
                            session.held.push_front(command);
                        }
                        return Exit::Crashed(format!("{:#}", e));
                    }
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match SidecarEvent::parse(&line).and_then(SidecarEvent::into_steam_event) {
                        Ok(Some(event)) => {
                            match event {
                                SteamEvent::LoggedOn => {
                                    logged_on = true;
                                    if let Err(e) = write_held(&mut stdin, session).await {
                                        return Exit::Crashed(format!("{:#}", e));
                                    }
                                }
                                SteamEvent::LoggedOff { .. } => logged_on = false,
                                _ => {}
                            }
                            if events.send(event.into()).await.is_err() {
                                return Exit::RelayGone;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "Ignoring sidecar event"),
                    }
                }
                // EOF comes after the last event line, so nothing is lost
                Ok(None) => {
                    let detail = match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
                        Ok(Ok(status)) => format!("sidecar exited with {}", status),
                        Ok(Err(e)) => format!("failed waiting for sidecar: {}", e),
                        Err(_) => {
                            let _ = child.kill().await;
                            "sidecar closed stdout".to_string()
                        }
                    };
                    return Exit::Crashed(detail);
                }
                Err(e) => return Exit::Crashed(format!("failed reading sidecar stdout: {}", e)),
            },
        }
    }
}

/// Send held chat lines in order before the relay hears about the log-on,
/// so they stay ahead of anything the relay queued meanwhile
async fn write_held(stdin: &mut ChildStdin, session: &mut Session) -> Result<()> {
    if session.held.is_empty() {
        return Ok(());
    }
    let count = session.held.len();
    while let Some(command) = session.held.pop_front() {
        if let Err(e) = write_command(stdin, &command).await {
            session.held.push_front(command);
            return Err(e);
        }
    }
    tracing::info!(count, "Delivered held Steam messages to the sidecar");
    Ok(())
}

async fn write_command(stdin: &mut ChildStdin, command: &SidecarCommand) -> Result<()> {
    let line = command.to_line()?;
    stdin
        .write_all(line.as_bytes())
        .await
        .with_context(|| format!("Failed to write {} to sidecar", command.op()))?;
    stdin.flush().await.context("Failed to flush sidecar stdin")?;
    Ok(())
}
