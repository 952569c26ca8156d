// ABOUTME: Tests for the Steam sidecar adapter against small shell-script sidecars
// ABOUTME: Covers event decoding, command encoding, and restart with log-on replay
#![cfg(unix)]

use std::time::Duration;

use chatrelay::config::SteamConfig;
use chatrelay::events::{InboundEvent, MessageKind, SteamEvent};
use chatrelay::platform::SidecarClient;
use chatrelay::traits::{OutboundMessage, SteamClient, SteamLogOn};
use chatrelay::RelaySink;
use tokio::sync::mpsc;

const ROOM: &str = "103582791429521412";

fn script_config(script: &str) -> SteamConfig {
    SteamConfig {
        sidecar: "sh".to_string(),
        sidecar_args: vec!["-c".to_string(), script.to_string()],
        account_name: "relaybot".to_string(),
        password: "hunter2".to_string(),
        auth_code: None,
        chatroom: ROOM.to_string(),
        profile_url: "https://steamcommunity.com/profiles/".to_string(),
    }
}

fn log_on_request() -> SteamLogOn {
    SteamLogOn {
        account_name: "relaybot".to_string(),
        password: "hunter2".to_string(),
        auth_code: None,
        sentry: Some(b"sentry".to_vec()),
        servers: None,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<InboundEvent>) -> SteamEvent {
    let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a sidecar event")
        .expect("sidecar task dropped the event channel");
    match event {
        InboundEvent::Steam(event) => event,
        other => panic!("expected a Steam event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sidecar_events_are_decoded() {
    let script = format!(
        r#"while read line; do
  case "$line" in
    *'"op":"log_on"'*)
      echo '{{"event":"logged_on"}}'
      echo '{{"event":"debug","message":"connected to CM"}}'
      echo '{{"event":"chat_message","room":"{room}","chatter":"76561197960287930","body":"waves","kind":"emote"}}'
      ;;
  esac
done"#,
        room = ROOM
    );
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let (client, handle) = SidecarClient::spawn(&script_config(&script), events_tx);

    client.log_on(log_on_request()).unwrap();

    assert_eq!(next_event(&mut events_rx).await, SteamEvent::LoggedOn);
    // Debug lines are logged, never forwarded
    assert_eq!(
        next_event(&mut events_rx).await,
        SteamEvent::ChatMessage {
            room: ROOM.to_string(),
            chatter: "76561197960287930".to_string(),
            body: "waves".to_string(),
            kind: MessageKind::Emote,
        }
    );

    drop(client);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_commands_are_written_as_json_lines() {
    // Echo every send_message back as a chat line from a fixed chatter
    let script = format!(
        r#"while read line; do
  case "$line" in
    *'"op":"log_on"'*) echo '{{"event":"logged_on"}}' ;;
    *'"op":"send_message"'*)
      echo '{{"event":"chat_message","room":"{room}","chatter":"echo","body":"got it"}}'
      ;;
  esac
done"#,
        room = ROOM
    );
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let (client, _handle) = SidecarClient::spawn(&script_config(&script), events_tx);

    client.log_on(log_on_request()).unwrap();
    assert_eq!(next_event(&mut events_rx).await, SteamEvent::LoggedOn);
    client.send(OutboundMessage::plain("hello steam")).unwrap();

    match next_event(&mut events_rx).await {
        SteamEvent::ChatMessage { chatter, kind, .. } => {
            assert_eq!(chatter, "echo");
            assert_eq!(kind, MessageKind::Message);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_crashed_sidecar_is_restarted_with_log_on_replay() {
    // Answers one log-on, then dies
    let script = r#"read line
case "$line" in
  *'"op":"log_on"'*) echo '{"event":"logged_on"}' ;;
esac
exit 3"#;
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let (client, handle) = SidecarClient::spawn(&script_config(script), events_tx);

    client.log_on(log_on_request()).unwrap();

    assert_eq!(next_event(&mut events_rx).await, SteamEvent::LoggedOn);
    match next_event(&mut events_rx).await {
        SteamEvent::LoggedOff { reason } => assert!(reason.contains("sidecar exited"), "{reason}"),
        other => panic!("expected LoggedOff, got {:?}", other),
    }
    // The respawned sidecar receives the replayed log-on without a new call
    assert_eq!(next_event(&mut events_rx).await, SteamEvent::LoggedOn);

    drop(client);
    handle.abort();
}

#[tokio::test]
async fn test_log_off_stops_replay_after_crash() {
    // First instance logs on, then exits on log_off; the next one reports
    // whatever it receives first
    let script = r#"read line
case "$line" in
  *'"op":"log_on"'*) echo '{"event":"logged_on"}' ;;
  *) echo '{"event":"logged_off","reason":"unexpected"}' ;;
esac
read line
exit 0"#;
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let (client, handle) = SidecarClient::spawn(&script_config(script), events_tx);

    client.log_on(log_on_request()).unwrap();
    assert_eq!(next_event(&mut events_rx).await, SteamEvent::LoggedOn);

    client.log_off().unwrap();
    match next_event(&mut events_rx).await {
        SteamEvent::LoggedOff { reason } => assert!(reason.contains("sidecar exited")),
        other => panic!("expected LoggedOff, got {:?}", other),
    }

    // Nothing is replayed, so the restarted sidecar stays silent
    let quiet = tokio::time::timeout(Duration::from_secs(4), events_rx.recv()).await;
    assert!(quiet.is_err(), "restarted sidecar should not have been sent a log-on");

    drop(client);
    handle.abort();
}

#[tokio::test]
async fn test_messages_sent_during_restart_reach_the_next_sidecar() {
    // The first instance answers the log-on and dies; later instances
    // acknowledge log-ons and confirm the held line arrived
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("crashed-once");
    let script = format!(
        r#"if [ ! -e '{marker}' ]; then
  touch '{marker}'
  read line
  echo '{{"event":"logged_on"}}'
  exit 3
fi
while read line; do
  case "$line" in
    *'"op":"log_on"'*) echo '{{"event":"logged_on"}}' ;;
    *'hello during restart'*)
      echo '{{"event":"chat_message","room":"{room}","chatter":"echo","body":"delivered"}}'
      ;;
  esac
done"#,
        marker = marker.display(),
        room = ROOM
    );
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let (client, handle) = SidecarClient::spawn(&script_config(&script), events_tx);

    client.log_on(log_on_request()).unwrap();
    assert_eq!(next_event(&mut events_rx).await, SteamEvent::LoggedOn);
    assert!(matches!(
        next_event(&mut events_rx).await,
        SteamEvent::LoggedOff { .. }
    ));

    // Accepted while no sidecar is running
    client
        .send(OutboundMessage::plain("hello during restart"))
        .unwrap();

    assert_eq!(next_event(&mut events_rx).await, SteamEvent::LoggedOn);
    match next_event(&mut events_rx).await {
        SteamEvent::ChatMessage { body, .. } => assert_eq!(body, "delivered"),
        other => panic!("expected the held message to be delivered, got {:?}", other),
    }

    drop(client);
    handle.abort();
}
