mod common;

use common::{
    FIX, GatedCapture, RawPeer, RecordingPresentation, StuckHangup, connected_to_alex,
    drain_messages, next_message, registered, start_session, start_session_on, wait_for,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use wheru::PeerId;
use wheru::location::LocationFix;
use wheru::loopback::LoopbackNetwork;
use wheru::media::MediaStream;
use wheru::presentation::{AudioStatus, Status, StatusKind};
use wheru::session::{ControlMessage, RemoteIndicator};
use wheru::signaling::{ConnectionEvent, EndpointEvent};
use wheru::store::MemoryStore;

#[tokio::test]
async fn test_connect_to_contact_shares_known_location_once() {
    let network = LoopbackNetwork::new();
    let alice = registered(&network, "+1 (555) 123-4567").await;
    let mut alex = RawPeer::join(&network, "5559876543").await;

    // 1. Add Alex; identifier and display form come from the number
    let contact = alice
        .handle
        .add_contact("Alex", "555-987-6543")
        .await
        .unwrap();
    assert_eq!(contact.id.as_str(), "5559876543");
    assert_eq!(contact.formatted_number, "+1 (555) 987-6543");

    // 2. Resolve our fix before dialing
    assert_eq!(alice.handle.request_location().await.unwrap(), FIX);

    // 3. Dial and let the channel open
    alice.handle.connect_contact(&contact).await.unwrap();
    let snapshot = alice.handle.snapshot().await.unwrap();
    assert!(snapshot.connection.is_live());
    assert_eq!(snapshot.peer_name.as_deref(), Some("Alex"));

    let mut link = alex.accept_connection().await;
    wait_for(&alice.handle, "open", |s| s.connection.is_open()).await;

    // 4. Exactly one location message
    assert_eq!(
        next_message(&mut link).await,
        Some(ControlMessage::Location { location: FIX })
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(drain_messages(&mut link).is_empty());

    assert_eq!(
        alice.presentation.surfaces.lock().unwrap().as_deref(),
        Some("Alex")
    );
    assert!(alice.presentation.ptt_enabled.load(Ordering::SeqCst));
    assert_eq!(alice.presentation.last_audio(), Some(AudioStatus::Ready));
    assert_eq!(
        alice.presentation.last_status().map(|s| s.kind),
        Some(StatusKind::Connected)
    );
}

#[tokio::test]
async fn test_location_not_sent_when_unknown_at_open() {
    let network = LoopbackNetwork::new();
    let (alice, _alex, mut link) = connected_to_alex(&network, GatedCapture::open_ended()).await;

    // The fix is resolved lazily for the map but not announced late.
    wait_for(&alice.handle, "own fix", |s| s.my_location.is_some()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(drain_messages(&mut link).is_empty());
    assert!(
        alice
            .presentation
            .maps
            .lock()
            .unwrap()
            .contains(&(Some(FIX), None))
    );
}

#[tokio::test]
async fn test_unknown_inbound_rejected_never_connects() {
    let network = LoopbackNetwork::new();
    let alice = registered(&network, "555-000-1111").await;
    let caller = RawPeer::join(&network, "5551234567").await;

    let mut link = caller
        .endpoint
        .connect(&PeerId::from("5550001111"))
        .unwrap();

    // The channel opens on the caller's side, then the decline closes it.
    assert_eq!(link.events.recv().await, Some(ConnectionEvent::Opened));
    assert_eq!(link.events.recv().await, Some(ConnectionEvent::Closed));

    assert_eq!(alice.presentation.prompts(), vec!["+1 (555) 123-4567"]);
    let snapshot = alice.handle.snapshot().await.unwrap();
    assert!(snapshot.connection.is_idle());
    assert!(snapshot.peer_id.is_none());
    assert_eq!(snapshot.pending_inbound, 0);
    assert!(
        !alice
            .presentation
            .statuses
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.kind == StatusKind::Connected)
    );
}

#[tokio::test]
async fn test_unknown_inbound_accepted_named_by_number() {
    let network = LoopbackNetwork::new();
    let alice = start_session(
        &network,
        Arc::new(MemoryStore::new()),
        RecordingPresentation::accepting(true),
        GatedCapture::open_ended(),
    )
    .await;
    alice.handle.register("555-000-1111").await.unwrap();
    let caller = RawPeer::join(&network, "5551234567").await;

    let _link = caller
        .endpoint
        .connect(&PeerId::from("5550001111"))
        .unwrap();

    let snapshot = wait_for(&alice.handle, "open", |s| s.connection.is_open()).await;
    assert_eq!(snapshot.peer_id, Some(PeerId::from("5551234567")));
    assert_eq!(snapshot.peer_name.as_deref(), Some("+1 (555) 123-4567"));
}

#[tokio::test]
async fn test_known_contact_accepted_without_prompt() {
    let network = LoopbackNetwork::new();
    let alice = registered(&network, "555-000-1111").await;
    alice
        .handle
        .add_contact("Alex", "555-987-6543")
        .await
        .unwrap();
    let alex = RawPeer::join(&network, "5559876543").await;

    let _link = alex.endpoint.connect(&PeerId::from("5550001111")).unwrap();

    let snapshot = wait_for(&alice.handle, "open", |s| s.connection.is_open()).await;
    assert_eq!(snapshot.peer_name.as_deref(), Some("Alex"));
    assert!(alice.presentation.prompts().is_empty());
}

#[tokio::test]
async fn test_two_sessions_exchange_location() {
    let network = LoopbackNetwork::new();
    let alice = registered(&network, "555-123-4567").await;
    let bob = start_session(
        &network,
        Arc::new(MemoryStore::new()),
        RecordingPresentation::accepting(true),
        GatedCapture::open_ended(),
    )
    .await;
    bob.handle.register("555-987-6543").await.unwrap();

    let contact = alice
        .handle
        .add_contact("Bob", "555-987-6543")
        .await
        .unwrap();
    alice.handle.request_location().await.unwrap();
    alice.handle.connect_contact(&contact).await.unwrap();

    let seen = wait_for(&bob.handle, "alice's fix", |s| s.peer_location.is_some()).await;
    assert_eq!(seen.peer_location, Some(FIX));
    assert_eq!(seen.peer_name.as_deref(), Some("+1 (555) 123-4567"));
    assert!(
        bob.presentation
            .maps
            .lock()
            .unwrap()
            .iter()
            .any(|(_, peer)| *peer == Some(FIX))
    );
}

#[tokio::test]
async fn test_control_messages_drive_indicators() {
    let network = LoopbackNetwork::new();
    let (alice, _alex, link) = connected_to_alex(&network, GatedCapture::open_ended()).await;

    link.handle.send(r#"{"type":"ptt-start"}"#).unwrap();
    wait_for(&alice.handle, "peer transmitting", |s| {
        s.remote == RemoteIndicator::PeerTransmitting
    })
    .await;
    assert_eq!(
        alice.presentation.last_audio(),
        Some(AudioStatus::PeerTransmitting("Alex".into()))
    );

    link.handle.send(r#"{"type":"ptt-stop"}"#).unwrap();
    wait_for(&alice.handle, "peer idle", |s| s.remote == RemoteIndicator::Idle).await;
    assert_eq!(alice.presentation.last_audio(), Some(AudioStatus::Ready));

    // Unknown and malformed payloads are dropped without side effects.
    link.handle.send(r#"{"type":"wave"}"#).unwrap();
    link.handle.send("not json").unwrap();

    let paris = LocationFix::new(48.8566, 2.3522);
    link.handle
        .send(&ControlMessage::Location { location: paris }.encode().unwrap())
        .unwrap();
    let snapshot = wait_for(&alice.handle, "peer fix", |s| s.peer_location.is_some()).await;
    assert_eq!(snapshot.peer_location, Some(paris));
    assert!(snapshot.connection.is_open());

    // The advisory notice alone does not tear anything down.
    link.handle.send(r#"{"type":"disconnect"}"#).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(alice.handle.snapshot().await.unwrap().connection.is_open());
}

#[tokio::test]
async fn test_disconnect_notifies_peer_and_is_idempotent() {
    let network = LoopbackNetwork::new();
    let (alice, _alex, mut link) = connected_to_alex(&network, GatedCapture::open_ended()).await;

    alice.handle.disconnect().await.unwrap();
    assert_eq!(next_message(&mut link).await, Some(ControlMessage::Disconnect));
    assert_eq!(next_message(&mut link).await, None, "channel closed");

    let snapshot = alice.handle.snapshot().await.unwrap();
    assert!(snapshot.connection.is_idle());
    assert!(snapshot.peer_id.is_none());
    assert!(snapshot.peer_location.is_none());
    assert!(alice.presentation.surfaces.lock().unwrap().is_none());
    assert!(!alice.presentation.ptt_enabled.load(Ordering::SeqCst));

    let calls = alice.presentation.call_count();
    alice.handle.disconnect().await.unwrap();
    assert_eq!(alice.presentation.call_count(), calls);
}

#[tokio::test]
async fn test_disconnect_when_idle_changes_nothing() {
    let network = LoopbackNetwork::new();
    let alice = registered(&network, "555-123-4567").await;

    let before = alice.handle.snapshot().await.unwrap();
    let calls = alice.presentation.call_count();
    alice.handle.disconnect().await.unwrap();

    let after = alice.handle.snapshot().await.unwrap();
    assert_eq!(alice.presentation.call_count(), calls);
    assert_eq!(after.connection, before.connection);
    assert!(after.registered);
}

#[tokio::test]
async fn test_remote_close_returns_to_idle() {
    let network = LoopbackNetwork::new();
    let (alice, _alex, link) = connected_to_alex(&network, GatedCapture::open_ended()).await;

    link.handle.close().unwrap();
    let snapshot = wait_for(&alice.handle, "idle", |s| s.connection.is_idle()).await;
    assert!(snapshot.peer_name.is_none());
    assert_eq!(alice.presentation.last_audio(), Some(AudioStatus::Unavailable));
    assert!(alice.presentation.surfaces.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_new_connection_replaces_old() {
    let network = LoopbackNetwork::new();
    let (alice, _alex, mut alex_link) =
        connected_to_alex(&network, GatedCapture::open_ended()).await;
    let mut sam = RawPeer::join(&network, "5550002222").await;

    let contact = alice
        .handle
        .add_contact("Sam", "555-000-2222")
        .await
        .unwrap();
    alice.handle.connect_contact(&contact).await.unwrap();

    // The old channel is closed, not left dangling.
    assert_eq!(next_message(&mut alex_link).await, None);

    let _sam_link = sam.accept_connection().await;
    let snapshot = wait_for(&alice.handle, "open to sam", |s| s.connection.is_open()).await;
    assert_eq!(snapshot.peer_id, Some(PeerId::from("5550002222")));
    assert_eq!(snapshot.peer_name.as_deref(), Some("Sam"));
}

#[tokio::test]
async fn test_peer_leaving_closes_connection() {
    let network = LoopbackNetwork::new();
    let (alice, alex, _link) = connected_to_alex(&network, GatedCapture::open_ended()).await;

    alex.endpoint.destroy();
    wait_for(&alice.handle, "idle", |s| s.connection.is_idle()).await;

    // Dialing someone who is gone fails on the channel and leaves us idle.
    let contact = alice.handle.contacts().await.unwrap()[0].clone();
    alice.handle.connect_contact(&contact).await.unwrap();
    wait_for(&alice.handle, "idle again", |s| s.connection.is_idle()).await;
    assert_eq!(
        alice.presentation.last_status().map(|s| s.kind),
        Some(StatusKind::Disconnected)
    );
}

#[tokio::test]
async fn test_crossed_dials_settle_on_one_link() {
    let network = LoopbackNetwork::new();
    let alice = registered(&network, "555-123-4567").await;
    let bob = registered(&network, "555-987-6543").await;

    // 1. Each side knows the other
    let to_bob = alice
        .handle
        .add_contact("Bob", "555-987-6543")
        .await
        .unwrap();
    let to_alice = bob
        .handle
        .add_contact("Alice", "555-123-4567")
        .await
        .unwrap();

    // 2. Both dial at once
    let (a, b) = tokio::join!(
        alice.handle.connect_contact(&to_bob),
        bob.handle.connect_contact(&to_alice)
    );
    a.unwrap();
    b.unwrap();

    // 3. Both end up open, and stay open
    wait_for(&alice.handle, "alice open", |s| s.connection.is_open()).await;
    wait_for(&bob.handle, "bob open", |s| s.connection.is_open()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let on_alice = wait_for(&alice.handle, "alice settled", |s| s.connection.is_open()).await;
    let on_bob = wait_for(&bob.handle, "bob settled", |s| s.connection.is_open()).await;
    assert_eq!(on_alice.peer_id, Some(PeerId::from("5559876543")));
    assert_eq!(on_alice.peer_name.as_deref(), Some("Bob"));
    assert_eq!(on_bob.peer_id, Some(PeerId::from("5551234567")));
    assert_eq!(on_bob.peer_name.as_deref(), Some("Alice"));

    // 4. The surviving link is shared: a press on one side shows on the other
    alice.handle.start_transmission().await.unwrap();
    wait_for(&bob.handle, "alice transmitting", |s| {
        s.remote == RemoteIndicator::PeerTransmitting
    })
    .await;
    assert!(alice.presentation.prompts().is_empty());
    assert!(bob.presentation.prompts().is_empty());
}

#[tokio::test]
async fn test_redialing_connected_peer_keeps_link() {
    let network = LoopbackNetwork::new();
    let (alice, _alex, mut link) = connected_to_alex(&network, GatedCapture::open_ended()).await;

    let contact = alice.handle.contacts().await.unwrap()[0].clone();
    alice.handle.connect_contact(&contact).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(alice.handle.snapshot().await.unwrap().connection.is_open());
    link.handle.send(r#"{"type":"ptt-start"}"#).unwrap();
    wait_for(&alice.handle, "same link", |s| {
        s.remote == RemoteIndicator::PeerTransmitting
    })
    .await;
    assert!(drain_messages(&mut link).is_empty());
}

#[tokio::test]
async fn test_disconnect_continues_past_failed_hangup() {
    let network = LoopbackNetwork::new();
    let capture = GatedCapture::open_ended();
    let alice = start_session_on(
        StuckHangup::new(&network),
        Arc::new(MemoryStore::new()),
        RecordingPresentation::accepting(false),
        capture.clone(),
    )
    .await;
    alice.handle.register("555-123-4567").await.unwrap();
    let mut alex = RawPeer::join(&network, "5559876543").await;
    let contact = alice
        .handle
        .add_contact("Alex", "555-987-6543")
        .await
        .unwrap();
    alice.handle.connect_contact(&contact).await.unwrap();
    let mut link = alex.accept_connection().await;
    wait_for(&alice.handle, "open", |s| s.connection.is_open()).await;

    // 1. Transmit so there is a call to hang up
    alice.handle.start_transmission().await.unwrap();
    let EndpointEvent::IncomingCall(request) = alex.next_event().await else {
        panic!("expected a call");
    };
    let _call = request.answer(&MediaStream::new("alex-mic")).unwrap();
    wait_for(&alice.handle, "call", |s| s.has_call).await;

    // 2. Hanging up fails; disconnect still succeeds
    alice.handle.disconnect().await.unwrap();

    // 3. Every later step still ran
    assert_eq!(next_message(&mut link).await, Some(ControlMessage::PttStart));
    assert_eq!(next_message(&mut link).await, Some(ControlMessage::PttStop));
    assert_eq!(next_message(&mut link).await, Some(ControlMessage::Disconnect));
    assert_eq!(next_message(&mut link).await, None, "channel closed");

    assert!(capture.all_tracks_stopped());
    let snapshot = alice.handle.snapshot().await.unwrap();
    assert!(snapshot.connection.is_idle());
    assert!(!snapshot.has_call);
    assert!(!snapshot.microphone_held);
    assert!(snapshot.peer_id.is_none());
    assert_eq!(
        alice.presentation.last_status(),
        Some(Status::ready("555-123-4567"))
    );
}
