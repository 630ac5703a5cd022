//! End-to-end tests for the stage client against mock collaborators.
//!
//! Covers:
//! - Joining, roster reconciliation and leaving on the primary stage
//! - Device switching while joined
//! - The screenshare stage running alongside the primary stage
//! - Error surfacing for empty and rejected tokens

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::secret::ExposeSecret;
use common::types::{ParticipantId, StreamId};
use stage_client::actors::{SessionState, SessionView};
use stage_client::media::device::mock::MockDeviceCapture;
use stage_client::media::{MediaKind, ScreenshareCapture};
use stage_client::storage::SessionStorage;
use stage_client::strategy::SubscriptionLevel;
use stage_client::transport::mock::MockStageConnector;
use stage_client::transport::{ParticipantDescriptor, StageEvent, StreamDescriptor};
use stage_client::{Config, ErrorKind, StageClient, StageError};
use tokio::sync::watch;

// ============================================================================
// Helpers
// ============================================================================

fn client(connector: &Arc<MockStageConnector>) -> StageClient {
    StageClient::new(
        &Config::default(),
        connector.clone(),
        Arc::new(MockDeviceCapture::with_devices(&["camA", "camB"], &["micA", "micB"])),
        Arc::new(SessionStorage::new()),
    )
}

async fn wait_for(
    views: &mut watch::Receiver<SessionView>,
    predicate: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    tokio::time::timeout(Duration::from_secs(1), views.wait_for(predicate))
        .await
        .expect("session did not reach expected view")
        .unwrap()
        .clone()
}

// ============================================================================
// Primary stage
// ============================================================================

#[tokio::test]
async fn test_participant_lifecycle_on_primary_stage() {
    let connector = Arc::new(MockStageConnector::new());
    let client = client(&connector);
    client.initialize_default_devices().await.unwrap();
    let mut views = client.subscribe_stage();

    client.join_stage("tok1").await.unwrap();
    let connection = connector.last_connection().unwrap();
    let p1 = ParticipantDescriptor::remote("p1", "alice");

    connection.emit(StageEvent::ParticipantJoined(p1.clone()));
    connection.emit(StageEvent::StreamsAdded {
        participant: p1.clone(),
        streams: vec![
            StreamDescriptor::new("s1", MediaKind::Audio),
            StreamDescriptor::new("s2", MediaKind::Video),
        ],
    });
    connection.emit(StageEvent::ParticipantMediaStateChanged {
        participant: p1.clone(),
        audio_muted: true,
        video_stopped: false,
    });

    let view = wait_for(&mut views, |v| {
        v.roster
            .get(&ParticipantId::from("p1"))
            .is_some_and(|p| p.audio_muted)
    })
    .await;
    let alice = view.roster.get(&ParticipantId::from("p1")).unwrap();
    assert_eq!(alice.streams.len(), 2);
    assert_eq!(
        alice.stream(&StreamId::from("s2")).map(|s| s.kind),
        Some(MediaKind::Video)
    );

    connection.emit(StageEvent::ParticipantLeft(p1));
    wait_for(&mut views, |v| v.roster.is_empty()).await;

    client.leave_stage().await.unwrap();
    let view = wait_for(&mut views, |v| v.state == SessionState::Idle).await;
    assert!(view.local_participant.is_none());
    assert_eq!(connection.leave_count(), 1);
}

#[tokio::test]
async fn test_device_switch_while_joined_republishes() {
    let connector = Arc::new(MockStageConnector::new());
    let client = client(&connector);
    client.initialize_default_devices().await.unwrap();
    client.join_stage("tok1").await.unwrap();
    let connection = connector.last_connection().unwrap();

    let mic_b = client.select_audio_device("micB").await.unwrap();
    let cam_b = client.select_video_device("camB").await.unwrap();

    assert_eq!(connection.refresh_count(), 2);
    assert_eq!(connection.published_tracks(), vec![cam_b, mic_b]);
}

#[tokio::test]
async fn test_join_errors_are_classified() {
    let connector = Arc::new(MockStageConnector::new().rejecting_tokens(&["expired"]));
    let client = client(&connector);

    let empty = client.join_stage("").await.unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::UserInput);
    assert_eq!(connector.open_count(), 0);

    let rejected = client.join_stage("expired").await.unwrap_err();
    assert_eq!(rejected.kind(), ErrorKind::TransportJoinFailure);
    assert!(rejected.client_message().starts_with("Error joining stage: "));

    let view = client.primary_session().snapshot();
    assert_eq!(view.state, SessionState::Idle);
    assert!(client.cached_stage_token().is_none());

    // A valid token afterwards still works.
    client.join_stage("tok2").await.unwrap();
    assert_eq!(
        client.cached_stage_token().unwrap().expose_secret(),
        "tok2"
    );
}

// ============================================================================
// Screenshare stage
// ============================================================================

#[tokio::test]
async fn test_screenshare_runs_alongside_primary_stage() {
    let connector = Arc::new(MockStageConnector::new());
    let client = client(&connector);
    client.initialize_default_devices().await.unwrap();
    client.join_stage("main").await.unwrap();
    let primary_connection = connector.last_connection().unwrap();

    let outcome = client.publish_screenshare("share").await.unwrap();
    assert!(matches!(outcome, ScreenshareCapture::Started(_)));
    let share_connection = connector.last_connection().unwrap();
    assert_eq!(share_connection.token(), "share");

    // Participant events on the screenshare connection never reach a roster.
    share_connection.emit(StageEvent::ParticipantJoined(ParticipantDescriptor::remote(
        "p9", "bob",
    )));
    assert_eq!(
        client.screenshare_strategy().subscription_level(),
        SubscriptionLevel::None
    );

    client.unpublish_screenshare().await.unwrap();
    let mut share_views = client.screenshare_session().subscribe();
    let share_view = wait_for(&mut share_views, |v| v.state == SessionState::Idle).await;
    assert!(share_view.roster.is_empty());

    // The primary stage is untouched.
    assert!(client.primary_session().snapshot().is_joined());
    assert_eq!(primary_connection.leave_count(), 0);
    assert_eq!(
        client.cached_screenshare_token().unwrap().expose_secret(),
        "share"
    );
}

#[tokio::test]
async fn test_second_screenshare_while_sharing_is_rejected() {
    let connector = Arc::new(MockStageConnector::new());
    let client = client(&connector);

    client.publish_screenshare("share").await.unwrap();
    let second = client.publish_screenshare("share").await;

    assert!(matches!(
        second,
        Err(StageError::InvalidState {
            state: SessionState::Joined,
            ..
        })
    ));
    assert_eq!(connector.open_count(), 1);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_configured_subscription_level_reaches_primary_strategy() {
    let vars = HashMap::from([(
        "STAGE_SUBSCRIBE_LEVEL".to_string(),
        "audio_only".to_string(),
    )]);
    let config = Config::from_vars(&vars).unwrap();
    let connector = Arc::new(MockStageConnector::new());

    let client = StageClient::new(
        &config,
        connector,
        Arc::new(MockDeviceCapture::with_devices(&["camA"], &["micA"])),
        Arc::new(SessionStorage::new()),
    );

    assert_eq!(
        client.primary_strategy().subscription_level(),
        SubscriptionLevel::AudioOnly
    );
    client.shutdown().await;
}
