//! `StageClient` - the composed stage session core.
//!
//! Owns one [`LocalMediaRegistry`], the primary and screenshare session
//! actors with their strategies, and the token cache. Device changes flow
//! registry -> strategy -> `refresh_strategy` on the primary session.

use crate::actors::{SessionActor, SessionActorHandle, SessionKind, SessionState, SessionView};
use crate::config::Config;
use crate::errors::StageError;
use crate::media::{
    DeviceCapture, DeviceList, LocalMediaRegistry, LocalTrackHandle, ScreenshareCapture,
};
use crate::storage::{TokenStorage, SCREENSHARE_TOKEN_KEY, STAGE_TOKEN_KEY};
use crate::strategy::{Strategy, StrategyRef};
use crate::transport::StageConnector;

use common::secret::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Stage client facade.
pub struct StageClient {
    registry: LocalMediaRegistry,
    primary_strategy: StrategyRef,
    screenshare_strategy: StrategyRef,
    primary: SessionActorHandle,
    screenshare: SessionActorHandle,
    storage: Arc<dyn TokenStorage>,
    /// Serializes publish/unpublish across the picker and the join.
    screenshare_lock: Mutex<()>,
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl StageClient {
    /// Build the registry and spawn both session actors.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &Config,
        connector: Arc<dyn StageConnector>,
        capture: Arc<dyn DeviceCapture>,
        storage: Arc<dyn TokenStorage>,
    ) -> Self {
        let registry = LocalMediaRegistry::new(
            capture,
            config.capture_constraints(),
            config.simulcast_enabled,
        );
        let primary_strategy: StrategyRef = Arc::new(Strategy::session(
            registry.audio(),
            registry.video(),
            config.subscribe_level,
        ));
        let screenshare_strategy: StrategyRef =
            Arc::new(Strategy::screenshare(registry.screenshare()));

        let cancel_token = CancellationToken::new();
        let (primary, primary_task) = SessionActor::spawn(
            SessionKind::Primary,
            Arc::clone(&primary_strategy),
            Arc::clone(&connector),
            Arc::clone(&storage),
            config.session_mailbox_buffer,
            cancel_token.child_token(),
        );
        let (screenshare, screenshare_task) = SessionActor::spawn(
            SessionKind::Screenshare,
            Arc::clone(&screenshare_strategy),
            connector,
            Arc::clone(&storage),
            config.session_mailbox_buffer,
            cancel_token.child_token(),
        );

        info!(
            target: "stage.client",
            subscribe_level = %config.subscribe_level,
            simulcast = config.simulcast_enabled,
            "Stage client started"
        );

        Self {
            registry,
            primary_strategy,
            screenshare_strategy,
            primary,
            screenshare,
            storage,
            screenshare_lock: Mutex::new(()),
            cancel_token,
            tasks: vec![primary_task, screenshare_task],
        }
    }

    /// List input devices.
    ///
    /// # Errors
    ///
    /// `StageError::NoDevices` when no camera or microphone exists.
    pub async fn enumerate_devices(&self) -> Result<DeviceList, StageError> {
        self.registry.enumerate_devices().await
    }

    /// Select the first microphone and camera and publish them to the
    /// primary strategy.
    ///
    /// # Errors
    ///
    /// Any enumeration or acquisition error.
    #[instrument(skip_all, name = "stage.client.initialize_devices")]
    pub async fn initialize_default_devices(&self) -> Result<DeviceList, StageError> {
        let result = self.registry.initialize_default_devices().await;
        // Tracks acquired before a failure stay installed; keep the strategy in step.
        self.sync_primary_media().await?;
        result
    }

    /// Switch the camera and refresh the primary session.
    ///
    /// # Errors
    ///
    /// `StageError::DeviceUnavailable` if acquisition fails; the previous
    /// camera stays selected and published.
    #[instrument(skip_all, name = "stage.client.select_video_device")]
    pub async fn select_video_device(&self, device_id: &str) -> Result<LocalTrackHandle, StageError> {
        let handle = self.registry.select_video_device(device_id).await?;
        self.sync_primary_media().await?;
        Ok(handle)
    }

    /// Switch the microphone and refresh the primary session.
    ///
    /// # Errors
    ///
    /// `StageError::DeviceUnavailable` if acquisition fails.
    #[instrument(skip_all, name = "stage.client.select_audio_device")]
    pub async fn select_audio_device(&self, device_id: &str) -> Result<LocalTrackHandle, StageError> {
        let handle = self.registry.select_audio_device(device_id).await?;
        self.sync_primary_media().await?;
        Ok(handle)
    }

    /// Toggle the current microphone's mute flag.
    ///
    /// Returns the new state, or `None` when no microphone is selected.
    pub fn toggle_audio_mute(&self) -> Option<bool> {
        self.registry
            .audio()
            .map(|audio| self.registry.toggle_mute(&audio))
    }

    /// Toggle the current camera's mute flag.
    pub fn toggle_video_mute(&self) -> Option<bool> {
        self.registry
            .video()
            .map(|video| self.registry.toggle_mute(&video))
    }

    /// Join the primary stage.
    ///
    /// # Errors
    ///
    /// See [`SessionActorHandle::join`].
    pub async fn join_stage(&self, token: &str) -> Result<(), StageError> {
        self.primary.join(SecretString::from(token.to_owned())).await
    }

    /// Leave the primary stage.
    ///
    /// # Errors
    ///
    /// See [`SessionActorHandle::leave`].
    pub async fn leave_stage(&self) -> Result<(), StageError> {
        self.primary.leave().await
    }

    /// Share the screen on the screenshare stage.
    ///
    /// Returns [`ScreenshareCapture::Cancelled`] without joining when the
    /// picker is dismissed.
    ///
    /// # Errors
    ///
    /// - `StageError::EmptyToken` before the picker is shown
    /// - `StageError::InvalidState` if the screenshare session is busy
    /// - `StageError::DeviceUnavailable` if display capture fails
    /// - `StageError::JoinFailed` if the join fails; the screen track is
    ///   released
    #[instrument(skip_all, name = "stage.client.publish_screenshare")]
    pub async fn publish_screenshare(&self, token: &str) -> Result<ScreenshareCapture, StageError> {
        if token.trim().is_empty() {
            return Err(StageError::EmptyToken);
        }

        let _guard = self.screenshare_lock.lock().await;
        let state = self.screenshare.snapshot().state;
        if state != SessionState::Idle {
            return Err(StageError::InvalidState {
                operation: "publish_screenshare",
                state,
            });
        }

        let handle = match self.registry.start_screenshare().await? {
            ScreenshareCapture::Started(handle) => handle,
            ScreenshareCapture::Cancelled => return Ok(ScreenshareCapture::Cancelled),
        };
        self.screenshare_strategy
            .update_media(None, Some(handle.clone()));

        if let Err(e) = self
            .screenshare
            .join(SecretString::from(token.to_owned()))
            .await
        {
            warn!(target: "stage.client", error = %e, "Error joining screenshare stage");
            self.clear_screenshare();
            return Err(e);
        }

        info!(target: "stage.client", track_id = %handle.id(), "Screenshare published");
        Ok(ScreenshareCapture::Started(handle))
    }

    /// Stop sharing: leave the screenshare stage and release the track.
    ///
    /// The track is released even if the leave fails.
    ///
    /// # Errors
    ///
    /// See [`SessionActorHandle::leave`].
    pub async fn unpublish_screenshare(&self) -> Result<(), StageError> {
        let _guard = self.screenshare_lock.lock().await;
        let result = self.screenshare.leave().await;
        self.clear_screenshare();
        result
    }

    /// Token of the last successful primary join, if cached.
    #[must_use]
    pub fn cached_stage_token(&self) -> Option<SecretString> {
        self.storage.load(STAGE_TOKEN_KEY)
    }

    /// Token of the last successful screenshare join, if cached.
    #[must_use]
    pub fn cached_screenshare_token(&self) -> Option<SecretString> {
        self.storage.load(SCREENSHARE_TOKEN_KEY)
    }

    /// Join the primary stage with the cached token.
    ///
    /// # Errors
    ///
    /// `StageError::EmptyToken` when nothing is cached, otherwise as
    /// [`StageClient::join_stage`].
    pub async fn rejoin_stage(&self) -> Result<(), StageError> {
        let token = self.cached_stage_token().ok_or(StageError::EmptyToken)?;
        self.join_stage(token.expose_secret()).await
    }

    #[must_use]
    pub fn registry(&self) -> &LocalMediaRegistry {
        &self.registry
    }

    #[must_use]
    pub fn primary_session(&self) -> &SessionActorHandle {
        &self.primary
    }

    #[must_use]
    pub fn screenshare_session(&self) -> &SessionActorHandle {
        &self.screenshare
    }

    #[must_use]
    pub fn primary_strategy(&self) -> &StrategyRef {
        &self.primary_strategy
    }

    #[must_use]
    pub fn screenshare_strategy(&self) -> &StrategyRef {
        &self.screenshare_strategy
    }

    /// Subscribe to primary session snapshots (state and roster).
    #[must_use]
    pub fn subscribe_stage(&self) -> watch::Receiver<SessionView> {
        self.primary.subscribe()
    }

    /// Cancel both sessions and wait for them to stop.
    ///
    /// Joined sessions issue a best-effort leave on the way out.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(target: "stage.client", error = %e, "Session task failed during shutdown");
            }
        }
        info!(target: "stage.client", "Stage client stopped");
    }

    async fn sync_primary_media(&self) -> Result<(), StageError> {
        self.primary_strategy
            .update_media(self.registry.audio(), self.registry.video());
        let refreshed = self.primary.refresh_strategy().await?;
        debug!(target: "stage.client", refreshed, "Primary strategy updated");
        Ok(())
    }

    fn clear_screenshare(&self) {
        self.registry.set_screenshare_track(None);
        self.screenshare_strategy.update_media(None, None);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::device::mock::{DisplayBehavior, MockDeviceCapture};
    use crate::storage::SessionStorage;
    use crate::transport::mock::MockStageConnector;

    struct Fixture {
        client: StageClient,
        connector: Arc<MockStageConnector>,
    }

    fn client_with(connector: MockStageConnector, capture: MockDeviceCapture) -> Fixture {
        let connector = Arc::new(connector);
        let client = StageClient::new(
            &Config::default(),
            connector.clone(),
            Arc::new(capture),
            Arc::new(SessionStorage::new()),
        );
        Fixture { client, connector }
    }

    fn devices() -> MockDeviceCapture {
        MockDeviceCapture::with_devices(&["camA", "camB"], &["micA"])
    }

    #[tokio::test]
    async fn test_device_switch_refreshes_published_video() {
        let fx = client_with(MockStageConnector::new(), devices());
        fx.client.initialize_default_devices().await.unwrap();
        fx.client.join_stage("tok1").await.unwrap();
        let connection = fx.connector.last_connection().unwrap();
        let cam_a = fx.client.registry().video().unwrap();
        assert!(connection.published_tracks().contains(&cam_a));

        let cam_b = fx.client.select_video_device("camB").await.unwrap();

        assert_eq!(connection.refresh_count(), 1);
        let published = connection.published_tracks();
        assert_eq!(published.first(), Some(&cam_b));
        assert!(!published.contains(&cam_a));
        assert_eq!(cam_b.device_id(), Some("camB"));
    }

    #[tokio::test]
    async fn test_device_switch_before_join_makes_no_transport_call() {
        let fx = client_with(MockStageConnector::new(), devices());

        fx.client.select_video_device("camB").await.unwrap();

        assert_eq!(fx.connector.open_count(), 0);
        assert_eq!(
            fx.client.primary_strategy().tracks_to_publish(),
            vec![fx.client.registry().video().unwrap()]
        );
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_previous_camera() {
        let fx = client_with(MockStageConnector::new(), devices().denying(&["camB"]));
        let cam_a = fx.client.select_video_device("camA").await.unwrap();

        let result = fx.client.select_video_device("camB").await;

        assert!(matches!(result, Err(StageError::DeviceUnavailable(_))));
        assert_eq!(
            fx.client.primary_strategy().tracks_to_publish(),
            vec![cam_a]
        );
    }

    #[tokio::test]
    async fn test_mute_toggle_is_visible_to_strategy() {
        let fx = client_with(MockStageConnector::new(), devices());
        assert_eq!(fx.client.toggle_audio_mute(), None);
        fx.client.initialize_default_devices().await.unwrap();

        assert_eq!(fx.client.toggle_audio_mute(), Some(true));

        let published = fx.client.primary_strategy().tracks_to_publish();
        let mic = published.iter().find(|t| t.device_id() == Some("micA")).unwrap();
        assert!(mic.is_muted());
        assert_eq!(fx.client.toggle_video_mute(), Some(true));
    }

    #[tokio::test]
    async fn test_screenshare_cancel_is_silent() {
        let fx = client_with(
            MockStageConnector::new(),
            devices().with_display(DisplayBehavior::Cancel),
        );

        let outcome = fx.client.publish_screenshare("share").await.unwrap();

        assert_eq!(outcome, ScreenshareCapture::Cancelled);
        assert_eq!(fx.connector.open_count(), 0);
        assert!(fx.client.registry().screenshare().is_none());
    }

    #[tokio::test]
    async fn test_screenshare_empty_token_skips_picker() {
        let fx = client_with(MockStageConnector::new(), devices());

        let result = fx.client.publish_screenshare("").await;

        assert!(matches!(result, Err(StageError::EmptyToken)));
        assert!(fx.client.registry().screenshare().is_none());
    }

    #[tokio::test]
    async fn test_publish_and_unpublish_screenshare() {
        let fx = client_with(MockStageConnector::new(), devices());

        let outcome = fx.client.publish_screenshare("share").await.unwrap();
        let handle = fx.client.registry().screenshare().unwrap();
        assert_eq!(outcome, ScreenshareCapture::Started(handle.clone()));

        let connection = fx.connector.last_connection().unwrap();
        assert_eq!(connection.published_tracks(), vec![handle]);
        assert!(fx.client.screenshare_session().snapshot().is_joined());
        assert!(!fx.client.primary_session().snapshot().is_joined());
        assert_eq!(
            fx.client
                .cached_screenshare_token()
                .unwrap()
                .expose_secret(),
            "share"
        );

        fx.client.unpublish_screenshare().await.unwrap();

        assert!(fx.client.registry().screenshare().is_none());
        assert!(fx.client.screenshare_strategy().tracks_to_publish().is_empty());
        assert_eq!(connection.leave_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_screenshare_join_releases_track() {
        let fx = client_with(
            MockStageConnector::new().rejecting_tokens(&["bad"]),
            devices(),
        );

        let result = fx.client.publish_screenshare("bad").await;

        assert!(matches!(result, Err(StageError::JoinFailed(_))));
        assert!(fx.client.registry().screenshare().is_none());
        assert!(fx.client.cached_screenshare_token().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_publish_keeps_winning_share() {
        let fx = client_with(MockStageConnector::new(), devices());

        let (first, second) = tokio::join!(
            fx.client.publish_screenshare("s1"),
            fx.client.publish_screenshare("s2")
        );

        assert!(matches!(first, Ok(ScreenshareCapture::Started(_))));
        assert!(matches!(
            second,
            Err(StageError::InvalidState {
                state: SessionState::Joined,
                ..
            })
        ));
        assert_eq!(fx.connector.open_count(), 1);
        assert!(fx.client.screenshare_session().snapshot().is_joined());

        let handle = fx.client.registry().screenshare().unwrap();
        assert_eq!(
            fx.client.screenshare_strategy().tracks_to_publish(),
            vec![handle.clone()]
        );
        let connection = fx.connector.last_connection().unwrap();
        assert_eq!(connection.published_tracks(), vec![handle]);
    }

    #[tokio::test]
    async fn test_cached_token_round_trip() {
        let fx = client_with(MockStageConnector::new(), devices());
        assert!(matches!(
            fx.client.rejoin_stage().await,
            Err(StageError::EmptyToken)
        ));

        fx.client.join_stage("tok1").await.unwrap();
        fx.client.leave_stage().await.unwrap();
        let mut views = fx.client.subscribe_stage();
        views
            .wait_for(|v| v.state == SessionState::Idle)
            .await
            .unwrap();

        fx.client.rejoin_stage().await.unwrap();

        assert_eq!(fx.connector.open_count(), 2);
        assert_eq!(fx.connector.last_connection().unwrap().token(), "tok1");
        assert!(fx.client.primary_session().snapshot().is_joined());
    }

    #[tokio::test]
    async fn test_shutdown_stops_sessions() {
        let fx = client_with(MockStageConnector::new(), devices());
        fx.client.join_stage("tok1").await.unwrap();
        let primary = fx.client.primary_session().clone();

        fx.client.shutdown().await;

        assert!(primary.is_cancelled());
        assert_eq!(fx.connector.last_connection().unwrap().leave_count(), 1);
    }
}
