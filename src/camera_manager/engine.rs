use super::camera::Camera;
use super::store::CameraManagerReadOnlyConfigStore;
use super::types::{
    CameraIcon, CameraIds, CameraMetadata, CameraQuery, Engine, EngineOptions, EngineResult,
    EventPayload, EventQuery, MediaCapabilities, MediaMetadata, MediaMetadataQuery, QueryMaxAge,
    QueryReturn, Recording, RecordingQuery, RecordingSegment, RecordingSegmentsQuery, Review,
    ReviewQuery,
};
use crate::error::Result;
use crate::fetch::HttpEndpoint;
use crate::hass::HomeAssistant;
use crate::models::CameraConfig;
use crate::view::media::ViewMedia;
use crate::view::media::ViewItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const FALLBACK_ICON: &str = "mdi:video";

/// Translates the uniform query surface into one vendor's API.
///
/// Every data method defaults to "unsupported" (`None` / no-op). The generic
/// engine relies on these defaults; vendor engines override what they back.
#[async_trait]
pub trait CameraManagerEngine: Send + Sync {
    /// Engine discriminator
    fn engine_type(&self) -> Engine;

    /// Build and initialize a camera of this engine's type.
    async fn create_camera(&self, hass: &dyn HomeAssistant, config: CameraConfig) -> Result<Arc<dyn Camera>>;

    fn generate_default_event_query(
        &self,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _camera_ids: &CameraIds,
        _query: &EventQuery,
    ) -> Option<Vec<EventQuery>> {
        None
    }

    fn generate_default_recording_query(
        &self,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _camera_ids: &CameraIds,
        _query: &RecordingQuery,
    ) -> Option<Vec<RecordingQuery>> {
        None
    }

    fn generate_default_review_query(
        &self,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _camera_ids: &CameraIds,
        _query: &ReviewQuery,
    ) -> Option<Vec<ReviewQuery>> {
        None
    }

    fn generate_default_recording_segments_query(
        &self,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _camera_ids: &CameraIds,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Option<Vec<RecordingSegmentsQuery>> {
        None
    }

    async fn get_events(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &EventQuery,
        _options: EngineOptions,
    ) -> Result<Option<QueryReturn<EventQuery, EventPayload>>> {
        Ok(None)
    }

    async fn get_recordings(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &RecordingQuery,
        _options: EngineOptions,
    ) -> Result<Option<QueryReturn<RecordingQuery, Vec<Recording>>>> {
        Ok(None)
    }

    async fn get_reviews(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &ReviewQuery,
        _options: EngineOptions,
    ) -> Result<Option<QueryReturn<ReviewQuery, Vec<Review>>>> {
        Ok(None)
    }

    async fn get_recording_segments(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &RecordingSegmentsQuery,
        _options: EngineOptions,
    ) -> Result<Option<QueryReturn<RecordingSegmentsQuery, Vec<RecordingSegment>>>> {
        Ok(None)
    }

    fn generate_media_from_events(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &EventQuery,
        _results: &EngineResult<EventPayload>,
    ) -> Option<Vec<ViewItem>> {
        None
    }

    fn generate_media_from_recordings(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &RecordingQuery,
        _results: &EngineResult<Vec<Recording>>,
    ) -> Option<Vec<ViewItem>> {
        None
    }

    fn generate_media_from_reviews(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &ReviewQuery,
        _results: &EngineResult<Vec<Review>>,
    ) -> Option<Vec<ViewItem>> {
        None
    }

    async fn get_media_download_path(
        &self,
        _hass: &dyn HomeAssistant,
        _camera: &CameraConfig,
        _media: &ViewMedia,
    ) -> Result<Option<HttpEndpoint>> {
        Ok(None)
    }

    async fn favorite_media(
        &self,
        _hass: &dyn HomeAssistant,
        _camera: &CameraConfig,
        _media: &ViewMedia,
        _favorite: bool,
    ) -> Result<()> {
        Ok(())
    }

    async fn review_media(
        &self,
        _hass: &dyn HomeAssistant,
        _camera: &CameraConfig,
        _media: &ViewMedia,
        _reviewed: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// Seconds into `media` at which wall-clock `target` occurs.
    async fn get_media_seek_time(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _media: &ViewMedia,
        _target: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        Ok(None)
    }

    async fn get_media_metadata(
        &self,
        _hass: &dyn HomeAssistant,
        _store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &MediaMetadataQuery,
        _options: EngineOptions,
    ) -> Result<Option<QueryReturn<MediaMetadataQuery, MediaMetadata>>> {
        Ok(None)
    }

    fn get_camera_metadata(&self, hass: &dyn HomeAssistant, config: &CameraConfig) -> CameraMetadata {
        camera_metadata_from_config(hass, config, None)
    }

    fn get_media_capabilities(&self, _media: &ViewMedia) -> Option<MediaCapabilities> {
        None
    }

    /// `None` means results of this query must not be reused.
    fn get_query_result_max_age(&self, _query: &CameraQuery) -> Option<QueryMaxAge> {
        None
    }
}

/// Title and icon resolution shared by every engine.
///
/// Title: configured title, camera entity friendly name, webrtc-card entity
/// friendly name, camera ID, then empty. Icon: configured icon, camera entity
/// icon, then a fixed fallback.
pub fn camera_metadata_from_config(
    hass: &dyn HomeAssistant,
    config: &CameraConfig,
    engine_icon: Option<&str>,
) -> CameraMetadata {
    let camera_state = config.camera_entity.as_deref().and_then(|e| hass.state(e));
    let webrtc_state = config.webrtc_card.entity.as_deref().and_then(|e| hass.state(e));

    let title = config
        .title
        .clone()
        .or_else(|| camera_state.as_ref().and_then(|s| s.friendly_name().map(str::to_string)))
        .or_else(|| webrtc_state.as_ref().and_then(|s| s.friendly_name().map(str::to_string)))
        .or_else(|| config.resolved_id())
        .unwrap_or_default();

    let icon = config
        .icon
        .clone()
        .or_else(|| camera_state.as_ref().and_then(|s| s.icon().map(str::to_string)))
        .unwrap_or_else(|| FALLBACK_ICON.to_string());

    CameraMetadata {
        title,
        icon: CameraIcon {
            icon,
            entity: config.camera_entity().map(str::to_string),
        },
        engine_icon: engine_icon.map(str::to_string),
    }
}
