//! motionEye integration
//!
//! Movies and images are browsed through the `motioneye` media source. Folder
//! and file titles carry dates and times in the camera's configured patterns.

use super::browse_media::{
    BrowseMedia, BrowseMediaEngine, BrowseMediaParser, BrowseMediaTarget, TimeRange, TitleFormats,
};
use crate::camera_manager::camera::{require_camera_entity, Camera, CameraBase};
use crate::camera_manager::engine::{camera_metadata_from_config, CameraManagerEngine};
use crate::camera_manager::factory::EngineCollaborators;
use crate::camera_manager::store::CameraManagerReadOnlyConfigStore;
use crate::camera_manager::types::{
    CameraIds, CameraMetadata, CameraQuery, Engine, EngineOptions, EngineResult, EventPayload,
    EventQuery, QueryMaxAge, QueryReturn,
};
use crate::capabilities::{CapabilitiesRaw, CapabilityKey};
use crate::error::{CameraInitializationReason, Result};
use crate::hass::{EntityRegistry, HomeAssistant};
use crate::models::{CameraConfig, MotionEyeMediaConfig};
use crate::view::media::{MediaType, ViewItem};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::any::Any;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

const MEDIA_SOURCE_PREFIX: &str = "media-source://motioneye/";
const ENGINE_ICON: &str = "motioneye";

/// The motionEye device a camera entity belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
struct MotionEyeDevice {
    config_entry_id: String,
    device_id: String,
}

impl MotionEyeDevice {
    fn root(&self, kind: &str) -> String {
        format!(
            "{}{}#{}#{}",
            MEDIA_SOURCE_PREFIX, self.config_entry_id, self.device_id, kind
        )
    }
}

pub struct MotionEyeCamera {
    base: CameraBase,
    registry: Arc<dyn EntityRegistry>,
    device: RwLock<Option<MotionEyeDevice>>,
}

impl MotionEyeCamera {
    pub fn new(config: CameraConfig, registry: Arc<dyn EntityRegistry>) -> Result<Self> {
        Ok(MotionEyeCamera {
            base: CameraBase::new(config, Engine::MotionEye)?,
            registry,
            device: RwLock::new(None),
        })
    }

    fn device(&self) -> Option<MotionEyeDevice> {
        self.device.read().ok().and_then(|d| d.clone())
    }

    /// Media source root for movies (clips) or images (snapshots)
    pub fn media_root(&self, media_type: MediaType) -> Option<String> {
        let device = self.device()?;
        match media_type {
            MediaType::Clip => Some(device.root("movies")),
            MediaType::Snapshot => Some(device.root("images")),
            _ => None,
        }
    }

    fn browse_target(&self, media_type: MediaType) -> Option<BrowseMediaTarget> {
        let config = self.config();
        let patterns: &MotionEyeMediaConfig = match media_type {
            MediaType::Clip => &config.motioneye.movies,
            _ => &config.motioneye.images,
        };
        Some(BrowseMediaTarget {
            camera_id: self.id().to_string(),
            root: self.media_root(media_type)?,
            media_type,
            title_formats: Some(TitleFormats {
                directory: patterns.directory_pattern.clone(),
                file: patterns.file_pattern.clone(),
            }),
        })
    }
}

#[async_trait]
impl Camera for MotionEyeCamera {
    fn base(&self) -> &CameraBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn initialize(&self, hass: &dyn HomeAssistant) -> Result<()> {
        let entity = require_camera_entity(hass, self.registry.as_ref(), &self.config()).await?;
        let device = entity
            .config_entry_id
            .clone()
            .zip(entity.device_id.clone())
            .map(|(config_entry_id, device_id)| MotionEyeDevice {
                config_entry_id,
                device_id,
            })
            .ok_or_else(|| self.base.initialization_error(CameraInitializationReason::MotionEyeDevice))?;

        self.base.set_capabilities(CapabilitiesRaw::new().with_all(&[
            CapabilityKey::Live,
            CapabilityKey::Menu,
            CapabilityKey::Clips,
            CapabilityKey::Snapshots,
            CapabilityKey::Substream,
            CapabilityKey::Trigger,
            CapabilityKey::RemoteControlEntity,
        ]));

        debug!(
            "[MotionEyeCamera] Initialized camera {} (device: {})",
            self.id(),
            device.device_id
        );
        if let Ok(mut slot) = self.device.write() {
            *slot = Some(device);
        }
        Ok(())
    }
}

/// Title of the file without its extension (`14-03-27.mp4` -> `14-03-27`)
fn file_stem(title: &str) -> &str {
    Path::new(title)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(title)
}

struct MotionEyeParser;

impl MotionEyeParser {
    fn parse_day(formats: &TitleFormats, title: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(title.trim(), &formats.directory).ok()
    }
}

impl BrowseMediaParser for MotionEyeParser {
    fn should_expand(&self, target: &BrowseMediaTarget, folder: &BrowseMedia, range: &TimeRange) -> bool {
        let Some(formats) = &target.title_formats else {
            return true;
        };
        match Self::parse_day(formats, &folder.title).and_then(|day| day.and_hms_opt(0, 0, 0)) {
            Some(start) => {
                let start = start.and_utc();
                range.overlaps(start, Some(start + Duration::days(1)))
            }
            None => true,
        }
    }

    fn parse_file(
        &self,
        target: &BrowseMediaTarget,
        parent: &BrowseMedia,
        file: &BrowseMedia,
    ) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
        let formats = target.title_formats.as_ref()?;
        let stem = file_stem(file.title.trim());

        // Patterns may hold a full timestamp, or only a time below a date folder
        if let Ok(datetime) = NaiveDateTime::parse_from_str(stem, &formats.file) {
            return Some((datetime.and_utc(), None));
        }
        let day = Self::parse_day(formats, &parent.title)?;
        let time = NaiveTime::parse_from_str(stem, &formats.file).ok()?;
        Some((day.and_time(time).and_utc(), None))
    }
}

pub struct MotionEyeCameraManagerEngine {
    registry: Arc<dyn EntityRegistry>,
    browse: BrowseMediaEngine,
}

impl MotionEyeCameraManagerEngine {
    pub fn new(collaborators: &EngineCollaborators) -> Self {
        MotionEyeCameraManagerEngine {
            registry: collaborators.entity_registry.clone(),
            browse: BrowseMediaEngine::new(
                Engine::MotionEye,
                Arc::new(MotionEyeParser),
                collaborators.request_cache.clone(),
            ),
        }
    }

    /// Media types a query asks for. No preference means both.
    fn media_types(query: &EventQuery) -> Vec<MediaType> {
        match (query.has_clip, query.has_snapshot) {
            (Some(true), Some(true)) | (None, None) => vec![MediaType::Clip, MediaType::Snapshot],
            (Some(true), _) | (_, Some(false)) => vec![MediaType::Clip],
            (_, Some(true)) | (Some(false), _) => vec![MediaType::Snapshot],
        }
    }
}

#[async_trait]
impl CameraManagerEngine for MotionEyeCameraManagerEngine {
    fn engine_type(&self) -> Engine {
        Engine::MotionEye
    }

    async fn create_camera(&self, hass: &dyn HomeAssistant, config: CameraConfig) -> Result<Arc<dyn Camera>> {
        let camera = MotionEyeCamera::new(config, self.registry.clone())?;
        camera.initialize(hass).await?;
        Ok(Arc::new(camera))
    }

    fn generate_default_event_query(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        camera_ids: &CameraIds,
        query: &EventQuery,
    ) -> Option<Vec<EventQuery>> {
        let camera_ids: CameraIds = camera_ids
            .iter()
            .filter(|id| store.get_camera(id).is_some_and(|c| c.engine() == Engine::MotionEye))
            .cloned()
            .collect();
        self.browse.generate_default_event_query(&camera_ids, query)
    }

    async fn get_events(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &EventQuery,
        options: EngineOptions,
    ) -> Result<Option<QueryReturn<EventQuery, EventPayload>>> {
        // motionEye has no favorites
        if query.favorite == Some(true) {
            return Ok(None);
        }

        let media_types = Self::media_types(query);
        let targets: Vec<BrowseMediaTarget> = query
            .camera_ids
            .iter()
            .filter_map(|id| store.get_camera(id))
            .flat_map(|camera| {
                let targets: Vec<BrowseMediaTarget> = camera
                    .as_any()
                    .downcast_ref::<MotionEyeCamera>()
                    .map(|camera| {
                        media_types
                            .iter()
                            .filter_map(|media_type| camera.browse_target(*media_type))
                            .collect()
                    })
                    .unwrap_or_default();
                targets
            })
            .collect();
        if targets.is_empty() {
            return Ok(None);
        }

        self.browse.get_events(hass, targets, query, options).await
    }

    fn generate_media_from_events(
        &self,
        _hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &EventQuery,
        results: &EngineResult<EventPayload>,
    ) -> Option<Vec<ViewItem>> {
        self.browse.generate_media_from_events(store, query, results)
    }

    fn get_camera_metadata(&self, hass: &dyn HomeAssistant, config: &CameraConfig) -> CameraMetadata {
        camera_metadata_from_config(hass, config, Some(ENGINE_ICON))
    }

    fn get_query_result_max_age(&self, query: &CameraQuery) -> Option<QueryMaxAge> {
        self.browse.get_query_result_max_age(query)
    }
}
