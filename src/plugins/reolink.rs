//! Reolink integration
//!
//! The camera entity's unique ID encodes the device and channel
//! (`<device>_<channel>[_<suffix>]`). PTZ is driven through the integration's
//! button and select entities; recordings come from the `reolink` media source.

use super::browse_media::{
    BrowseMedia, BrowseMediaEngine, BrowseMediaParser, BrowseMediaTarget, TimeRange,
};
use crate::camera_manager::camera::{require_camera_entity, Camera, CameraBase};
use crate::camera_manager::engine::{camera_metadata_from_config, CameraManagerEngine};
use crate::camera_manager::factory::EngineCollaborators;
use crate::camera_manager::store::CameraManagerReadOnlyConfigStore;
use crate::camera_manager::types::{
    CameraIds, CameraMetadata, CameraQuery, Engine, EngineOptions, EngineResult, EventPayload,
    EventQuery, QueryMaxAge, QueryReturn,
};
use crate::capabilities::{CapabilitiesRaw, CapabilityKey, PtzCapabilities, PtzMovementType};
use crate::error::{CameraInitializationReason, Result};
use crate::hass::{perform_action, ActionExecutor, Entity, EntityRegistry, HomeAssistant};
use crate::models::{CameraConfig, CameraProxyConfig, ReolinkMediaResolution};
use crate::ptz::{PtzAction, PtzActionOptions, PtzPhase};
use crate::view::media::{MediaType, ViewItem};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

const MEDIA_SOURCE_PREFIX: &str = "media-source://reolink/";
const ENGINE_ICON: &str = "reolink";

/// Device identifier and channel parsed from a camera entity unique ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReolinkChannel {
    pub device: String,
    pub channel: u32,
}

impl ReolinkChannel {
    /// Unique ID prefix shared by every entity of this channel
    pub fn entity_prefix(&self) -> String {
        format!("{}_{}_", self.device, self.channel)
    }
}

static UNIQUE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?<device>.+?)_(?<channel>\d+)(?:_.*)?$").ok());

/// `<HH:MM:SS> <h>:<mm>:<ss>`: start time then duration
static FILE_TITLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?<start>\d{1,2}:\d{2}:\d{2})\s+(?<h>\d+):(?<m>\d{2}):(?<s>\d{2})").ok()
});

pub fn parse_unique_id(unique_id: &str) -> Option<ReolinkChannel> {
    let captures = UNIQUE_ID.as_ref()?.captures(unique_id)?;
    Some(ReolinkChannel {
        device: captures["device"].to_string(),
        channel: captures["channel"].parse().ok()?,
    })
}

/// PTZ entities found for one channel
#[derive(Debug, Clone, Default, PartialEq)]
struct ReolinkPtzEntities {
    buttons: HashMap<PtzAction, String>,
    stop: Option<String>,
    presets: Option<String>,
}

impl ReolinkPtzEntities {
    fn from_entities(prefix: &str, entities: &[Entity]) -> Self {
        let mut found = ReolinkPtzEntities::default();
        for entity in entities {
            let Some(suffix) = entity
                .unique_id
                .as_deref()
                .and_then(|id| id.strip_prefix(prefix))
            else {
                continue;
            };

            match (entity.domain(), suffix) {
                ("button", "ptz_stop") => found.stop = Some(entity.entity_id.clone()),
                ("select", "ptz_preset") => found.presets = Some(entity.entity_id.clone()),
                ("button", _) => {
                    let action = PtzAction::MOVEMENTS
                        .into_iter()
                        .find(|action| suffix == format!("ptz_{}", action.as_str()));
                    if let Some(action) = action {
                        found.buttons.insert(action, entity.entity_id.clone());
                    }
                }
                _ => {}
            }
        }
        found
    }

    fn capabilities(&self, preset_names: Vec<String>) -> Option<PtzCapabilities> {
        let movement = if self.stop.is_some() {
            PtzMovementType::Continuous
        } else {
            PtzMovementType::Relative
        };

        let mut capabilities = PtzCapabilities::default();
        for action in self.buttons.keys() {
            capabilities.set(*action, vec![movement]);
        }
        if !preset_names.is_empty() {
            capabilities.presets = Some(preset_names);
        }
        capabilities.has_capability().then_some(capabilities)
    }
}

#[derive(Debug, Clone)]
struct ReolinkState {
    channel: ReolinkChannel,
    config_entry_id: Option<String>,
    ptz: ReolinkPtzEntities,
}

pub struct ReolinkCamera {
    base: CameraBase,
    registry: Arc<dyn EntityRegistry>,
    state: RwLock<Option<ReolinkState>>,
}

impl ReolinkCamera {
    pub fn new(config: CameraConfig, registry: Arc<dyn EntityRegistry>) -> Result<Self> {
        Ok(ReolinkCamera {
            base: CameraBase::new(config, Engine::Reolink)?,
            registry,
            state: RwLock::new(None),
        })
    }

    fn state(&self) -> Option<ReolinkState> {
        self.state.read().ok().and_then(|s| s.clone())
    }

    pub fn channel(&self) -> Option<u32> {
        self.state().map(|s| s.channel.channel)
    }

    /// Media source folder holding this channel's recordings at the configured resolution
    pub fn media_root(&self) -> Option<String> {
        let state = self.state()?;
        let entry = state.config_entry_id?;
        let stream = match self.config().reolink.media_resolution {
            ReolinkMediaResolution::High => "main",
            ReolinkMediaResolution::Low => "sub",
        };
        Some(format!(
            "{}RES|{}|{}|{}",
            MEDIA_SOURCE_PREFIX, entry, state.channel.channel, stream
        ))
    }

    async fn find_ptz_entities(
        &self,
        hass: &dyn HomeAssistant,
        camera_entity: &Entity,
        channel: &ReolinkChannel,
    ) -> ReolinkPtzEntities {
        let prefix = channel.entity_prefix();
        let predicate = |entity: &Entity| {
            entity.platform == "reolink"
                && !entity.is_disabled()
                && entity.config_entry_id == camera_entity.config_entry_id
                && entity
                    .unique_id
                    .as_deref()
                    .is_some_and(|id| id.starts_with(prefix.as_str()))
        };

        match self.registry.get_matching_entities(hass, &predicate).await {
            Ok(entities) => ReolinkPtzEntities::from_entities(&prefix, &entities),
            Err(e) => {
                debug!("[ReolinkCamera] PTZ entity discovery for {} failed: {}", self.id(), e);
                ReolinkPtzEntities::default()
            }
        }
    }
}

#[async_trait]
impl Camera for ReolinkCamera {
    fn base(&self) -> &CameraBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn initialize(&self, hass: &dyn HomeAssistant) -> Result<()> {
        let entity = require_camera_entity(hass, self.registry.as_ref(), &self.config()).await?;
        let channel = entity
            .unique_id
            .as_deref()
            .and_then(parse_unique_id)
            .ok_or_else(|| self.base.initialization_error(CameraInitializationReason::ReolinkUniqueId))?;

        let ptz = self.find_ptz_entities(hass, &entity, &channel).await;
        let preset_names = ptz
            .presets
            .as_deref()
            .and_then(|entity_id| hass.state(entity_id))
            .map(|state| state.options())
            .unwrap_or_default();

        let capabilities = self.base.set_capabilities(
            CapabilitiesRaw::new()
                .with_all(&[
                    CapabilityKey::Live,
                    CapabilityKey::Menu,
                    CapabilityKey::Substream,
                    CapabilityKey::Trigger,
                    CapabilityKey::Clips,
                    CapabilityKey::RemoteControlEntity,
                ])
                .with_ptz(ptz.capabilities(preset_names)),
        );

        info!(
            "[ReolinkCamera] Initialized camera {} (device: {}, channel: {}, ptz: {})",
            self.id(),
            channel.device,
            channel.channel,
            capabilities.has_ptz_capability()
        );

        if let Ok(mut state) = self.state.write() {
            *state = Some(ReolinkState {
                channel,
                config_entry_id: entity.config_entry_id.clone(),
                ptz,
            });
        }
        Ok(())
    }

    async fn execute_ptz_action(
        &self,
        executor: &dyn ActionExecutor,
        action: PtzAction,
        options: &PtzActionOptions,
    ) -> Result<bool> {
        if self
            .base
            .execute_configured_ptz_action(executor, action, options)
            .await?
        {
            return Ok(true);
        }

        let Some(state) = self.state() else {
            return Ok(false);
        };

        let request = if action == PtzAction::Preset {
            match (state.ptz.presets.as_deref(), options.preset.as_deref()) {
                (Some(entity_id), Some(preset)) => perform_action(
                    "select.select_option",
                    entity_id,
                    Some(json!({ "option": preset })),
                ),
                _ => return Ok(false),
            }
        } else {
            let continuous = state.ptz.stop.is_some();
            match (options.phase, state.ptz.buttons.get(&action)) {
                (_, None) => return Ok(false),
                (Some(PtzPhase::Start), Some(button)) => perform_action("button.press", button, None),
                (Some(PtzPhase::Stop), Some(_)) => match state.ptz.stop.as_deref() {
                    Some(stop) => perform_action("button.press", stop, None),
                    // Relative presses stop by themselves
                    None => return Ok(true),
                },
                (None, Some(button)) if !continuous => perform_action("button.press", button, None),
                (None, Some(_)) => return Ok(false),
            }
        };

        executor.execute_actions(vec![request]).await?;
        Ok(true)
    }

    fn proxy_config(&self) -> CameraProxyConfig {
        let config = self.config();
        CameraProxyConfig {
            media: config.proxy.media.resolve(true),
            ssl_verification: config.proxy.ssl_verification.resolve(false),
            ..self.base.default_proxy_config()
        }
    }
}

/// Reads times from the `reolink` media source tree: day folders carry the date
/// in their content ID, files are titled `HH:MM:SS H:MM:SS` (start, duration).
struct ReolinkParser;

fn parse_day(content_id: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = content_id.strip_prefix(MEDIA_SOURCE_PREFIX)?.split('|').collect();
    match parts.as_slice() {
        ["DAY", _entry, _channel, _stream, year, month, day] => {
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
        }
        _ => None,
    }
}

fn day_range(date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some((start, start + Duration::days(1)))
}

impl BrowseMediaParser for ReolinkParser {
    fn should_expand(&self, _target: &BrowseMediaTarget, folder: &BrowseMedia, range: &TimeRange) -> bool {
        match parse_day(&folder.media_content_id).and_then(day_range) {
            Some((start, end)) => range.overlaps(start, Some(end)),
            None => true,
        }
    }

    fn parse_file(
        &self,
        _target: &BrowseMediaTarget,
        parent: &BrowseMedia,
        file: &BrowseMedia,
    ) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
        let date = parse_day(&parent.media_content_id)?;
        let captures = FILE_TITLE.as_ref()?.captures(file.title.trim())?;

        let time = NaiveTime::parse_from_str(&captures["start"], "%H:%M:%S").ok()?;
        let start = date.and_time(time).and_utc();
        let duration = Duration::hours(captures["h"].parse().ok()?)
            + Duration::minutes(captures["m"].parse().ok()?)
            + Duration::seconds(captures["s"].parse().ok()?);
        Some((start, Some(start + duration)))
    }
}

pub struct ReolinkCameraManagerEngine {
    registry: Arc<dyn EntityRegistry>,
    browse: BrowseMediaEngine,
}

impl ReolinkCameraManagerEngine {
    pub fn new(collaborators: &EngineCollaborators) -> Self {
        ReolinkCameraManagerEngine {
            registry: collaborators.entity_registry.clone(),
            browse: BrowseMediaEngine::new(
                Engine::Reolink,
                Arc::new(ReolinkParser),
                collaborators.request_cache.clone(),
            ),
        }
    }

    fn reolink_camera_ids(store: &dyn CameraManagerReadOnlyConfigStore, camera_ids: &CameraIds) -> CameraIds {
        camera_ids
            .iter()
            .filter(|id| store.get_camera(id).is_some_and(|c| c.engine() == Engine::Reolink))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CameraManagerEngine for ReolinkCameraManagerEngine {
    fn engine_type(&self) -> Engine {
        Engine::Reolink
    }

    async fn create_camera(&self, hass: &dyn HomeAssistant, config: CameraConfig) -> Result<Arc<dyn Camera>> {
        let camera = ReolinkCamera::new(config, self.registry.clone())?;
        camera.initialize(hass).await?;
        Ok(Arc::new(camera))
    }

    fn generate_default_event_query(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        camera_ids: &CameraIds,
        query: &EventQuery,
    ) -> Option<Vec<EventQuery>> {
        // Reolink recordings are clips only
        if query.has_snapshot == Some(true) {
            return None;
        }
        self.browse
            .generate_default_event_query(&Self::reolink_camera_ids(store, camera_ids), query)
    }

    async fn get_events(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &EventQuery,
        options: EngineOptions,
    ) -> Result<Option<QueryReturn<EventQuery, EventPayload>>> {
        if query.has_snapshot == Some(true) || query.favorite == Some(true) {
            return Ok(None);
        }

        let targets: Vec<BrowseMediaTarget> = query
            .camera_ids
            .iter()
            .filter_map(|id| {
                let camera = store.get_camera(id)?;
                let root = camera.as_any().downcast_ref::<ReolinkCamera>()?.media_root()?;
                Some(BrowseMediaTarget {
                    camera_id: id.clone(),
                    root,
                    media_type: MediaType::Clip,
                    title_formats: None,
                })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CameraInitializationError, Error};
    use crate::hass::{EntityRegistryManager, HassEntityState};
    use crate::testing::{MockHomeAssistant, RecordingActionExecutor};
    use chrono::TimeZone;

    fn config() -> CameraConfig {
        CameraConfig {
            camera_entity: Some("camera.office_reolink".to_string()),
            ..Default::default()
        }
    }

    fn camera() -> ReolinkCamera {
        ReolinkCamera::new(config(), Arc::new(EntityRegistryManager::new())).unwrap()
    }

    fn camera_entity(unique_id: &str) -> Entity {
        Entity::new("camera.office_reolink", "reolink")
            .with_unique_id(unique_id)
            .with_config_entry_id("01J2")
    }

    fn button(name: &str, unique_id: &str) -> Entity {
        Entity::new(format!("button.{}", name), "reolink")
            .with_unique_id(unique_id)
            .with_config_entry_id("01J2")
    }

    fn node(title: &str, content_id: &str) -> BrowseMedia {
        BrowseMedia {
            title: title.to_string(),
            media_class: String::new(),
            media_content_type: String::new(),
            media_content_id: content_id.to_string(),
            can_play: true,
            can_expand: false,
            thumbnail: None,
            children: None,
        }
    }

    #[test]
    fn test_parse_unique_id() {
        assert_eq!(
            parse_unique_id("85270002TS7D4RUP_0_main"),
            Some(ReolinkChannel {
                device: "85270002TS7D4RUP".to_string(),
                channel: 0
            })
        );
        assert_eq!(parse_unique_id("85270002TS7D4RUP_12").map(|c| c.channel), Some(12));
        assert_eq!(parse_unique_id("85270002TS7D4RUP"), None);
        assert_eq!(parse_unique_id("device_main"), None);
        assert!(UNIQUE_ID.is_some() && FILE_TITLE.is_some());
    }

    #[tokio::test]
    async fn test_channel_from_unique_id() {
        let hass = MockHomeAssistant::new().with_entity(camera_entity("85270002TS7D4RUP_3"));
        let camera = camera();
        camera.initialize(&hass).await.unwrap();
        assert_eq!(camera.channel(), Some(3));
    }

    #[tokio::test]
    async fn test_unique_id_mismatch_is_fatal() {
        let hass = MockHomeAssistant::new().with_entity(camera_entity("85270002TS7D4RUP"));
        let result = camera().initialize(&hass).await;
        assert!(matches!(
            result,
            Err(Error::CameraInitialization(CameraInitializationError {
                reason: CameraInitializationReason::ReolinkUniqueId,
                ..
            }))
        ));

        let hass = MockHomeAssistant::new().with_entity(Entity::new("camera.office_reolink", "reolink"));
        assert!(camera().initialize(&hass).await.is_err());
    }

    #[tokio::test]
    async fn test_relative_buttons_and_presets() {
        let hass = MockHomeAssistant::new()
            .with_entity(camera_entity("85270002TS7D4RUP_0_main"))
            .with_entity(button("office_reolink_ptz_left", "85270002TS7D4RUP_0_ptz_left"))
            .with_entity(
                Entity::new("select.office_reolink_ptz_preset", "reolink")
                    .with_unique_id("85270002TS7D4RUP_0_ptz_preset")
                    .with_config_entry_id("01J2"),
            )
            .with_entity(button("garage_ptz_right", "85270002TS7D4RUP_1_ptz_right"))
            .with_state(
                HassEntityState::new("select.office_reolink_ptz_preset", "door")
                    .with_attribute("options", json!(["door", "gate"])),
            );
        let camera = camera();
        camera.initialize(&hass).await.unwrap();

        let ptz = camera.capabilities().unwrap().get_ptz_capabilities().cloned().unwrap();
        assert_eq!(ptz.left, Some(vec![PtzMovementType::Relative]));
        assert_eq!(ptz.right, None);
        assert_eq!(ptz.presets, Some(vec!["door".to_string(), "gate".to_string()]));

        let executor = RecordingActionExecutor::new();
        assert!(camera
            .execute_ptz_action(&executor, PtzAction::Left, &PtzActionOptions::default())
            .await
            .unwrap());
        // No stop button: stopping a bump is a no-op
        assert!(camera
            .execute_ptz_action(&executor, PtzAction::Left, &PtzActionOptions::phase(PtzPhase::Stop))
            .await
            .unwrap());
        assert!(camera
            .execute_ptz_action(&executor, PtzAction::Preset, &PtzActionOptions::preset("gate"))
            .await
            .unwrap());
        assert!(!camera
            .execute_ptz_action(&executor, PtzAction::Right, &PtzActionOptions::default())
            .await
            .unwrap());

        let actions = executor.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["perform_action"], "button.press");
        assert_eq!(actions[1]["perform_action"], "select.select_option");
        assert_eq!(actions[1]["data"]["option"], "gate");
    }

    #[tokio::test]
    async fn test_proxy_defaults() {
        let proxy = camera().proxy_config();
        assert!(proxy.media);
        assert!(!proxy.ssl_verification);
        assert!(!proxy.live);
    }

    #[test]
    fn test_parser_reads_day_and_duration() {
        let target = BrowseMediaTarget {
            camera_id: "office".to_string(),
            root: String::new(),
            media_type: MediaType::Clip,
            title_formats: None,
        };
        let day = node("2024/1/15", "media-source://reolink/DAY|01J2|0|main|2024|1|15");
        let file = node("14:03:27 0:00:44", "media-source://reolink/FILE|01J2|0|main|x");

        let (start, end) = ReolinkParser.parse_file(&target, &day, &file).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 15, 14, 3, 27).unwrap());
        assert_eq!(end, Some(Utc.with_ymd_and_hms(2024, 1, 15, 14, 4, 11).unwrap()));

        let range = TimeRange {
            start: Some(Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 1).unwrap()),
            end: None,
        };
        assert!(!ReolinkParser.should_expand(&target, &day, &range));
        assert!(ReolinkParser.should_expand(&target, &node("Main", "media-source://reolink/RES|01J2|0|main"), &range));
    }
}
