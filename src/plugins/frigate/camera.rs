use super::event_watcher::{FrigateEventWatcher, FrigateEventWatcherRequest};
use super::types::FrigatePtzInfo;
use crate::camera_manager::camera::{require_camera_entity, Camera, CameraBase};
use crate::camera_manager::types::{CameraEventCallback, Engine};
use crate::capabilities::{CapabilitiesRaw, CapabilityKey, PtzCapabilities, PtzMovementType};
use crate::error::{HassError, Result};
use crate::fetch::HttpFetcher;
use crate::hass::{perform_action, ActionExecutor, Entity, EntityRegistry, HomeAssistant};
use crate::models::CameraConfig;
use crate::plugins::go2rtc::detect_two_way_audio;
use crate::ptz::{PtzAction, PtzActionOptions, PtzPhase};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ALL_LABELS: &str = "all";

/// Frigate base path for a Frigate instance, proxied through Home Assistant
pub fn frigate_api_base(client_id: &str) -> String {
    format!("/api/frigate/{}", client_id)
}

static CAMERA_UNIQUE_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r":camera:(?<camera>[^:]+)$").ok());

/// Camera name encoded at the end of a Frigate camera entity's unique ID
pub fn camera_name_from_unique_id(unique_id: &str) -> Option<String> {
    CAMERA_UNIQUE_ID
        .as_ref()?
        .captures(unique_id)
        .map(|captures| captures["camera"].to_string())
}

/// A camera served by the Frigate integration
pub struct FrigateCamera {
    base: CameraBase,
    registry: Arc<dyn EntityRegistry>,
    fetcher: Arc<HttpFetcher>,
    watcher: Arc<FrigateEventWatcher>,
    event_callback: Option<CameraEventCallback>,
}

impl FrigateCamera {
    pub fn new(
        config: CameraConfig,
        registry: Arc<dyn EntityRegistry>,
        fetcher: Arc<HttpFetcher>,
        watcher: Arc<FrigateEventWatcher>,
        event_callback: Option<CameraEventCallback>,
    ) -> Result<Self> {
        Ok(FrigateCamera {
            base: CameraBase::new(config, Engine::Frigate)?,
            registry,
            fetcher,
            watcher,
            event_callback,
        })
    }

    pub fn camera_name(&self) -> Option<String> {
        self.config().frigate.camera_name.clone()
    }

    fn detect_camera_name(&self, entity: &Entity) {
        if self.config().frigate.camera_name.is_some() {
            return;
        }
        if let Some(name) = entity.unique_id.as_deref().and_then(camera_name_from_unique_id) {
            debug!("[FrigateCamera] Detected camera name '{}' for {}", name, self.id());
            self.base
                .update_config(|config| config.frigate.camera_name = Some(name));
        }
    }

    /// Find the Frigate motion and occupancy sensors for this camera and add
    /// them to the trigger entities.
    async fn detect_trigger_entities(&self, hass: &dyn HomeAssistant) {
        let config = self.config();
        let triggers = &config.triggers;
        if !triggers.motion && !triggers.occupancy {
            return;
        }
        let Some(camera_name) = config.frigate.camera_name.clone() else {
            return;
        };

        let zones = if config.frigate.zones.is_empty() {
            vec![camera_name.clone()]
        } else {
            config.frigate.zones.clone()
        };
        let labels = if config.frigate.labels.is_empty() {
            vec![ALL_LABELS.to_string()]
        } else {
            config.frigate.labels.clone()
        };

        let mut suffixes = Vec::new();
        if triggers.motion {
            suffixes.push(format!(":motion_sensor:{}", camera_name));
        }
        if triggers.occupancy {
            for zone in &zones {
                for label in &labels {
                    suffixes.push(format!(":occupancy_sensor:{}_{}", zone, label));
                }
            }
        }

        let predicate = |entity: &Entity| {
            entity.platform == "frigate"
                && !entity.is_disabled()
                && entity
                    .unique_id
                    .as_deref()
                    .is_some_and(|id| suffixes.iter().any(|suffix| id.ends_with(suffix.as_str())))
        };

        match self.registry.get_matching_entities(hass, &predicate).await {
            Ok(entities) if !entities.is_empty() => {
                let found: Vec<String> = entities.into_iter().map(|e| e.entity_id).collect();
                debug!("[FrigateCamera] Trigger entities for {}: {:?}", self.id(), found);
                self.base.update_config(|config| {
                    for entity_id in found {
                        if !config.triggers.entities.contains(&entity_id) {
                            config.triggers.entities.push(entity_id);
                        }
                    }
                });
            }
            Ok(_) => {}
            Err(e) => warn!("[FrigateCamera] Trigger entity lookup for {} failed: {}", self.id(), e),
        }
    }

    async fn fetch_ptz_info(&self, hass: &dyn HomeAssistant) -> Option<FrigatePtzInfo> {
        let config = self.config();
        let camera_name = config.frigate.camera_name.as_deref()?;

        let response = hass
            .send_message(json!({
                "type": "frigate/ptz/info",
                "instance_id": config.frigate.client_id,
                "camera": camera_name,
            }))
            .await;

        match response.map(super::types::decode_json_payload) {
            Ok(Ok(value)) => match serde_json::from_value(value) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!("[FrigateCamera] Ignoring malformed PTZ info for {}: {}", self.id(), e);
                    None
                }
            },
            Ok(Err(e)) => {
                warn!("[FrigateCamera] Ignoring malformed PTZ info for {}: {}", self.id(), e);
                None
            }
            Err(HassError::Request { code, .. }) if code == "not_found" => None,
            Err(e) => {
                debug!("[FrigateCamera] No PTZ info for {}: {}", self.id(), e);
                None
            }
        }
    }

    async fn detect_two_way_audio(&self, hass: &dyn HomeAssistant) -> bool {
        let config = self.config();
        let base = config
            .go2rtc
            .as_ref()
            .and_then(|g| g.url.clone())
            .unwrap_or_else(|| format!("{}/go2rtc", frigate_api_base(&config.frigate.client_id)));
        let stream = config
            .go2rtc
            .as_ref()
            .and_then(|g| g.stream.clone())
            .or_else(|| config.frigate.camera_name.clone());

        match stream {
            Some(stream) => detect_two_way_audio(hass, &self.fetcher, &base, &stream).await,
            None => false,
        }
    }

    async fn subscribe_to_events(&self, hass: &dyn HomeAssistant) {
        let Some(callback) = self.event_callback.clone() else {
            return;
        };
        let config = self.config();
        let Some(camera_name) = config.frigate.camera_name.clone() else {
            return;
        };

        let request = FrigateEventWatcherRequest {
            camera_id: self.id().to_string(),
            camera_name,
            zones: config.frigate.zones.clone(),
            labels: config.frigate.labels.clone(),
            events: config.triggers.events.clone(),
            callback,
        };

        match self
            .watcher
            .subscribe(hass, &config.frigate.client_id, request)
            .await
        {
            Ok(unsubscribe) => self.base.on_destroy(unsubscribe),
            Err(e) => warn!("[FrigateCamera] Event subscription for {} failed: {}", self.id(), e),
        }
    }
}

/// PTZ capabilities from the Frigate feature list
pub fn ptz_capabilities_from_info(info: &FrigatePtzInfo) -> Option<PtzCapabilities> {
    let has = |feature: &str| info.features.iter().any(|f| f == feature);

    let mut pan_tilt = Vec::new();
    if has("pt") {
        pan_tilt.push(PtzMovementType::Continuous);
    }
    if has("pt-r") {
        pan_tilt.push(PtzMovementType::Relative);
    }

    let mut zoom = Vec::new();
    if has("zoom") {
        zoom.push(PtzMovementType::Continuous);
    }
    if has("zoom-r") {
        zoom.push(PtzMovementType::Relative);
    }

    let mut capabilities = PtzCapabilities::default();
    if !pan_tilt.is_empty() {
        for action in [PtzAction::Left, PtzAction::Right, PtzAction::Up, PtzAction::Down] {
            capabilities.set(action, pan_tilt.clone());
        }
    }
    if !zoom.is_empty() {
        capabilities.set(PtzAction::ZoomIn, zoom.clone());
        capabilities.set(PtzAction::ZoomOut, zoom);
    }
    if !info.presets.is_empty() {
        capabilities.presets = Some(info.presets.clone());
    }

    capabilities.has_capability().then_some(capabilities)
}

/// `frigate.ptz` service arguments for an action
fn ptz_service_data(action: PtzAction, options: &PtzActionOptions) -> Option<serde_json::Value> {
    if action == PtzAction::Preset {
        let preset = options.preset.as_deref()?;
        return Some(json!({ "action": "preset", "argument": preset }));
    }

    match options.phase? {
        PtzPhase::Stop => Some(json!({ "action": "stop" })),
        PtzPhase::Start => {
            let (command, argument) = match action {
                PtzAction::Left => ("move", "left"),
                PtzAction::Right => ("move", "right"),
                PtzAction::Up => ("move", "up"),
                PtzAction::Down => ("move", "down"),
                PtzAction::ZoomIn => ("zoom", "in"),
                PtzAction::ZoomOut => ("zoom", "out"),
                PtzAction::Preset => return None,
            };
            Some(json!({ "action": command, "argument": argument }))
        }
    }
}

#[async_trait]
impl Camera for FrigateCamera {
    fn base(&self) -> &CameraBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn initialize(&self, hass: &dyn HomeAssistant) -> Result<()> {
        let has_entity = self.config().camera_entity().is_some();
        if has_entity {
            let entity = require_camera_entity(hass, self.registry.as_ref(), &self.config()).await?;
            self.detect_camera_name(&entity);
        }

        self.detect_trigger_entities(hass).await;

        let ptz = self
            .fetch_ptz_info(hass)
            .await
            .as_ref()
            .and_then(ptz_capabilities_from_info);
        let two_way_audio = self.detect_two_way_audio(hass).await;

        let capabilities = self.base.set_capabilities(
            CapabilitiesRaw::new()
                .with_all(&[
                    CapabilityKey::Live,
                    CapabilityKey::Menu,
                    CapabilityKey::Substream,
                    CapabilityKey::Trigger,
                    CapabilityKey::Clips,
                    CapabilityKey::Snapshots,
                    CapabilityKey::Recordings,
                    CapabilityKey::Reviews,
                    CapabilityKey::Seek,
                    CapabilityKey::FavoriteEvents,
                ])
                .with(CapabilityKey::FavoriteRecordings, false)
                .with(CapabilityKey::RemoteControlEntity, has_entity)
                .with(CapabilityKey::TwoWayAudio, two_way_audio)
                .with_ptz(ptz),
        );

        self.subscribe_to_events(hass).await;

        info!(
            "[FrigateCamera] Initialized camera {} (frigate camera: {:?}, ptz: {})",
            self.id(),
            self.camera_name(),
            capabilities.has_ptz_capability()
        );
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

        let config = self.config();
        let Some(entity_id) = config.camera_entity() else {
            return Ok(false);
        };
        let Some(data) = ptz_service_data(action, options) else {
            return Ok(false);
        };

        executor
            .execute_actions(vec![perform_action("frigate.ptz", entity_id, Some(data))])
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hass::EntityRegistryManager;
    use crate::testing::{MockHomeAssistant, RecordingActionExecutor};
    use serde_json::Value;

    fn camera(config: CameraConfig, watcher: Arc<FrigateEventWatcher>) -> FrigateCamera {
        let callback: CameraEventCallback = Arc::new(|_| {});
        FrigateCamera::new(
            config,
            Arc::new(EntityRegistryManager::new()),
            Arc::new(HttpFetcher::new()),
            watcher,
            Some(callback),
        )
        .unwrap()
    }

    fn entity_config() -> CameraConfig {
        let mut config = CameraConfig {
            camera_entity: Some("camera.front_door".to_string()),
            ..Default::default()
        };
        config.triggers.motion = true;
        config.triggers.occupancy = true;
        config
    }

    fn hass() -> MockHomeAssistant {
        let hass = MockHomeAssistant::new()
            .with_entity(
                Entity::new("camera.front_door", "frigate").with_unique_id("8c4e:camera:front_door"),
            )
            .with_entity(
                Entity::new("binary_sensor.front_door_motion", "frigate")
                    .with_unique_id("8c4e:motion_sensor:front_door"),
            )
            .with_entity(
                Entity::new("binary_sensor.front_door_all_occupancy", "frigate")
                    .with_unique_id("8c4e:occupancy_sensor:front_door_all"),
            )
            .with_entity(
                Entity::new("binary_sensor.back_motion", "frigate")
                    .with_unique_id("8c4e:motion_sensor:back"),
            )
            .with_response(
                "frigate/ptz/info",
                json!({"name": "front_door", "features": ["pt", "zoom"], "presets": ["gate"]}),
            );
        hass.respond_with("auth/sign_path", |_| {
            Err(HassError::Connection("offline".to_string()))
        });
        hass
    }

    #[test]
    fn test_camera_name_from_unique_id() {
        assert_eq!(camera_name_from_unique_id("8c4e:camera:front_door").as_deref(), Some("front_door"));
        assert_eq!(camera_name_from_unique_id("8c4e:motion_sensor:front_door"), None);
        assert!(CAMERA_UNIQUE_ID.is_some());
    }

    #[test]
    fn test_ptz_capabilities_from_features() {
        let info = FrigatePtzInfo {
            name: None,
            features: vec!["pt-r".to_string(), "zoom".to_string()],
            presets: vec![],
        };
        let ptz = ptz_capabilities_from_info(&info).unwrap();
        assert_eq!(ptz.left, Some(vec![PtzMovementType::Relative]));
        assert_eq!(ptz.zoom_in, Some(vec![PtzMovementType::Continuous]));
        assert!(ptz_capabilities_from_info(&FrigatePtzInfo::default()).is_none());
    }

    #[tokio::test]
    async fn test_initialize_detects_name_triggers_and_ptz() {
        let hass = hass();
        let watcher = Arc::new(FrigateEventWatcher::new());
        let camera = camera(entity_config(), watcher.clone());
        camera.initialize(&hass).await.unwrap();

        let config = camera.config();
        assert_eq!(config.frigate.camera_name.as_deref(), Some("front_door"));
        assert_eq!(
            config.triggers.entities,
            vec!["binary_sensor.front_door_all_occupancy", "binary_sensor.front_door_motion"]
        );

        let capabilities = camera.capabilities().unwrap();
        assert!(capabilities.has(CapabilityKey::Reviews));
        assert!(!capabilities.has(CapabilityKey::FavoriteRecordings));
        assert!(!capabilities.has(CapabilityKey::TwoWayAudio));
        assert_eq!(
            capabilities.get_ptz_capabilities().and_then(|p| p.presets.clone()),
            Some(vec!["gate".to_string()])
        );

        assert_eq!(watcher.subscriber_count("frigate"), 1);
        camera.destroy();
        assert_eq!(watcher.subscriber_count("frigate"), 0);
        assert_eq!(hass.unsubscribe_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_entity_is_fatal() {
        let hass = MockHomeAssistant::new();
        let config = CameraConfig {
            camera_entity: Some("camera.typo".to_string()),
            ..Default::default()
        };
        let camera = camera(config, Arc::new(FrigateEventWatcher::new()));
        assert!(camera.initialize(&hass).await.is_err());
    }

    #[tokio::test]
    async fn test_ptz_uses_frigate_service() {
        let hass = hass();
        let camera = camera(entity_config(), Arc::new(FrigateEventWatcher::new()));
        camera.initialize(&hass).await.unwrap();
        let executor = RecordingActionExecutor::new();

        assert!(camera
            .execute_ptz_action(&executor, PtzAction::ZoomIn, &PtzActionOptions::phase(PtzPhase::Start))
            .await
            .unwrap());
        assert!(camera
            .execute_ptz_action(&executor, PtzAction::Preset, &PtzActionOptions::preset("gate"))
            .await
            .unwrap());
        assert!(!camera
            .execute_ptz_action(&executor, PtzAction::Left, &PtzActionOptions::default())
            .await
            .unwrap());

        let actions = executor.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["perform_action"], "frigate.ptz");
        assert_eq!(actions[0]["data"], json!({"action": "zoom", "argument": "in"}));
        assert_eq!(actions[1]["data"]["argument"], Value::from("gate"));
        assert_eq!(executor.targets(), vec!["camera.front_door", "camera.front_door"]);
    }
}
