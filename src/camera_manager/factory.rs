use super::cache::{RecordingSegmentsCache, RequestCache};
use super::engine::CameraManagerEngine;
use super::types::{CameraEventCallback, Engine};
use crate::error::{CameraInitializationError, CameraInitializationReason, Result};
use crate::fetch::HttpFetcher;
use crate::hass::{EntityRegistry, HomeAssistant};
use crate::models::CameraConfig;
use crate::plugins::frigate::{FrigateCameraManagerEngine, FrigateEventWatcher};
use crate::plugins::generic::GenericCameraManagerEngine;
use crate::plugins::motioneye::MotionEyeCameraManagerEngine;
use crate::plugins::reolink::ReolinkCameraManagerEngine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Shared objects injected into every engine of one camera manager
#[derive(Clone)]
pub struct EngineCollaborators {
    pub entity_registry: Arc<dyn EntityRegistry>,
    pub fetcher: Arc<HttpFetcher>,
    pub request_cache: Arc<RequestCache>,
    pub segments_cache: Arc<RecordingSegmentsCache>,
    pub frigate_watcher: Arc<FrigateEventWatcher>,
    pub event_callback: Option<CameraEventCallback>,
}

impl EngineCollaborators {
    pub fn new(entity_registry: Arc<dyn EntityRegistry>) -> Self {
        EngineCollaborators {
            entity_registry,
            fetcher: Arc::new(HttpFetcher::new()),
            request_cache: Arc::new(RequestCache::new()),
            segments_cache: Arc::new(RecordingSegmentsCache::new()),
            frigate_watcher: Arc::new(FrigateEventWatcher::new()),
            event_callback: None,
        }
    }

    pub fn with_event_callback(mut self, callback: CameraEventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Drop every cached query result.
    pub fn clear_caches(&self) {
        self.request_cache.clear();
        self.segments_cache.clear();
    }
}

/// Builds an engine from the shared collaborators
pub type EngineConstructor = fn(&EngineCollaborators) -> Arc<dyn CameraManagerEngine>;

fn generic_engine(collaborators: &EngineCollaborators) -> Arc<dyn CameraManagerEngine> {
    Arc::new(GenericCameraManagerEngine::new(collaborators))
}

fn frigate_engine(collaborators: &EngineCollaborators) -> Arc<dyn CameraManagerEngine> {
    Arc::new(FrigateCameraManagerEngine::new(collaborators))
}

fn motioneye_engine(collaborators: &EngineCollaborators) -> Arc<dyn CameraManagerEngine> {
    Arc::new(MotionEyeCameraManagerEngine::new(collaborators))
}

fn reolink_engine(collaborators: &EngineCollaborators) -> Arc<dyn CameraManagerEngine> {
    Arc::new(ReolinkCameraManagerEngine::new(collaborators))
}

/// Chooses the engine for each camera and hands out one engine instance per
/// engine type, constructed on first use.
pub struct CameraManagerEngineFactory {
    collaborators: EngineCollaborators,
    constructors: HashMap<Engine, EngineConstructor>,
    engines: Mutex<HashMap<Engine, Arc<dyn CameraManagerEngine>>>,
}

impl CameraManagerEngineFactory {
    /// A factory with the built-in engines registered
    pub fn new(collaborators: EngineCollaborators) -> Self {
        let mut factory = CameraManagerEngineFactory {
            collaborators,
            constructors: HashMap::new(),
            engines: Mutex::new(HashMap::new()),
        };
        factory.register_engine(Engine::Generic, generic_engine);
        factory.register_engine(Engine::Frigate, frigate_engine);
        factory.register_engine(Engine::MotionEye, motioneye_engine);
        factory.register_engine(Engine::Reolink, reolink_engine);
        factory
    }

    /// Register (or replace) the constructor for an engine type
    pub fn register_engine(&mut self, engine: Engine, constructor: EngineConstructor) {
        debug!("[EngineFactory] Registering engine: {}", engine);
        self.constructors.insert(engine, constructor);
        if let Ok(mut engines) = self.engines.lock() {
            engines.remove(&engine);
        }
    }

    pub fn collaborators(&self) -> &EngineCollaborators {
        &self.collaborators
    }

    /// The engine instance for a type, built on first request.
    pub fn create_engine(&self, engine: Engine) -> Option<Arc<dyn CameraManagerEngine>> {
        let mut engines = self.engines.lock().ok()?;
        if let Some(existing) = engines.get(&engine) {
            return Some(existing.clone());
        }

        let constructor = self.constructors.get(&engine)?;
        debug!("[EngineFactory] Creating engine: {}", engine);
        let created = constructor(&self.collaborators);
        engines.insert(engine, created.clone());
        Some(created)
    }

    /// Engines built so far
    pub fn get_engines(&self) -> Vec<Arc<dyn CameraManagerEngine>> {
        self.engines
            .lock()
            .map(|engines| engines.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Decide which engine serves a camera.
    ///
    /// Order: explicit `engine`, then the registry platform of the camera
    /// entity, then a configured Frigate camera name, then a bare stream URL.
    /// An entity unknown to the registry but present in the state machine is
    /// treated as generic. An entity unknown to both is an error.
    pub async fn get_engine_for_camera(
        &self,
        hass: &dyn HomeAssistant,
        config: &CameraConfig,
    ) -> Result<Option<Engine>> {
        if let Some(engine) = config.engine.explicit() {
            return Ok(Some(engine));
        }

        if let Some(entity_id) = config.camera_entity() {
            let entity = match self
                .collaborators
                .entity_registry
                .get_entity(hass, entity_id)
                .await
            {
                Ok(entity) => entity,
                Err(e) => {
                    warn!("[EngineFactory] Registry lookup for {} failed: {}", entity_id, e);
                    return Err(CameraInitializationError::new(
                        CameraInitializationReason::Registry(e.to_string()),
                        config,
                    )
                    .into());
                }
            };

            return match entity {
                Some(entity) => Ok(Some(Engine::from_platform(&entity.platform))),
                None if hass.state(entity_id).is_some() => Ok(Some(Engine::Generic)),
                None => Err(CameraInitializationError::new(
                    CameraInitializationReason::NoCameraEntity,
                    config,
                )
                .into()),
            };
        }

        if config.frigate.camera_name.is_some() {
            return Ok(Some(Engine::Frigate));
        }

        let has_stream_url = config.webrtc_card.url.is_some()
            || config.go2rtc.as_ref().is_some_and(|g| g.url.is_some() || g.stream.is_some());
        Ok(has_stream_url.then_some(Engine::Generic))
    }
}
