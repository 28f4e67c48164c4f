use super::go2rtc::detect_two_way_audio;
use crate::camera_manager::camera::{Camera, CameraBase};
use crate::camera_manager::engine::CameraManagerEngine;
use crate::camera_manager::factory::EngineCollaborators;
use crate::camera_manager::types::Engine;
use crate::capabilities::{CapabilitiesRaw, CapabilityKey};
use crate::error::Result;
use crate::fetch::HttpFetcher;
use crate::hass::HomeAssistant;
use crate::models::CameraConfig;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// A camera with a live stream and nothing else
pub struct GenericCamera {
    base: CameraBase,
    fetcher: Arc<HttpFetcher>,
}

impl GenericCamera {
    pub fn new(config: CameraConfig, fetcher: Arc<HttpFetcher>) -> Result<Self> {
        Ok(GenericCamera {
            base: CameraBase::new(config, Engine::Generic)?,
            fetcher,
        })
    }
}

#[async_trait]
impl Camera for GenericCamera {
    fn base(&self) -> &CameraBase {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn initialize(&self, hass: &dyn HomeAssistant) -> Result<()> {
        let config = self.config();

        let two_way_audio = match config.go2rtc.as_ref().and_then(|g| g.url.as_deref().zip(g.stream.as_deref())) {
            Some((url, stream)) => detect_two_way_audio(hass, &self.fetcher, url, stream).await,
            None => false,
        };

        let capabilities = self.base.set_capabilities(
            CapabilitiesRaw::new()
                .with_all(&[
                    CapabilityKey::Live,
                    CapabilityKey::Menu,
                    CapabilityKey::Substream,
                    CapabilityKey::Trigger,
                ])
                .with(CapabilityKey::RemoteControlEntity, config.camera_entity.is_some())
                .with(CapabilityKey::TwoWayAudio, two_way_audio),
        );

        debug!(
            "[GenericCamera] Initialized camera {} (ptz: {})",
            self.id(),
            capabilities.has_ptz_capability()
        );
        Ok(())
    }
}

/// The engine every other engine must be a superset of: no data sources.
pub struct GenericCameraManagerEngine {
    fetcher: Arc<HttpFetcher>,
}

impl GenericCameraManagerEngine {
    pub fn new(collaborators: &EngineCollaborators) -> Self {
        GenericCameraManagerEngine {
            fetcher: collaborators.fetcher.clone(),
        }
    }
}

#[async_trait]
impl CameraManagerEngine for GenericCameraManagerEngine {
    fn engine_type(&self) -> Engine {
        Engine::Generic
    }

    async fn create_camera(&self, hass: &dyn HomeAssistant, config: CameraConfig) -> Result<Arc<dyn Camera>> {
        let camera = GenericCamera::new(config, self.fetcher.clone())?;
        camera.initialize(hass).await?;
        Ok(Arc::new(camera))
    }
}
