use super::types::Engine;
use crate::capabilities::{
    Capabilities, CapabilitiesOptions, CapabilitiesRaw, PtzCapabilities, PtzMovementType,
};
use crate::error::{CameraInitializationError, CameraInitializationReason, Error, Result};
use crate::hass::{ActionExecutor, Entity, EntityRegistry, HomeAssistant, Unsubscribe};
use crate::models::{CameraConfig, CameraProxyConfig, PtzConfig, SslCiphers};
use crate::ptz::{PtzAction, PtzActionOptions};
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// State shared by every camera implementation
pub struct CameraBase {
    id: String,
    engine: Engine,
    config: RwLock<Arc<CameraConfig>>,
    capabilities: RwLock<Option<Arc<Capabilities>>>,
    destroyed: AtomicBool,
    destroy_callbacks: Mutex<Vec<Unsubscribe>>,
}

impl CameraBase {
    pub fn new(config: CameraConfig, engine: Engine) -> Result<Self> {
        let id = config.resolved_id().ok_or_else(|| {
            CameraInitializationError::new(CameraInitializationReason::NoCameraId, &config)
        })?;

        Ok(CameraBase {
            id,
            engine,
            config: RwLock::new(Arc::new(config)),
            capabilities: RwLock::new(None),
            destroyed: AtomicBool::new(false),
            destroy_callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn config(&self) -> Arc<CameraConfig> {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Replace the config with an updated copy (auto-detected fields).
    pub fn update_config(&self, update: impl FnOnce(&mut CameraConfig)) {
        if let Ok(mut config) = self.config.write() {
            let mut updated = config.as_ref().clone();
            update(&mut updated);
            *config = Arc::new(updated);
        }
    }

    pub fn capabilities(&self) -> Option<Arc<Capabilities>> {
        self.capabilities.read().ok().and_then(|c| c.clone())
    }

    /// Merge detected capabilities with configured PTZ actions, apply the
    /// `disable` lists and store the result.
    pub fn set_capabilities(&self, detected: CapabilitiesRaw) -> Arc<Capabilities> {
        let config = self.config();
        let ptz = PtzCapabilities::merge(
            detected.ptz.as_ref(),
            configured_ptz_capabilities(&config.ptz).as_ref(),
        );
        let raw = CapabilitiesRaw { ptz, ..detected };
        let options = CapabilitiesOptions {
            disable: config.capabilities_disable().to_vec(),
            disable_except: config.capabilities_disable_except().map(<[_]>::to_vec),
        };

        let capabilities = Arc::new(Capabilities::new(raw, &options));
        if let Ok(mut slot) = self.capabilities.write() {
            *slot = Some(capabilities.clone());
        }
        capabilities
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Register a release callback. If the camera has already been destroyed
    /// the callback runs immediately.
    pub fn on_destroy(&self, unsubscribe: Unsubscribe) {
        if self.is_destroyed() {
            unsubscribe.call();
            return;
        }
        match self.destroy_callbacks.lock() {
            Ok(mut callbacks) => {
                // destroy() may have run between the check and the lock
                if self.is_destroyed() {
                    drop(callbacks);
                    unsubscribe.call();
                } else {
                    callbacks.push(unsubscribe);
                }
            }
            Err(_) => unsubscribe.call(),
        }
    }

    pub fn destroy(&self) {
        let callbacks = match self.destroy_callbacks.lock() {
            Ok(mut callbacks) => {
                self.destroyed.store(true, Ordering::SeqCst);
                std::mem::take(&mut *callbacks)
            }
            Err(_) => {
                self.destroyed.store(true, Ordering::SeqCst);
                return;
            }
        };
        debug!(
            "[Camera] Destroying camera {} ({} subscription(s))",
            self.id,
            callbacks.len()
        );
        for callback in callbacks {
            callback.call();
        }
    }

    /// Run statically configured PTZ actions. Returns false if none are configured.
    pub async fn execute_configured_ptz_action(
        &self,
        executor: &dyn ActionExecutor,
        action: PtzAction,
        options: &PtzActionOptions,
    ) -> Result<bool> {
        let config = self.config();
        let actions = match action {
            PtzAction::Preset => options
                .preset
                .as_deref()
                .and_then(|preset| config.ptz.preset_actions(preset)),
            _ => config.ptz.actions_for(action, options.phase),
        };

        match actions {
            Some(actions) => {
                executor.execute_actions(actions.to_vec()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Proxy settings with `auto` resolved to the camera-neutral defaults.
    pub fn default_proxy_config(&self) -> CameraProxyConfig {
        let config = self.config();
        let proxy = &config.proxy;
        CameraProxyConfig {
            live: proxy.live.resolve(false),
            media: proxy.media.resolve(false),
            ssl_verification: proxy.ssl_verification.resolve(true),
            ssl_ciphers: proxy.ssl_ciphers.resolve(SslCiphers::Default),
            dynamic: proxy.dynamic,
        }
    }

    pub fn initialization_error(&self, reason: CameraInitializationReason) -> Error {
        CameraInitializationError::new(reason, &self.config()).into()
    }
}

/// One configured camera
#[async_trait]
pub trait Camera: Send + Sync {
    fn base(&self) -> &CameraBase;

    /// Access to the concrete camera type for its engine.
    fn as_any(&self) -> &dyn Any;

    fn id(&self) -> &str {
        self.base().id()
    }

    fn engine(&self) -> Engine {
        self.base().engine()
    }

    fn config(&self) -> Arc<CameraConfig> {
        self.base().config()
    }

    /// `None` until `initialize()` has completed.
    fn capabilities(&self) -> Option<Arc<Capabilities>> {
        self.base().capabilities()
    }

    /// Resolve external entities and compute capabilities.
    async fn initialize(&self, hass: &dyn HomeAssistant) -> Result<()>;

    /// Returns false if the action is not supported for this camera.
    async fn execute_ptz_action(
        &self,
        executor: &dyn ActionExecutor,
        action: PtzAction,
        options: &PtzActionOptions,
    ) -> Result<bool> {
        self.base()
            .execute_configured_ptz_action(executor, action, options)
            .await
    }

    fn proxy_config(&self) -> CameraProxyConfig {
        self.base().default_proxy_config()
    }

    fn destroy(&self) {
        self.base().destroy()
    }
}

/// PTZ capabilities implied by statically configured actions
pub fn configured_ptz_capabilities(ptz: &PtzConfig) -> Option<PtzCapabilities> {
    use crate::ptz::PtzPhase::{Start, Stop};

    let mut capabilities = PtzCapabilities::default();
    let mut any = false;

    for action in PtzAction::MOVEMENTS {
        let mut movement = Vec::new();
        if ptz.actions_for(action, Some(Start)).is_some() && ptz.actions_for(action, Some(Stop)).is_some() {
            movement.push(PtzMovementType::Continuous);
        }
        if ptz.actions_for(action, None).is_some() {
            movement.push(PtzMovementType::Relative);
        }
        if !movement.is_empty() {
            capabilities.set(action, movement);
            any = true;
        }
    }

    if !ptz.presets.is_empty() {
        capabilities.presets = Some(ptz.presets.keys().cloned().collect());
        any = true;
    }

    any.then_some(capabilities)
}

/// Look up the configured camera entity in the registry. Missing entity or
/// missing configuration are both fatal for entity-backed cameras.
pub async fn require_camera_entity(
    hass: &dyn HomeAssistant,
    registry: &dyn EntityRegistry,
    config: &CameraConfig,
) -> Result<Entity> {
    let Some(entity_id) = config.camera_entity() else {
        return Err(CameraInitializationError::new(CameraInitializationReason::NoCameraEntity, config).into());
    };

    match registry.get_entity(hass, entity_id).await {
        Ok(Some(entity)) => Ok(entity),
        Ok(None) => Err(CameraInitializationError::new(CameraInitializationReason::NoCameraEntity, config).into()),
        Err(e) => {
            warn!("[Camera] Registry lookup for {} failed: {}", entity_id, e);
            Err(CameraInitializationError::new(
                CameraInitializationReason::Registry(e.to_string()),
                config,
            )
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilityKey;
    use crate::models::ActionsConfig;
    use crate::testing::RecordingActionExecutor;
    use crate::ptz::PtzPhase;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn action(service: &str) -> Option<ActionsConfig> {
        Some(ActionsConfig::One(json!({"action": "perform-action", "perform_action": service})))
    }

    fn config() -> CameraConfig {
        let mut config = CameraConfig {
            camera_entity: Some("camera.office".to_string()),
            ..Default::default()
        };
        config.ptz.actions_left = action("script.left");
        config.ptz.actions_up_start = action("script.up_start");
        config.ptz.actions_up_stop = action("script.up_stop");
        config
    }

    #[test]
    fn test_configured_ptz_capabilities() {
        let ptz = configured_ptz_capabilities(&config().ptz).unwrap();
        assert_eq!(ptz.left, Some(vec![PtzMovementType::Relative]));
        assert_eq!(ptz.up, Some(vec![PtzMovementType::Continuous]));
        assert_eq!(ptz.down, None);
        assert!(configured_ptz_capabilities(&PtzConfig::default()).is_none());
    }

    #[test]
    fn test_configured_ptz_overrides_detected() {
        let base = CameraBase::new(config(), Engine::Generic).unwrap();
        let capabilities = base.set_capabilities(
            CapabilitiesRaw::new()
                .with(CapabilityKey::Live, true)
                .with_ptz(Some(PtzCapabilities::pan_tilt(&[PtzMovementType::Continuous]))),
        );

        let ptz = capabilities.get_ptz_capabilities().unwrap();
        assert_eq!(ptz.left, Some(vec![PtzMovementType::Relative]));
        assert_eq!(ptz.right, Some(vec![PtzMovementType::Continuous]));
    }

    #[test]
    fn test_missing_id_is_initialization_error() {
        let result = CameraBase::new(CameraConfig::default(), Engine::Generic);
        assert!(matches!(
            result,
            Err(Error::CameraInitialization(CameraInitializationError {
                reason: CameraInitializationReason::NoCameraId,
                ..
            }))
        ));
    }

    #[test]
    fn test_destroy_releases_subscriptions_once() {
        let base = CameraBase::new(config(), Engine::Generic).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        base.on_destroy(Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        base.destroy();
        base.destroy();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Subscriptions completing after destroy are released straight away
        let counter = calls.clone();
        base.on_destroy(Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_execute_configured_ptz_action() {
        let base = CameraBase::new(config(), Engine::Generic).unwrap();
        let executor = RecordingActionExecutor::new();

        assert!(base
            .execute_configured_ptz_action(&executor, PtzAction::Up, &PtzActionOptions::phase(PtzPhase::Stop))
            .await
            .unwrap());
        assert!(!base
            .execute_configured_ptz_action(&executor, PtzAction::Down, &PtzActionOptions::default())
            .await
            .unwrap());
        assert_eq!(executor.actions()[0]["perform_action"], "script.up_stop");
    }

    #[test]
    fn test_default_proxy_config() {
        let base = CameraBase::new(config(), Engine::Generic).unwrap();
        let proxy = base.default_proxy_config();
        assert!(!proxy.live);
        assert!(!proxy.media);
        assert!(proxy.ssl_verification);
    }
}
