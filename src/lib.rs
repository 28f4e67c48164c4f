//! Core of a Home Assistant camera card
//!
//! Turns camera configuration into initialized cameras served by vendor
//! engines (generic, Frigate, MotionEye, Reolink), runs media queries against
//! those engines, drives PTZ, and owns the view state a UI renders from.
//!
//! The host supplies a [`hass::HomeAssistant`] connection and an
//! [`hass::ActionExecutor`]; everything else lives here.

pub mod camera_manager;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod fetch;
pub mod folders;
pub mod hass;
pub mod message;
pub mod models;
pub mod plugins;
pub mod ptz;
pub mod testing;
pub mod view;

pub use camera_manager::factory::EngineCollaborators;
pub use camera_manager::{CameraInitializationReport, CameraManager};
pub use config::CardConfig;
pub use error::{Error, Result};
pub use message::{Message, MessageManager};
pub use models::CameraConfig;
pub use view::{View, ViewManager, ViewName};

use folders::{FoldersManager, MediaSourceFoldersManager};
use hass::{ActionExecutor, EntityRegistryManager, HomeAssistant};
use std::sync::Arc;
use tracing::info;

/// Everything one card instance needs, wired together
pub struct CameraCard {
    pub config: Arc<CardConfig>,
    pub camera_manager: Arc<CameraManager>,
    pub view_manager: ViewManager,
    pub messages: Arc<MessageManager>,
}

impl CameraCard {
    pub fn new(config: CardConfig, hass: Arc<dyn HomeAssistant>, executor: Arc<dyn ActionExecutor>) -> Self {
        let config = Arc::new(config);
        let messages = Arc::new(MessageManager::new());
        let camera_manager = Arc::new(CameraManager::new(
            hass,
            executor,
            EngineCollaborators::new(Arc::new(EntityRegistryManager::new())),
        ));
        let folders: Option<Arc<dyn FoldersManager>> = (!config.folders.is_empty())
            .then(|| Arc::new(MediaSourceFoldersManager::new(&config.folders)) as Arc<dyn FoldersManager>);

        CameraCard {
            view_manager: ViewManager::new(config.clone(), camera_manager.clone(), folders, messages.clone()),
            config,
            camera_manager,
            messages,
        }
    }

    /// Initialize every camera, report the failures, then show the default view.
    pub async fn initialize(&self) -> CameraInitializationReport {
        let report = self.camera_manager.initialize_cameras(&self.config.cameras).await;
        for error in &report.errors {
            self.messages.set_error_if_higher_priority(error);
        }
        info!(
            "[CameraCard] {} camera(s) ready: {:?}",
            report.camera_ids.len(),
            report.camera_ids
        );

        self.view_manager.initialize().await;
        report
    }

    pub fn destroy(&self) {
        self.view_manager.reset();
        self.camera_manager.destroy();
    }
}
