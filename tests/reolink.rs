use hass_camera_card::camera_manager::factory::EngineCollaborators;
use hass_camera_card::camera_manager::store::CameraManagerReadOnlyConfigStore;
use hass_camera_card::camera_manager::types::Engine;
use hass_camera_card::camera_manager::CameraManager;
use hass_camera_card::capabilities::{PtzCapabilities, PtzMovementType};
use hass_camera_card::error::{CameraInitializationError, CameraInitializationReason, Error};
use hass_camera_card::hass::{Entity, EntityRegistryManager};
use hass_camera_card::models::CameraConfig;
use hass_camera_card::plugins::ReolinkCamera;
use hass_camera_card::ptz::{PtzAction, PtzActionOptions, PtzPhase};
use hass_camera_card::testing::{MockHomeAssistant, RecordingActionExecutor};
use std::sync::Arc;

const PREFIX: &str = "85270002TS7D4RUP_0_";

fn reolink_entity(entity_id: &str, unique_id: &str) -> Entity {
    Entity::new(entity_id, "reolink")
        .with_unique_id(unique_id)
        .with_config_entry_id("01HX7Q")
}

fn office_config() -> CameraConfig {
    CameraConfig {
        camera_entity: Some("camera.office_reolink".to_string()),
        ..Default::default()
    }
}

fn office_hass(camera_unique_id: &str) -> MockHomeAssistant {
    let mut hass = MockHomeAssistant::new().with_entity(reolink_entity("camera.office_reolink", camera_unique_id));
    for suffix in ["left", "right", "up", "down", "zoom_in", "zoom_out", "stop"] {
        hass = hass.with_entity(reolink_entity(
            &format!("button.office_reolink_ptz_{}", suffix),
            &format!("{}ptz_{}", PREFIX, suffix),
        ));
    }
    hass
}

fn camera_manager(hass: &MockHomeAssistant, executor: Arc<RecordingActionExecutor>) -> CameraManager {
    CameraManager::new(
        Arc::new(hass.clone()),
        executor,
        EngineCollaborators::new(Arc::new(EntityRegistryManager::new())),
    )
}

#[tokio::test]
async fn office_camera_drives_ptz_buttons() {
    let hass = office_hass("85270002TS7D4RUP_0_main");
    let executor = Arc::new(RecordingActionExecutor::new());
    let manager = camera_manager(&hass, executor.clone());

    let report = manager.initialize_cameras(&[office_config()]).await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let store = manager.store();
    let camera = store.get_camera("camera.office_reolink").unwrap();
    assert_eq!(camera.engine(), Engine::Reolink);

    let continuous = Some(vec![PtzMovementType::Continuous]);
    assert_eq!(
        camera.capabilities().unwrap().get_ptz_capabilities().cloned(),
        Some(PtzCapabilities {
            left: continuous.clone(),
            right: continuous.clone(),
            up: continuous.clone(),
            down: continuous.clone(),
            zoom_in: continuous.clone(),
            zoom_out: continuous,
            presets: None,
        })
    );

    let reolink = camera.as_any().downcast_ref::<ReolinkCamera>().unwrap();
    assert_eq!(reolink.channel(), Some(0));

    assert!(manager
        .execute_ptz_action(
            "camera.office_reolink",
            PtzAction::Left,
            PtzActionOptions::phase(PtzPhase::Start)
        )
        .await
        .unwrap());
    assert!(manager
        .execute_ptz_action(
            "camera.office_reolink",
            PtzAction::Left,
            PtzActionOptions::phase(PtzPhase::Stop)
        )
        .await
        .unwrap());

    assert_eq!(
        executor.targets(),
        vec!["button.office_reolink_ptz_left", "button.office_reolink_ptz_stop"]
    );
    assert!(executor
        .actions()
        .iter()
        .all(|action| action["perform_action"] == "button.press"));
}

#[tokio::test]
async fn channel_comes_from_the_unique_id() {
    let hass = office_hass("85270002TS7D4RUP_7");
    let manager = camera_manager(&hass, Arc::new(RecordingActionExecutor::new()));
    manager.initialize_cameras(&[office_config()]).await;

    let camera = manager.store().get_camera("camera.office_reolink").unwrap();
    let reolink = camera.as_any().downcast_ref::<ReolinkCamera>().unwrap();
    assert_eq!(reolink.channel(), Some(7));
}

#[tokio::test]
async fn unique_id_without_channel_fails_initialization() {
    for hass in [
        office_hass("85270002TS7D4RUP"),
        MockHomeAssistant::new().with_entity(Entity::new("camera.office_reolink", "reolink")),
    ] {
        let manager = camera_manager(&hass, Arc::new(RecordingActionExecutor::new()));
        let report = manager.initialize_cameras(&[office_config()]).await;

        assert!(report.camera_ids.is_empty());
        assert!(matches!(
            report.errors.as_slice(),
            [Error::CameraInitialization(CameraInitializationError {
                reason: CameraInitializationReason::ReolinkUniqueId,
                ..
            })]
        ));
    }
}
