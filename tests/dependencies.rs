use hass_camera_card::camera_manager::camera::Camera;
use hass_camera_card::camera_manager::store::{CameraManagerReadOnlyConfigStore, CameraManagerStore};
use hass_camera_card::capabilities::{CapabilityKey, CapabilitySearchOptions};
use hass_camera_card::models::CameraConfig;
use hass_camera_card::testing::StaticCamera;
use hass_camera_card::view::factory::camera_supports_view;
use hass_camera_card::view::ViewName;
use serde_json::json;
use std::sync::Arc;

fn camera(config: serde_json::Value, capabilities: &[CapabilityKey]) -> Arc<dyn Camera> {
    let config: CameraConfig = serde_json::from_value(config).unwrap();
    StaticCamera::from_config(config, capabilities).unwrap()
}

/// Two clip cameras plus an overview camera that depends on everything.
fn store_with_overview() -> CameraManagerStore {
    let mut store = CameraManagerStore::new();
    store
        .add_camera(camera(json!({"id": "office"}), &[CapabilityKey::Live, CapabilityKey::Clips]))
        .unwrap();
    store
        .add_camera(camera(json!({"id": "garden"}), &[CapabilityKey::Live, CapabilityKey::Clips]))
        .unwrap();
    store
        .add_camera(camera(
            json!({"id": "birdseye", "dependencies": {"all_cameras": true}}),
            &[CapabilityKey::Live],
        ))
        .unwrap();
    store
}

#[test]
fn overview_camera_does_not_merge_other_cameras_media() {
    let store = store_with_overview();
    let clips = CapabilitySearchOptions::from(CapabilityKey::Clips);

    assert_eq!(store.get_all_dependent_cameras("office", Some(&clips)), vec!["office"]);
    assert_eq!(store.get_all_dependent_cameras("garden", Some(&clips)), vec!["garden"]);
    assert_eq!(
        store.get_all_dependent_cameras("birdseye", Some(&clips)),
        vec!["office", "garden"]
    );
}

#[test]
fn overview_camera_shows_media_of_its_dependencies() {
    let store = store_with_overview();

    assert!(camera_supports_view(&store, "birdseye", ViewName::Clips));
    assert!(camera_supports_view(&store, "office", ViewName::Clips));
    assert!(!camera_supports_view(&store, "birdseye", ViewName::Recordings));
}

#[test]
fn chained_dependencies_are_followed_forward_only() {
    let mut store = CameraManagerStore::new();
    store
        .add_camera(camera(json!({"id": "main", "dependencies": {"cameras": ["sub"]}}), &[CapabilityKey::Live]))
        .unwrap();
    store
        .add_camera(camera(json!({"id": "sub", "dependencies": {"cameras": ["zone"]}}), &[]))
        .unwrap();
    store
        .add_camera(camera(json!({"id": "zone"}), &[CapabilityKey::Clips]))
        .unwrap();

    assert_eq!(store.get_all_dependent_cameras("main", None), vec!["main", "sub", "zone"]);
    assert_eq!(store.get_all_dependent_cameras("zone", None), vec!["zone"]);
    assert!(!camera_supports_view(&store, "zone", ViewName::Live));
    assert!(camera_supports_view(&store, "main", ViewName::Clips));
}
