use async_trait::async_trait;
use hass_camera_card::camera_manager::factory::EngineCollaborators;
use hass_camera_card::camera_manager::CameraManager;
use hass_camera_card::error::{Error, HassError};
use hass_camera_card::hass::{Entity, EntityRegistryManager, HassEntityState, HomeAssistant, MessageCallback, Unsubscribe};
use hass_camera_card::testing::{MockHomeAssistant, RecordingActionExecutor};
use hass_camera_card::view::{ViewContext, ViewFactoryOptions, ViewManager, ViewName, ViewParameters};
use hass_camera_card::{CardConfig, MessageManager};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Notify;

/// Holds every media browse request until the test opens the gate.
struct GatedHomeAssistant {
    inner: MockHomeAssistant,
    gate: Arc<Notify>,
}

#[async_trait]
impl HomeAssistant for GatedHomeAssistant {
    fn state(&self, entity_id: &str) -> Option<HassEntityState> {
        self.inner.state(entity_id)
    }

    async fn send_message(&self, message: Value) -> Result<Value, HassError> {
        if message["type"] == "media_source/browse_media" {
            self.gate.notified().await;
        }
        self.inner.send_message(message).await
    }

    async fn subscribe_message(&self, message: Value, callback: MessageCallback) -> Result<Unsubscribe, HassError> {
        self.inner.subscribe_message(message, callback).await
    }

    fn hass_url(&self, path: &str) -> String {
        self.inner.hass_url(path)
    }
}

struct Fixture {
    hass: MockHomeAssistant,
    gate: Arc<Notify>,
    manager: ViewManager,
    messages: Arc<MessageManager>,
}

async fn motioneye_fixture() -> Fixture {
    let hass = MockHomeAssistant::new()
        .with_entity(
            Entity::new("camera.garden", "motioneye")
                .with_config_entry_id("74565ad4")
                .with_device_id("5a4d0a2e"),
        )
        .with_response(
            "media_source/browse_media",
            json!({
                "title": "Movies",
                "media_content_id": "media-source://motioneye/74565ad4#5a4d0a2e#movies",
                "can_expand": true,
                "children": [
                    {"title": "14-30-00.mp4", "media_content_id": "clip-14", "can_play": true},
                ],
            }),
        );
    let gate = Arc::new(Notify::new());
    let gated = GatedHomeAssistant {
        inner: hass.clone(),
        gate: gate.clone(),
    };

    let config = Arc::new(
        CardConfig::from_value(json!({
            "cameras": [{"camera_entity": "camera.garden"}],
        }))
        .unwrap(),
    );
    let camera_manager = Arc::new(CameraManager::new(
        Arc::new(gated),
        Arc::new(RecordingActionExecutor::new()),
        EngineCollaborators::new(Arc::new(EntityRegistryManager::new())),
    ));
    let report = camera_manager.initialize_cameras(&config.cameras).await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let messages = Arc::new(MessageManager::new());
    Fixture {
        hass,
        gate,
        manager: ViewManager::new(config, camera_manager, None, messages.clone()),
        messages,
    }
}

fn browse_count(hass: &MockHomeAssistant) -> usize {
    hass.sent_messages_of_type("media_source/browse_media").len()
}

#[tokio::test]
async fn query_results_are_attached_when_nothing_intervenes() {
    let fixture = motioneye_fixture().await;
    fixture.gate.notify_one();

    fixture
        .manager
        .set_view_by_parameters_with_new_query(ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips)))
        .await;

    let view = fixture.manager.get_view().unwrap();
    assert_eq!(view.view, ViewName::Clips);
    assert_eq!(view.camera.as_deref(), Some("camera.garden"));
    assert!(view.query.is_some());
    assert!(view.query_results.is_some());
    assert_eq!(view.context.loading_query(), None);
    assert_eq!(browse_count(&fixture.hass), 1);
    assert!(!fixture.messages.has_message());
}

#[tokio::test]
async fn late_query_results_never_overwrite_a_newer_view() {
    let fixture = motioneye_fixture().await;
    let manager = &fixture.manager;

    let ((), expected) = tokio::join!(
        manager.set_view_by_parameters_with_new_query(ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips))),
        async {
            tokio::task::yield_now().await;
            let interrupting = manager.set_view_default(ViewFactoryOptions::default());
            fixture.gate.notify_one();
            interrupting
        }
    );

    let expected = expected.unwrap();
    assert_eq!(expected.view, ViewName::Live);
    assert_eq!(manager.get_view(), Some(expected));
    assert!(manager.get_view().unwrap().query_results.is_none());
    // The slow query did run; its results were discarded.
    assert_eq!(browse_count(&fixture.hass), 1);
}

#[tokio::test]
async fn viewer_adopts_gallery_results() {
    let fixture = motioneye_fixture().await;
    fixture.gate.notify_one();
    let manager = &fixture.manager;

    manager
        .set_view_by_parameters_with_new_query(ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips)))
        .await;
    let gallery = manager.get_view().unwrap();

    manager
        .set_view_by_parameters_with_new_query(ViewFactoryOptions::new(
            ViewParameters::view(ViewName::Clip)
                .with_context(ViewContext::new().with_gallery_origin_view(ViewName::Clip)),
        ))
        .await;

    let viewer = manager.get_view().unwrap();
    assert_eq!(viewer.view, ViewName::Clip);
    assert!(Arc::ptr_eq(
        viewer.query_results.as_ref().unwrap(),
        gallery.query_results.as_ref().unwrap()
    ));
    assert_eq!(browse_count(&fixture.hass), 1);
}

async fn view_manager(hass: MockHomeAssistant, cameras: Value) -> (ViewManager, Arc<MessageManager>) {
    let config = Arc::new(CardConfig::from_value(json!({ "cameras": cameras })).unwrap());
    let camera_manager = Arc::new(CameraManager::new(
        Arc::new(hass),
        Arc::new(RecordingActionExecutor::new()),
        EngineCollaborators::new(Arc::new(EntityRegistryManager::new())),
    ));
    let report = camera_manager.initialize_cameras(&config.cameras).await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let messages = Arc::new(MessageManager::new());
    (
        ViewManager::new(config, camera_manager, None, messages.clone()),
        messages,
    )
}

#[tokio::test]
async fn query_failure_keeps_the_view_and_reports() {
    // Nothing answers the Frigate event request, so the query fails.
    let (manager, messages) = view_manager(
        MockHomeAssistant::new(),
        json!([{"frigate": {"camera_name": "front_door"}}]),
    )
    .await;

    manager
        .set_view_by_parameters_with_new_query(ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips)))
        .await;

    let view = manager.get_view().unwrap();
    assert_eq!(view.view, ViewName::Clips);
    assert_eq!(view.camera.as_deref(), Some("frigate/front_door"));
    assert!(view.query_results.is_none());
    assert!(messages.has_message());
}

#[tokio::test]
async fn unsupported_view_fails_hard_unless_fail_safe() {
    let (manager, messages) = view_manager(
        MockHomeAssistant::new().with_state(HassEntityState::new("camera.office", "idle")),
        json!([{"camera_entity": "camera.office"}]),
    )
    .await;

    assert!(manager
        .set_view_by_parameters(ViewFactoryOptions::new(ViewParameters::view(ViewName::Clip)))
        .is_none());
    assert!(!manager.has_view());
    let message = messages.get_message().unwrap();
    assert_eq!(message.context.unwrap()["default_view"], "live");

    let view = manager
        .set_view_by_parameters(ViewFactoryOptions::new(ViewParameters::view(ViewName::Clip)).fail_safe())
        .unwrap();
    assert_eq!(view.view, ViewName::Live);
    assert_eq!(view.camera.as_deref(), Some("camera.office"));
}

#[tokio::test]
async fn factory_reports_incompatibility_with_context() {
    let (manager, _) = view_manager(
        MockHomeAssistant::new().with_state(HassEntityState::new("camera.office", "idle")),
        json!([{"camera_entity": "camera.office"}]),
    )
    .await;
    manager.set_view_default(ViewFactoryOptions::default());

    let base = manager.get_view();
    let store = {
        let hass = MockHomeAssistant::new().with_state(HassEntityState::new("camera.office", "idle"));
        let camera_manager = CameraManager::new(
            Arc::new(hass),
            Arc::new(RecordingActionExecutor::new()),
            EngineCollaborators::new(Arc::new(EntityRegistryManager::new())),
        );
        camera_manager
            .initialize_cameras(&[serde_json::from_value(json!({"camera_entity": "camera.office"})).unwrap()])
            .await;
        camera_manager.store()
    };

    let result = manager.factory().get_view_by_parameters(
        store.as_ref(),
        ViewFactoryOptions::new(ViewParameters::view(ViewName::Recordings)).with_base_view(base),
    );
    let Err(Error::ViewIncompatible(error)) = result else {
        panic!("expected an incompatible view");
    };
    assert_eq!(error.view, ViewName::Recordings);
    assert_eq!(error.camera.as_deref(), Some("camera.office"));
    assert_eq!(error.default_view, Some(ViewName::Live));
}
