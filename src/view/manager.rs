//! Owner of the current view
//!
//! Every change goes through one of the setters here. The synchronous
//! setters replace the view immediately. The `*_with_*_query` setters do the
//! same, then fetch results in the background and apply them only if the view
//! they were started for is still current: the loading token must match and
//! no major media change may have happened in between.

use super::executor::{ResultSelector, ViewQueryExecutor};
use super::factory::{ViewFactory, ViewFactoryOptions};
use super::modifiers::{apply_modifiers, ViewModifier};
use super::{View, ViewContext};
use crate::camera_manager::CameraManager;
use crate::config::CardConfig;
use crate::error::{Error, Result};
use crate::folders::FoldersManager;
use crate::message::MessageManager;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// The current view together with the one it replaced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewManagerEpoch {
    pub view: Option<View>,
    pub old_view: Option<View>,
}

pub type ViewChangeListener = Arc<dyn Fn(&ViewManagerEpoch) + Send + Sync>;

pub struct ViewManager {
    factory: ViewFactory,
    camera_manager: Arc<CameraManager>,
    executor: ViewQueryExecutor,
    messages: Arc<MessageManager>,
    epoch: Mutex<ViewManagerEpoch>,
    listener: Mutex<Option<ViewChangeListener>>,
}

impl ViewManager {
    pub fn new(
        config: Arc<CardConfig>,
        camera_manager: Arc<CameraManager>,
        folders: Option<Arc<dyn FoldersManager>>,
        messages: Arc<MessageManager>,
    ) -> Self {
        ViewManager {
            factory: ViewFactory::new(config),
            executor: ViewQueryExecutor::new(camera_manager.clone(), folders),
            camera_manager,
            messages,
            epoch: Mutex::new(ViewManagerEpoch::default()),
            listener: Mutex::new(None),
        }
    }

    pub fn factory(&self) -> &ViewFactory {
        &self.factory
    }

    /// Called after every change with the new epoch.
    pub fn set_listener(&self, listener: Option<ViewChangeListener>) {
        if let Ok(mut slot) = self.listener.lock() {
            *slot = listener;
        }
    }

    pub fn get_view(&self) -> Option<View> {
        self.get_epoch().view
    }

    pub fn has_view(&self) -> bool {
        self.get_view().is_some()
    }

    pub fn get_epoch(&self) -> ViewManagerEpoch {
        self.epoch
            .lock()
            .map(|epoch| epoch.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Show the default view, falling back silently if it is unsupported.
    pub async fn initialize(&self) {
        self.set_view_default_with_new_query(ViewFactoryOptions::default().fail_safe())
            .await;
    }

    pub fn reset(&self) {
        self.update(|_| Some(None));
    }

    pub fn set_view_default(&self, options: ViewFactoryOptions) -> Option<View> {
        let view = self.resolve(options, true)?;
        self.replace(view.clone());
        Some(view)
    }

    pub fn set_view_by_parameters(&self, options: ViewFactoryOptions) -> Option<View> {
        let view = self.resolve(options, false)?;
        self.replace(view.clone());
        Some(view)
    }

    /// Shallow-merge `context` into the current view. No-op without a view.
    pub fn set_view_with_merged_context(&self, context: ViewContext) {
        self.modify_view(&[ViewModifier::MergeContext(context)]);
    }

    /// Drop one top-level context key, e.g. a component's scratch state.
    pub fn set_view_without_context_property(&self, key: &str) {
        self.modify_view(&[ViewModifier::RemoveContextProperty(key.to_string())]);
    }

    fn modify_view(&self, modifiers: &[ViewModifier]) {
        self.update(|current| current.map(|view| Some(apply_modifiers(view.clone(), modifiers))));
    }

    pub async fn set_view_default_with_new_query(&self, options: ViewFactoryOptions) {
        let Some(view) = self.resolve(options, true) else {
            return;
        };
        let (view, token) = self.replace_loading(view);
        let modifiers = self.executor.get_new_query_modifiers(&view).await;
        self.finish_loading(&view, &token, modifiers);
    }

    pub async fn set_view_by_parameters_with_new_query(&self, options: ViewFactoryOptions) {
        let Some(view) = self.resolve(options, false) else {
            return;
        };
        let (view, token) = self.replace_loading(view);
        let modifiers = self.executor.get_new_query_modifiers(&view).await;
        self.finish_loading(&view, &token, modifiers);
    }

    /// Re-run the current query, selecting the first result that matches
    /// `selector` if given.
    pub async fn set_view_by_parameters_with_existing_query(
        &self,
        options: ViewFactoryOptions,
        selector: Option<ResultSelector>,
    ) {
        let Some(view) = self.resolve(options, false) else {
            return;
        };
        let (view, token) = self.replace_loading(view);
        let modifiers = self.executor.get_existing_query_modifiers(&view, selector).await;
        self.finish_loading(&view, &token, modifiers);
    }

    fn resolve(&self, mut options: ViewFactoryOptions, default: bool) -> Option<View> {
        if options.base_view.is_none() {
            options.base_view = self.get_view();
        }

        let store = self.camera_manager.store();
        let result = if default {
            self.factory.get_view_default(store.as_ref(), options)
        } else {
            self.factory.get_view_by_parameters(store.as_ref(), options)
        };
        result.map_err(|e| self.report(&e)).ok()
    }

    fn report(&self, error: &Error) {
        warn!("[ViewManager] {}", error);
        self.messages.set_error_if_higher_priority(error);
    }

    /// Set a view marked with a fresh loading token.
    fn replace_loading(&self, mut view: View) -> (View, String) {
        let token = Uuid::new_v4().to_string();
        view.context.set_loading_query(&token);
        self.replace(view.clone());
        (view, token)
    }

    fn finish_loading(&self, started: &View, token: &str, modifiers: Result<Option<Vec<ViewModifier>>>) {
        let modifiers = match modifiers {
            Ok(modifiers) => modifiers.unwrap_or_default(),
            Err(e) => {
                self.report(&e);
                Vec::new()
            }
        };

        self.update(|current| {
            let current = current?;
            if current.context.loading_query() != Some(token) || started.is_major_media_change(current) {
                debug!("[ViewManager] Discarding query results for superseded '{}' view", started.view);
                return None;
            }
            let mut view = apply_modifiers(current.clone(), &modifiers);
            view.context.clear_loading_query();
            Some(Some(view))
        });
    }

    fn replace(&self, view: View) {
        self.update(|_| Some(Some(view)));
    }

    /// Compute the next view from the current one. `None` from `next` leaves
    /// everything untouched; `Some(None)` clears the view.
    fn update(&self, next: impl FnOnce(Option<&View>) -> Option<Option<View>>) {
        let epoch = {
            let mut epoch = self.epoch.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let Some(view) = next(epoch.view.as_ref()) else {
                return;
            };
            let old_view = epoch.view.take();
            *epoch = ViewManagerEpoch { view, old_view };
            epoch.clone()
        };

        let listener = self.listener.lock().ok().and_then(|l| l.clone());
        if let Some(listener) = listener {
            listener(&epoch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_manager::factory::EngineCollaborators;
    use crate::hass::{EntityRegistryManager, HassEntityState};
    use crate::testing::{MockHomeAssistant, RecordingActionExecutor};
    use crate::view::{ViewName, ViewParameters};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn manager(config: serde_json::Value) -> (ViewManager, Arc<MessageManager>) {
        let config = Arc::new(CardConfig::from_value(config).unwrap());
        let hass = MockHomeAssistant::new().with_state(HassEntityState::new("camera.office", "idle"));
        let camera_manager = Arc::new(CameraManager::new(
            Arc::new(hass),
            Arc::new(RecordingActionExecutor::new()),
            EngineCollaborators::new(Arc::new(EntityRegistryManager::new())),
        ));
        camera_manager.initialize_cameras(&config.cameras).await;

        let messages = Arc::new(MessageManager::new());
        (
            ViewManager::new(config, camera_manager, None, messages.clone()),
            messages,
        )
    }

    fn office() -> serde_json::Value {
        json!({"cameras": [{"camera_entity": "camera.office"}]})
    }

    #[tokio::test]
    async fn test_initialize_shows_live() {
        let (manager, messages) = manager(office()).await;
        manager.initialize().await;

        let view = manager.get_view().unwrap();
        assert_eq!(view.view, ViewName::Live);
        assert_eq!(view.camera.as_deref(), Some("camera.office"));
        assert_eq!(view.context.loading_query(), None);
        assert!(!messages.has_message());
    }

    #[tokio::test]
    async fn test_incompatible_view_keeps_previous_and_reports() {
        let (manager, messages) = manager(office()).await;
        manager.set_view_default(ViewFactoryOptions::default());
        let before = manager.get_view();

        let result = manager.set_view_by_parameters(ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips)));
        assert!(result.is_none());
        assert_eq!(manager.get_view(), before);
        assert!(messages.get_message().unwrap().message.contains("clips"));
    }

    #[tokio::test]
    async fn test_merged_context_and_listener() {
        let (manager, _) = manager(office()).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager.set_listener(Some(Arc::new(move |_: &ViewManagerEpoch| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        manager.set_view_with_merged_context(ViewContext::new().with("zoom", json!(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        manager.set_view_default(ViewFactoryOptions::default());
        manager.set_view_with_merged_context(ViewContext::new().with("zoom", json!(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let epoch = manager.get_epoch();
        assert_eq!(epoch.view.unwrap().context.get("zoom"), Some(&json!(2)));
        assert!(epoch.old_view.unwrap().context.get("zoom").is_none());

        manager.reset();
        assert!(!manager.has_view());
    }

    #[tokio::test]
    async fn test_remove_context_property() {
        let (manager, _) = manager(office()).await;
        manager.set_view_without_context_property("zoom");
        assert!(!manager.has_view());

        manager.set_view_default(ViewFactoryOptions::default());
        manager.set_view_with_merged_context(ViewContext::new().with("zoom", json!(2)).with("pan", json!(1)));
        manager.set_view_without_context_property("zoom");

        let view = manager.get_view().unwrap();
        assert_eq!(view.context.get("zoom"), None);
        assert_eq!(view.context.get("pan"), Some(&json!(1)));
        assert_eq!(view.view, ViewName::Live);
    }
}
