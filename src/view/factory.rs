use super::{View, ViewDisplayMode, ViewName, ViewParameters};
use crate::camera_manager::store::CameraManagerReadOnlyConfigStore;
use crate::config::CardConfig;
use crate::error::{Result, ViewIncompatibleError};
use std::sync::Arc;
use tracing::debug;

/// Inputs for resolving a view
#[derive(Debug, Clone, Default)]
pub struct ViewFactoryOptions {
    pub params: ViewParameters,
    /// Substitute the default view instead of failing when the requested
    /// view cannot be shown
    pub fail_safe: bool,
    /// The view being replaced, if any
    pub base_view: Option<View>,
}

impl ViewFactoryOptions {
    pub fn new(params: ViewParameters) -> Self {
        ViewFactoryOptions {
            params,
            ..Default::default()
        }
    }

    pub fn fail_safe(mut self) -> Self {
        self.fail_safe = true;
        self
    }

    pub fn with_base_view(mut self, base_view: Option<View>) -> Self {
        self.base_view = base_view;
        self
    }
}

/// Resolves requested view parameters into a complete, supported [`View`]
pub struct ViewFactory {
    config: Arc<CardConfig>,
}

impl ViewFactory {
    pub fn new(config: Arc<CardConfig>) -> Self {
        ViewFactory { config }
    }

    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// The configured default view name with `auto` resolved.
    pub fn get_default_view_name(&self, store: &dyn CameraManagerReadOnlyConfigStore) -> ViewName {
        if let Some(view) = self.config.view.default.value() {
            return view;
        }
        if store.get_camera_count() > 0 {
            ViewName::Live
        } else if !self.config.folders.is_empty() {
            ViewName::Folders
        } else {
            ViewName::Image
        }
    }

    /// The default view. With camera cycling enabled, the camera after the
    /// base view's camera is chosen.
    pub fn get_view_default(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        options: ViewFactoryOptions,
    ) -> Result<View> {
        let view_name = self.get_default_view_name(store);

        let camera = match (&options.params.camera, &options.base_view) {
            (Some(camera), _) => Some(camera.clone()),
            (None, Some(base)) if self.config.view.default_cycle_camera => base
                .camera
                .as_deref()
                .and_then(|current| self.next_camera(store, view_name, current)),
            _ => self.first_capable_camera(store, view_name),
        };

        let params = ViewParameters {
            view: Some(view_name),
            camera,
            query: Some(options.params.query.clone().flatten()),
            query_results: Some(options.params.query_results.clone().flatten()),
            context: Some(options.params.context.clone().unwrap_or_default()),
            ..options.params
        };

        self.get_view_by_parameters(
            store,
            ViewFactoryOptions {
                params,
                fail_safe: options.fail_safe,
                base_view: options.base_view,
            },
        )
    }

    /// Resolve `options.params` against the base view and the cameras.
    pub fn get_view_by_parameters(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        options: ViewFactoryOptions,
    ) -> Result<View> {
        let ViewFactoryOptions {
            params,
            fail_safe,
            base_view,
        } = options;
        let base = base_view.as_ref();

        let view_name = params
            .view
            .or(base.map(|b| b.view))
            .unwrap_or_else(|| self.get_default_view_name(store));

        let requested_camera = params
            .camera
            .clone()
            .or_else(|| base.and_then(|b| b.camera.clone()).filter(|c| store.has_camera_id(c)));

        let (view_name, camera) = match self.resolve_camera(store, view_name, requested_camera.as_deref()) {
            Some(camera) => (view_name, camera),
            None => {
                let default_view = self.get_default_view_name(store);
                if !fail_safe {
                    return Err(ViewIncompatibleError {
                        view: view_name,
                        camera: requested_camera.clone(),
                        default_view: Some(default_view),
                        capabilities: requested_camera
                            .as_deref()
                            .and_then(|c| store.get_camera_capabilities(c))
                            .map(|c| c.raw().clone()),
                    }
                    .into());
                }

                debug!(
                    "[ViewFactory] '{}' unsupported for {:?}, falling back to '{}'",
                    view_name, requested_camera, default_view
                );
                // The substituted default is used as is, supported or not.
                let camera = self
                    .resolve_camera(store, default_view, requested_camera.as_deref())
                    .unwrap_or(requested_camera);
                (default_view, camera)
            }
        };

        let display_mode = params
            .display_mode
            .or_else(|| base.filter(|b| b.view == view_name).map(|b| b.display_mode))
            .or_else(|| self.config.display_mode_for(view_name))
            .unwrap_or(ViewDisplayMode::Single);

        let resolved = ViewParameters {
            view: Some(view_name),
            camera: camera.clone(),
            display_mode: Some(display_mode),
            ..params
        };

        let view = match base {
            Some(base) if base.camera == camera => base.evolve(resolved),
            Some(base) => base.evolve(ViewParameters {
                query: Some(resolved.query.clone().flatten()),
                query_results: Some(resolved.query_results.clone().flatten()),
                ..resolved
            }),
            None => View::new(view_name, None).evolve(resolved),
        };
        Ok(View { camera, ..view })
    }

    /// The camera to show `view` for, or `None` if the view is unsupported.
    /// The inner `None` is a view that needs no camera and has none.
    fn resolve_camera(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        view: ViewName,
        requested: Option<&str>,
    ) -> Option<Option<String>> {
        if !view.requires_camera() {
            return Some(requested.map(str::to_string));
        }
        match requested {
            Some(camera) => camera_supports_view(store, camera, view).then(|| Some(camera.to_string())),
            None => self.first_capable_camera(store, view).map(Some),
        }
    }

    fn capable_cameras(&self, store: &dyn CameraManagerReadOnlyConfigStore, view: ViewName) -> Vec<String> {
        store
            .get_camera_ids()
            .into_iter()
            .filter(|id| camera_supports_view(store, id, view))
            .collect()
    }

    fn first_capable_camera(&self, store: &dyn CameraManagerReadOnlyConfigStore, view: ViewName) -> Option<String> {
        self.capable_cameras(store, view).into_iter().next()
    }

    fn next_camera(&self, store: &dyn CameraManagerReadOnlyConfigStore, view: ViewName, current: &str) -> Option<String> {
        let cameras = self.capable_cameras(store, view);
        let next = match cameras.iter().position(|id| id == current) {
            Some(index) => (index + 1) % cameras.len(),
            None => 0,
        };
        cameras.get(next).cloned()
    }
}

/// Whether `camera` can show `view`. Media views are satisfied by any camera
/// grouped with it through dependencies; live needs the camera itself.
pub fn camera_supports_view(store: &dyn CameraManagerReadOnlyConfigStore, camera: &str, view: ViewName) -> bool {
    match view.camera_capability() {
        None => true,
        Some(search) if view == ViewName::Live => store.camera_matches(camera, &search),
        Some(search) => !store.get_all_dependent_cameras(camera, Some(&search)).is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_manager::store::CameraManagerStore;
    use crate::capabilities::CapabilityKey;
    use crate::error::Error;
    use crate::testing::StaticCamera;
    use crate::view::query_results::QueryResults;
    use serde_json::json;

    fn store(cameras: &[(&str, &[CapabilityKey])]) -> CameraManagerStore {
        let mut store = CameraManagerStore::new();
        for (id, capabilities) in cameras {
            store.add_camera(StaticCamera::new(id, capabilities).unwrap()).unwrap();
        }
        store
    }

    fn factory(config: serde_json::Value) -> ViewFactory {
        ViewFactory::new(Arc::new(CardConfig::from_value(config).unwrap()))
    }

    #[test]
    fn test_auto_default_view() {
        let factory = factory(json!({}));
        assert_eq!(factory.get_default_view_name(&store(&[])), ViewName::Image);
        assert_eq!(
            factory.get_default_view_name(&store(&[("office", &[CapabilityKey::Live])])),
            ViewName::Live
        );

        let with_folders = self::factory(json!({"folders": [{"root": "media-source://media_source"}]}));
        assert_eq!(with_folders.get_default_view_name(&store(&[])), ViewName::Folders);
    }

    #[test]
    fn test_first_capable_camera_is_chosen() {
        let store = store(&[
            ("office", &[CapabilityKey::Live]),
            ("garden", &[CapabilityKey::Live, CapabilityKey::Clips]),
        ]);
        let view = factory(json!({}))
            .get_view_by_parameters(&store, ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips)))
            .unwrap();
        assert_eq!(view.camera.as_deref(), Some("garden"));
        assert_eq!(view.view, ViewName::Clips);
    }

    #[test]
    fn test_unsupported_camera_fails_hard_with_context() {
        let store = store(&[("office", &[CapabilityKey::Live])]);
        let err = factory(json!({}))
            .get_view_by_parameters(
                &store,
                ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips).with_camera("office")),
            )
            .unwrap_err();

        let Error::ViewIncompatible(err) = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(err.view, ViewName::Clips);
        assert_eq!(err.camera.as_deref(), Some("office"));
        assert_eq!(err.default_view, Some(ViewName::Live));
        assert!(err.capabilities.is_some());
    }

    #[test]
    fn test_fail_safe_substitutes_default() {
        let store = store(&[("office", &[CapabilityKey::Live])]);
        let view = factory(json!({}))
            .get_view_by_parameters(
                &store,
                ViewFactoryOptions::new(ViewParameters::view(ViewName::Clips).with_camera("office")).fail_safe(),
            )
            .unwrap();
        assert_eq!(view.view, ViewName::Live);
        assert_eq!(view.camera.as_deref(), Some("office"));
    }

    #[test]
    fn test_display_mode_resolution() {
        let store = store(&[("office", &[CapabilityKey::Live, CapabilityKey::Clips])]);
        let factory = factory(json!({"live": {"display": {"mode": "grid"}}}));

        let live = factory
            .get_view_by_parameters(&store, ViewFactoryOptions::new(ViewParameters::view(ViewName::Live)))
            .unwrap();
        assert_eq!(live.display_mode, ViewDisplayMode::Grid);

        let single = factory
            .get_view_by_parameters(
                &store,
                ViewFactoryOptions::new(ViewParameters::default().with_display_mode(ViewDisplayMode::Single))
                    .with_base_view(Some(live.clone())),
            )
            .unwrap();
        assert_eq!(single.display_mode, ViewDisplayMode::Single);

        // Same view name: the base mode carries over.
        let refreshed = factory
            .get_view_by_parameters(&store, ViewFactoryOptions::default().with_base_view(Some(single.clone())))
            .unwrap();
        assert_eq!(refreshed.display_mode, ViewDisplayMode::Single);

        // New view name: the configured mode for that view wins.
        let back = factory
            .get_view_by_parameters(
                &store,
                ViewFactoryOptions::new(ViewParameters::view(ViewName::Live))
                    .with_base_view(Some(single.evolve(ViewParameters::view(ViewName::Clips)))),
            )
            .unwrap();
        assert_eq!(back.display_mode, ViewDisplayMode::Grid);
    }

    #[test]
    fn test_results_dropped_on_camera_change() {
        let store = store(&[
            ("office", &[CapabilityKey::Clips]),
            ("garden", &[CapabilityKey::Clips]),
        ]);
        let factory = factory(json!({}));
        let base = View {
            query_results: Some(Arc::new(QueryResults::new(vec![]))),
            ..View::new(ViewName::Clips, Some("office".to_string()))
        };

        let same = factory
            .get_view_by_parameters(
                &store,
                ViewFactoryOptions::new(ViewParameters::view(ViewName::Clip)).with_base_view(Some(base.clone())),
            )
            .unwrap();
        assert!(same.query_results.is_some());

        let other = factory
            .get_view_by_parameters(
                &store,
                ViewFactoryOptions::new(ViewParameters::default().with_camera("garden"))
                    .with_base_view(Some(base)),
            )
            .unwrap();
        assert!(other.query_results.is_none());
    }

    #[test]
    fn test_default_view_cycles_cameras() {
        let store = store(&[
            ("office", &[CapabilityKey::Live]),
            ("garden", &[CapabilityKey::Live]),
        ]);
        let factory = factory(json!({"view": {"default_cycle_camera": true}}));

        let first = factory.get_view_default(&store, ViewFactoryOptions::default()).unwrap();
        assert_eq!(first.camera.as_deref(), Some("office"));

        let second = factory
            .get_view_default(&store, ViewFactoryOptions::default().with_base_view(Some(first)))
            .unwrap();
        assert_eq!(second.camera.as_deref(), Some("garden"));

        let third = factory
            .get_view_default(&store, ViewFactoryOptions::default().with_base_view(Some(second)))
            .unwrap();
        assert_eq!(third.camera.as_deref(), Some("office"));
    }
}
