use super::camera::Camera;
use super::types::{CameraIds, Engine};
use crate::capabilities::{CapabilitySearchOptions, Capabilities};
use crate::error::{CameraInitializationError, CameraInitializationReason, Result};
use crate::models::CameraConfig;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Whether cameras that lack a capability but are grouped (through
/// dependencies) with a camera that has it should be included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraSearchOptions {
    pub inclusive: bool,
}

impl CameraSearchOptions {
    pub fn inclusive() -> Self {
        CameraSearchOptions { inclusive: true }
    }
}

/// Read-side view of the configured cameras
pub trait CameraManagerReadOnlyConfigStore: Send + Sync {
    /// Camera IDs in configuration order
    fn get_camera_ids(&self) -> Vec<String>;

    fn get_camera(&self, camera_id: &str) -> Option<Arc<dyn Camera>>;

    fn get_camera_count(&self) -> usize {
        self.get_camera_ids().len()
    }

    fn has_camera_id(&self, camera_id: &str) -> bool {
        self.get_camera(camera_id).is_some()
    }

    fn get_cameras(&self) -> Vec<Arc<dyn Camera>> {
        self.get_camera_ids()
            .iter()
            .filter_map(|id| self.get_camera(id))
            .collect()
    }

    fn get_camera_config(&self, camera_id: &str) -> Option<Arc<CameraConfig>> {
        self.get_camera(camera_id).map(|camera| camera.config())
    }

    fn get_camera_capabilities(&self, camera_id: &str) -> Option<Arc<Capabilities>> {
        self.get_camera(camera_id).and_then(|camera| camera.capabilities())
    }

    fn get_default_camera_id(&self) -> Option<String> {
        self.get_camera_ids().into_iter().next()
    }

    fn camera_matches(&self, camera_id: &str, search: &CapabilitySearchOptions) -> bool {
        self.get_camera_capabilities(camera_id)
            .is_some_and(|capabilities| capabilities.matches(search))
    }

    /// `camera_id` plus every camera it depends on, transitively. An
    /// `all_cameras` dependency pulls in every camera. Optionally filtered
    /// by capability.
    fn get_all_dependent_cameras(
        &self,
        camera_id: &str,
        capability: Option<&CapabilitySearchOptions>,
    ) -> Vec<String> {
        let all_ids = self.get_camera_ids();
        if !all_ids.iter().any(|id| id == camera_id) {
            return Vec::new();
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([camera_id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(config) = self.get_camera_config(&current) else {
                continue;
            };
            let deps = if config.dependencies.all_cameras {
                &all_ids
            } else {
                &config.dependencies.cameras
            };
            for dep in deps {
                if !visited.contains(dep) && all_ids.contains(dep) {
                    queue.push_back(dep.clone());
                }
            }
        }

        all_ids
            .into_iter()
            .filter(|id| visited.contains(id))
            .filter(|id| capability.map_or(true, |search| self.camera_matches(id, search)))
            .collect()
    }

    /// Cameras with the capability. With `inclusive`, also cameras grouped
    /// with one that has it, in either direction of the dependency.
    fn get_camera_ids_with_capability(
        &self,
        search: &CapabilitySearchOptions,
        options: CameraSearchOptions,
    ) -> Vec<String> {
        let all_ids = self.get_camera_ids();
        let capable: HashSet<String> = all_ids
            .iter()
            .filter(|id| self.camera_matches(id, search))
            .cloned()
            .collect();
        if !options.inclusive {
            return all_ids.into_iter().filter(|id| capable.contains(id)).collect();
        }

        let groups: HashMap<String, Vec<String>> = all_ids
            .iter()
            .map(|id| (id.clone(), self.get_all_dependent_cameras(id, None)))
            .collect();
        all_ids
            .iter()
            .filter(|id| {
                capable.contains(*id)
                    || groups
                        .get(*id)
                        .is_some_and(|deps| deps.iter().any(|dep| capable.contains(dep)))
                    || capable
                        .iter()
                        .any(|other| groups.get(other).is_some_and(|deps| deps.contains(*id)))
            })
            .cloned()
            .collect()
    }

    /// Camera IDs grouped by the engine serving them
    fn get_engines_for_camera_ids(&self, camera_ids: &CameraIds) -> BTreeMap<Engine, CameraIds> {
        let mut engines: BTreeMap<Engine, CameraIds> = BTreeMap::new();
        for id in camera_ids {
            if let Some(camera) = self.get_camera(id) {
                engines.entry(camera.engine()).or_default().insert(id.clone());
            }
        }
        engines
    }
}

/// Ordered camera store
#[derive(Default)]
pub struct CameraManagerStore {
    cameras: Vec<Arc<dyn Camera>>,
    index: HashMap<String, usize>,
}

impl CameraManagerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_camera(&mut self, camera: Arc<dyn Camera>) -> Result<()> {
        let id = camera.id().to_string();
        if self.index.contains_key(&id) {
            return Err(CameraInitializationError::new(
                CameraInitializationReason::DuplicateCameraId(id),
                &camera.config(),
            )
            .into());
        }
        self.index.insert(id, self.cameras.len());
        self.cameras.push(camera);
        Ok(())
    }

    /// Destroy every camera and empty the store.
    pub fn reset(&mut self) {
        for camera in self.cameras.drain(..) {
            camera.destroy();
        }
        self.index.clear();
    }
}

impl CameraManagerReadOnlyConfigStore for CameraManagerStore {
    fn get_camera_ids(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.id().to_string()).collect()
    }

    fn get_camera(&self, camera_id: &str) -> Option<Arc<dyn Camera>> {
        self.index.get(camera_id).map(|i| self.cameras[*i].clone())
    }

    fn get_camera_count(&self) -> usize {
        self.cameras.len()
    }

    fn get_cameras(&self) -> Vec<Arc<dyn Camera>> {
        self.cameras.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_manager::camera::CameraBase;
    use crate::capabilities::{CapabilitiesRaw, CapabilityKey};
    use crate::hass::HomeAssistant;
    use async_trait::async_trait;

    struct TestCamera {
        base: CameraBase,
    }

    #[async_trait]
    impl Camera for TestCamera {
        fn base(&self) -> &CameraBase {
            &self.base
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        async fn initialize(&self, _hass: &dyn HomeAssistant) -> Result<()> {
            Ok(())
        }
    }

    fn camera(id: &str, capabilities: &[CapabilityKey], deps: &[&str], all: bool) -> Arc<dyn Camera> {
        let mut config = CameraConfig {
            id: Some(id.to_string()),
            ..Default::default()
        };
        config.dependencies.cameras = deps.iter().map(|d| d.to_string()).collect();
        config.dependencies.all_cameras = all;

        let camera = TestCamera {
            base: CameraBase::new(config, Engine::Generic).unwrap(),
        };
        camera
            .base
            .set_capabilities(CapabilitiesRaw::new().with_all(capabilities));
        Arc::new(camera)
    }

    fn store() -> CameraManagerStore {
        let mut store = CameraManagerStore::new();
        store
            .add_camera(camera("main", &[CapabilityKey::Live], &["sub"], false))
            .unwrap();
        store
            .add_camera(camera("sub", &[CapabilityKey::Clips], &[], false))
            .unwrap();
        store
            .add_camera(camera("other", &[CapabilityKey::Live], &[], false))
            .unwrap();
        store
    }

    #[test]
    fn test_duplicate_camera_id_rejected() {
        let mut store = store();
        assert!(store
            .add_camera(camera("main", &[], &[], false))
            .is_err());
        assert_eq!(store.get_camera_count(), 3);
    }

    #[test]
    fn test_capability_search_exclusive_and_inclusive() {
        let store = store();
        let clips = CapabilitySearchOptions::from(CapabilityKey::Clips);

        assert_eq!(
            store.get_camera_ids_with_capability(&clips, CameraSearchOptions::default()),
            vec!["sub"]
        );
        assert_eq!(
            store.get_camera_ids_with_capability(&clips, CameraSearchOptions::inclusive()),
            vec!["main", "sub"]
        );
    }

    #[test]
    fn test_dependent_cameras_follow_declared_dependencies() {
        let store = store();
        assert_eq!(store.get_all_dependent_cameras("main", None), vec!["main", "sub"]);
        assert_eq!(store.get_all_dependent_cameras("sub", None), vec!["sub"]);
        assert_eq!(store.get_all_dependent_cameras("other", None), vec!["other"]);
        assert!(store.get_all_dependent_cameras("missing", None).is_empty());
    }

    #[test]
    fn test_all_cameras_dependency() {
        let mut store = store();
        store
            .add_camera(camera("wall", &[], &[], true))
            .unwrap();

        assert_eq!(
            store.get_all_dependent_cameras("wall", None),
            vec!["main", "sub", "other", "wall"]
        );
        assert_eq!(
            store.get_all_dependent_cameras("wall", Some(&CapabilityKey::Live.into())),
            vec!["main", "other"]
        );

        // A wildcard camera does not merge the cameras it depends on.
        assert_eq!(store.get_all_dependent_cameras("main", None), vec!["main", "sub"]);
        assert_eq!(store.get_all_dependent_cameras("other", None), vec!["other"]);
        assert_eq!(
            store.get_all_dependent_cameras("sub", Some(&CapabilityKey::Clips.into())),
            vec!["sub"]
        );
        assert_eq!(
            store.get_camera_ids_with_capability(&CapabilityKey::Clips.into(), CameraSearchOptions::inclusive()),
            vec!["main", "sub", "wall"]
        );
    }

    #[test]
    fn test_default_camera_is_first() {
        assert_eq!(store().get_default_camera_id().as_deref(), Some("main"));
        assert_eq!(CameraManagerStore::new().get_default_camera_id(), None);
    }
}
