//! Camera manager
//!
//! Owns the configured cameras and routes every media request to the engine
//! serving each camera. Per-camera and per-engine failures are contained: one
//! broken camera or one failing vendor API never takes the others down.

pub mod cache;
pub mod camera;
pub mod engine;
pub mod factory;
pub mod store;
pub mod types;

use camera::Camera;
use chrono::{DateTime, Utc};
use engine::CameraManagerEngine;
use factory::{CameraManagerEngineFactory, EngineCollaborators};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use store::{CameraManagerReadOnlyConfigStore, CameraManagerStore};
use tracing::{debug, info, warn};
use types::{
    CameraIds, CameraMetadata, CameraQuery, EngineOptions, EventQuery, MediaCapabilities,
    MediaMetadata, MediaMetadataQuery, MediaQuery, QueryMaxAge, RecordingQuery, RecordingSegment,
    RecordingSegmentsQuery, ReviewQuery,
};

use crate::error::{CameraInitializationError, CameraInitializationReason, Error, Result};
use crate::fetch::HttpEndpoint;
use crate::hass::{ActionExecutor, HomeAssistant};
use crate::models::CameraConfig;
use crate::ptz::{PtzAction, PtzActionOptions, PtzController};
use crate::view::media::{sort_most_recent_first, ViewItem, ViewMedia};

/// Outcome of (re)initializing the camera set
#[derive(Debug, Default)]
pub struct CameraInitializationReport {
    /// Cameras that initialized, in configuration order
    pub camera_ids: Vec<String>,
    pub errors: Vec<Error>,
}

type Job<Q> = (Arc<dyn CameraManagerEngine>, Q);

pub struct CameraManager {
    hass: Arc<dyn HomeAssistant>,
    executor: Arc<dyn ActionExecutor>,
    factory: CameraManagerEngineFactory,
    store: RwLock<Arc<CameraManagerStore>>,
    ptz_controllers: Mutex<HashMap<String, Arc<PtzController>>>,
}

impl CameraManager {
    pub fn new(
        hass: Arc<dyn HomeAssistant>,
        executor: Arc<dyn ActionExecutor>,
        collaborators: EngineCollaborators,
    ) -> Self {
        CameraManager {
            hass,
            executor,
            factory: CameraManagerEngineFactory::new(collaborators),
            store: RwLock::new(Arc::new(CameraManagerStore::new())),
            ptz_controllers: Mutex::new(HashMap::new()),
        }
    }

    pub fn hass(&self) -> &Arc<dyn HomeAssistant> {
        &self.hass
    }

    pub fn factory(&self) -> &CameraManagerEngineFactory {
        &self.factory
    }

    /// Snapshot of the current cameras. Replaced wholesale on reinitialization.
    pub fn store(&self) -> Arc<CameraManagerStore> {
        self.store
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    async fn create_camera(&self, config: CameraConfig) -> Result<Arc<dyn Camera>> {
        let engine_type = self
            .factory
            .get_engine_for_camera(self.hass.as_ref(), &config)
            .await?;
        let engine = engine_type
            .and_then(|engine| self.factory.create_engine(engine))
            .ok_or_else(|| {
                CameraInitializationError::new(CameraInitializationReason::NoCameraEngine, &config)
            })?;
        engine.create_camera(self.hass.as_ref(), config).await
    }

    /// Replace the camera set. Cameras initialize concurrently; each failure is
    /// reported without affecting the others.
    pub async fn initialize_cameras(&self, configs: &[CameraConfig]) -> CameraInitializationReport {
        self.destroy();
        self.factory.collaborators().clear_caches();

        let created = join_all(configs.iter().map(|config| self.create_camera(config.clone()))).await;

        let mut store = CameraManagerStore::new();
        let mut report = CameraInitializationReport::default();
        for result in created {
            let added = result.and_then(|camera| {
                let id = camera.id().to_string();
                store.add_camera(camera.clone()).map(|_| id).inspect_err(|_| camera.destroy())
            });
            match added {
                Ok(id) => report.camera_ids.push(id),
                Err(e) => {
                    warn!("[CameraManager] Camera initialization failed: {}", e);
                    report.errors.push(e);
                }
            }
        }

        info!(
            "[CameraManager] Initialized {} camera(s), {} failed",
            report.camera_ids.len(),
            report.errors.len()
        );
        if let Ok(mut current) = self.store.write() {
            *current = Arc::new(store);
        }
        report
    }

    /// The engine serving a camera
    pub fn get_engine_for_camera_id(&self, camera_id: &str) -> Option<Arc<dyn CameraManagerEngine>> {
        let camera = self.store().get_camera(camera_id)?;
        self.factory.create_engine(camera.engine())
    }

    fn engine_groups(&self, store: &CameraManagerStore, camera_ids: &CameraIds) -> Vec<Job<CameraIds>> {
        store
            .get_engines_for_camera_ids(camera_ids)
            .into_iter()
            .filter_map(|(engine, ids)| Some((self.factory.create_engine(engine)?, ids)))
            .collect()
    }

    fn non_empty<Q>(queries: Vec<Q>) -> Option<Vec<Q>> {
        (!queries.is_empty()).then_some(queries)
    }

    pub fn generate_default_event_queries(&self, camera_ids: &CameraIds, partial: &EventQuery) -> Option<Vec<EventQuery>> {
        let store = self.store();
        let queries = self
            .engine_groups(&store, camera_ids)
            .into_iter()
            .filter_map(|(engine, ids)| engine.generate_default_event_query(store.as_ref(), &ids, partial))
            .flatten()
            .collect();
        Self::non_empty(queries)
    }

    pub fn generate_default_recording_queries(
        &self,
        camera_ids: &CameraIds,
        partial: &RecordingQuery,
    ) -> Option<Vec<RecordingQuery>> {
        let store = self.store();
        let queries = self
            .engine_groups(&store, camera_ids)
            .into_iter()
            .filter_map(|(engine, ids)| engine.generate_default_recording_query(store.as_ref(), &ids, partial))
            .flatten()
            .collect();
        Self::non_empty(queries)
    }

    pub fn generate_default_review_queries(&self, camera_ids: &CameraIds, partial: &ReviewQuery) -> Option<Vec<ReviewQuery>> {
        let store = self.store();
        let queries = self
            .engine_groups(&store, camera_ids)
            .into_iter()
            .filter_map(|(engine, ids)| engine.generate_default_review_query(store.as_ref(), &ids, partial))
            .flatten()
            .collect();
        Self::non_empty(queries)
    }

    pub fn generate_default_recording_segments_queries(
        &self,
        camera_ids: &CameraIds,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Vec<RecordingSegmentsQuery>> {
        let store = self.store();
        let queries = self
            .engine_groups(&store, camera_ids)
            .into_iter()
            .filter_map(|(engine, ids)| {
                engine.generate_default_recording_segments_query(store.as_ref(), &ids, start, end)
            })
            .flatten()
            .collect();
        Self::non_empty(queries)
    }

    async fn event_media(
        &self,
        store: &CameraManagerStore,
        engine: &dyn CameraManagerEngine,
        query: &EventQuery,
        options: EngineOptions,
    ) -> Result<Vec<ViewItem>> {
        let hass = self.hass.as_ref();
        let results = engine.get_events(hass, store, query, options).await?.unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|(query, result)| engine.generate_media_from_events(hass, store, query, result))
            .flatten()
            .collect())
    }

    async fn recording_media(
        &self,
        store: &CameraManagerStore,
        engine: &dyn CameraManagerEngine,
        query: &RecordingQuery,
        options: EngineOptions,
    ) -> Result<Vec<ViewItem>> {
        let hass = self.hass.as_ref();
        let results = engine.get_recordings(hass, store, query, options).await?.unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|(query, result)| engine.generate_media_from_recordings(hass, store, query, result))
            .flatten()
            .collect())
    }

    async fn review_media_items(
        &self,
        store: &CameraManagerStore,
        engine: &dyn CameraManagerEngine,
        query: &ReviewQuery,
        options: EngineOptions,
    ) -> Result<Vec<ViewItem>> {
        let hass = self.hass.as_ref();
        let results = engine.get_reviews(hass, store, query, options).await?.unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|(query, result)| engine.generate_media_from_reviews(hass, store, query, result))
            .flatten()
            .collect())
    }

    /// Split each query by engine, keeping only the cameras each engine serves.
    fn jobs<Q: Clone>(
        &self,
        store: &CameraManagerStore,
        queries: &[Q],
        camera_ids: impl Fn(&Q) -> &CameraIds,
        scoped: impl Fn(&Q, CameraIds) -> Q,
    ) -> Vec<Job<Q>> {
        queries
            .iter()
            .flat_map(|query| {
                self.engine_groups(store, camera_ids(query))
                    .into_iter()
                    .map(|(engine, ids)| (engine, scoped(query, ids)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Run a media query against every engine involved and merge the results:
    /// duplicates (by ID) removed, newest first. Engine failures are logged and
    /// skipped. The first error is returned only if no engine succeeded.
    pub async fn execute_media_queries(&self, query: &MediaQuery, options: EngineOptions) -> Result<Vec<ViewItem>> {
        let store = self.store();
        let store_ref = store.as_ref();

        let results = match query {
            MediaQuery::Event(queries) => {
                let jobs = self.jobs(store_ref, queries, |q| &q.camera_ids, |q, ids| EventQuery {
                    camera_ids: ids,
                    ..q.clone()
                });
                join_all(jobs.iter().map(|(engine, q)| self.event_media(store_ref, engine.as_ref(), q, options))).await
            }
            MediaQuery::Recording(queries) => {
                let jobs = self.jobs(store_ref, queries, |q| &q.camera_ids, |q, ids| RecordingQuery {
                    camera_ids: ids,
                    ..q.clone()
                });
                join_all(jobs.iter().map(|(engine, q)| self.recording_media(store_ref, engine.as_ref(), q, options)))
                    .await
            }
            MediaQuery::Review(queries) => {
                let jobs = self.jobs(store_ref, queries, |q| &q.camera_ids, |q, ids| ReviewQuery {
                    camera_ids: ids,
                    ..q.clone()
                });
                join_all(jobs.iter().map(|(engine, q)| self.review_media_items(store_ref, engine.as_ref(), q, options)))
                    .await
            }
        };

        merge_media(results)
    }

    /// Recording segments per (camera-scoped) query
    pub async fn get_recording_segments(
        &self,
        queries: &[RecordingSegmentsQuery],
        options: EngineOptions,
    ) -> Vec<(RecordingSegmentsQuery, Vec<RecordingSegment>)> {
        let store = self.store();
        let store_ref = store.as_ref();
        let jobs = self.jobs(store_ref, queries, |q| &q.camera_ids, |q, ids| RecordingSegmentsQuery {
            camera_ids: ids,
            ..q.clone()
        });

        let hass = self.hass.as_ref();
        let results = join_all(
            jobs.iter()
                .map(|(engine, q)| engine.get_recording_segments(hass, store_ref, q, options)),
        )
        .await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(results) => results,
                Err(e) => {
                    warn!("[CameraManager] Recording segments query failed: {}", e);
                    None
                }
            })
            .flatten()
            .map(|(query, result)| (query, result.payload))
            .collect()
    }

    /// Filter values (labels, zones, tags, days) across cameras
    pub async fn get_media_metadata(&self, camera_ids: &CameraIds, options: EngineOptions) -> Option<MediaMetadata> {
        let store = self.store();
        let store_ref = store.as_ref();
        let hass = self.hass.as_ref();
        let jobs: Vec<Job<MediaMetadataQuery>> = self
            .engine_groups(store_ref, camera_ids)
            .into_iter()
            .map(|(engine, ids)| (engine, MediaMetadataQuery { camera_ids: ids }))
            .collect();

        let results = join_all(
            jobs.iter()
                .map(|(engine, q)| engine.get_media_metadata(hass, store_ref, q, options)),
        )
        .await;

        let mut merged: Option<MediaMetadata> = None;
        for result in results {
            let results = match result {
                Ok(Some(results)) => results,
                Ok(None) => continue,
                Err(e) => {
                    warn!("[CameraManager] Media metadata query failed: {}", e);
                    continue;
                }
            };
            for (_, result) in results {
                let metadata = merged.get_or_insert_with(MediaMetadata::default);
                metadata.what.extend(result.payload.what);
                metadata.r#where.extend(result.payload.r#where);
                metadata.tags.extend(result.payload.tags);
                metadata.days.extend(result.payload.days);
            }
        }
        merged
    }

    /// Shortest freshness window over the engines a media query touches.
    /// `None` means the results must not be reused.
    pub fn get_media_query_max_age(&self, query: &MediaQuery) -> Option<QueryMaxAge> {
        let store = self.store();
        let camera_queries: Vec<CameraQuery> = match query {
            MediaQuery::Event(queries) => queries.iter().cloned().map(CameraQuery::Event).collect(),
            MediaQuery::Recording(queries) => queries.iter().cloned().map(CameraQuery::Recording).collect(),
            MediaQuery::Review(queries) => queries.iter().cloned().map(CameraQuery::Review).collect(),
        };

        let mut max_age: Option<QueryMaxAge> = None;
        for camera_query in &camera_queries {
            for (engine, _) in self.engine_groups(&store, camera_query.camera_ids()) {
                let age = engine.get_query_result_max_age(camera_query)?;
                max_age = Some(match (max_age, age) {
                    (None, age) | (Some(QueryMaxAge::Unbounded), age) => age,
                    (Some(current), QueryMaxAge::Unbounded) => current,
                    (Some(QueryMaxAge::Seconds(a)), QueryMaxAge::Seconds(b)) => QueryMaxAge::Seconds(a.min(b)),
                });
            }
        }
        max_age
    }

    pub fn get_camera_metadata(&self, camera_id: &str) -> Option<CameraMetadata> {
        let config = self.store().get_camera_config(camera_id)?;
        let engine = self.get_engine_for_camera_id(camera_id)?;
        Some(engine.get_camera_metadata(self.hass.as_ref(), &config))
    }

    fn media_target(&self, media: &ViewMedia) -> Option<(Arc<dyn CameraManagerEngine>, Arc<CameraConfig>)> {
        let config = self.store().get_camera_config(&media.camera_id)?;
        Some((self.get_engine_for_camera_id(&media.camera_id)?, config))
    }

    pub fn get_media_capabilities(&self, media: &ViewMedia) -> Option<MediaCapabilities> {
        let (engine, _) = self.media_target(media)?;
        engine.get_media_capabilities(media)
    }

    pub async fn get_media_download_path(&self, media: &ViewMedia) -> Result<Option<HttpEndpoint>> {
        match self.media_target(media) {
            Some((engine, config)) => engine.get_media_download_path(self.hass.as_ref(), &config, media).await,
            None => Ok(None),
        }
    }

    pub async fn favorite_media(&self, media: &ViewMedia, favorite: bool) -> Result<()> {
        match self.media_target(media) {
            Some((engine, config)) => {
                engine
                    .favorite_media(self.hass.as_ref(), &config, media, favorite)
                    .await
            }
            None => Ok(()),
        }
    }

    pub async fn review_media(&self, media: &ViewMedia, reviewed: bool) -> Result<()> {
        match self.media_target(media) {
            Some((engine, config)) => {
                engine
                    .review_media(self.hass.as_ref(), &config, media, reviewed)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Seconds into `media` at which wall-clock `target` occurs
    pub async fn get_media_seek_time(&self, media: &ViewMedia, target: DateTime<Utc>) -> Result<Option<f64>> {
        let Some((engine, _)) = self.media_target(media) else {
            return Ok(None);
        };
        let store = self.store();
        engine
            .get_media_seek_time(self.hass.as_ref(), store.as_ref(), media, target)
            .await
    }

    fn ptz_controller(&self, camera_id: &str) -> Option<Arc<PtzController>> {
        let camera = self.store().get_camera(camera_id)?;
        let mut controllers = self.ptz_controllers.lock().ok()?;
        let controller = controllers
            .entry(camera_id.to_string())
            .or_insert_with(|| Arc::new(PtzController::new(camera, self.executor.clone())));
        Some(controller.clone())
    }

    /// Returns false if the camera is unknown or cannot perform the action.
    pub async fn execute_ptz_action(
        &self,
        camera_id: &str,
        action: PtzAction,
        options: PtzActionOptions,
    ) -> Result<bool> {
        match self.ptz_controller(camera_id) {
            Some(controller) => controller.execute(action, options).await,
            None => {
                debug!("[CameraManager] PTZ {} requested for unknown camera {}", action, camera_id);
                Ok(false)
            }
        }
    }

    /// Stop emulated motion and release every camera subscription.
    pub fn destroy(&self) {
        if let Ok(mut controllers) = self.ptz_controllers.lock() {
            controllers.clear();
        }
        for camera in self.store().get_cameras() {
            camera.destroy();
        }
    }
}

fn merge_media(results: Vec<Result<Vec<ViewItem>>>) -> Result<Vec<ViewItem>> {
    let attempted = results.len();
    let mut items = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(found) => items.extend(found),
            Err(e) => {
                warn!("[CameraManager] Media query failed: {}", e);
                errors.push(e);
            }
        }
    }

    if attempted > 0 && errors.len() == attempted {
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
    }

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.id().to_string()));
    sort_most_recent_first(&mut items);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HassError;
    use crate::hass::{Entity, EntityRegistryManager, HassEntityState};
    use crate::testing::{MockHomeAssistant, RecordingActionExecutor};
    use crate::view::media::MediaType;

    fn manager(hass: &MockHomeAssistant) -> CameraManager {
        CameraManager::new(
            Arc::new(hass.clone()),
            Arc::new(RecordingActionExecutor::new()),
            EngineCollaborators::new(Arc::new(EntityRegistryManager::new())),
        )
    }

    fn entity_config(entity: &str) -> CameraConfig {
        CameraConfig {
            camera_entity: Some(entity.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_failures_are_per_camera() {
        let hass = MockHomeAssistant::new()
            .with_state(HassEntityState::new("camera.template", "idle"))
            .with_entity(Entity::new("camera.porch", "onvif"));
        let manager = manager(&hass);

        let report = manager
            .initialize_cameras(&[
                entity_config("camera.template"),
                entity_config("camera.typo"),
                entity_config("camera.porch"),
                entity_config("camera.porch"),
                CameraConfig::default(),
            ])
            .await;

        assert_eq!(report.camera_ids, vec!["camera.template", "camera.porch"]);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(manager.store().get_camera_count(), 2);
    }

    #[tokio::test]
    async fn test_generic_cameras_have_no_media() {
        let hass = MockHomeAssistant::new().with_state(HassEntityState::new("camera.template", "idle"));
        let manager = manager(&hass);
        manager.initialize_cameras(&[entity_config("camera.template")]).await;

        let ids: CameraIds = ["camera.template".to_string()].into();
        assert!(manager.generate_default_event_queries(&ids, &EventQuery::default()).is_none());
        assert!(manager
            .generate_default_recording_queries(&ids, &RecordingQuery::default())
            .is_none());
        assert!(manager.get_media_metadata(&ids, EngineOptions::default()).await.is_none());

        let media = ViewMedia::new("x", "camera.template", MediaType::Clip);
        assert!(manager.get_media_capabilities(&media).is_none());
        assert!(manager.get_media_download_path(&media).await.unwrap().is_none());
        assert_eq!(
            manager.get_camera_metadata("camera.template").unwrap().title,
            "camera.template"
        );
    }

    #[test]
    fn test_merge_dedupes_and_sorts() {
        use chrono::TimeZone;

        let item = |id: &str, hour: u32| {
            ViewItem::Event(ViewMedia::new(id, "office", MediaType::Clip).with_times(
                Some(Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()),
                None,
            ))
        };
        let merged = merge_media(vec![
            Ok(vec![item("a", 1), item("b", 3)]),
            Ok(vec![item("a", 1), item("c", 2)]),
            Err(Error::Hass(HassError::Connection("lost".to_string()))),
        ])
        .unwrap();
        let ids: Vec<&str> = merged.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        assert!(merge_media(vec![Err(Error::Config("x".to_string()))]).is_err());
        assert!(merge_media(vec![]).unwrap().is_empty());
    }
}
