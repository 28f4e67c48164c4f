//! Fetches the results a view needs and expresses them as [`ViewModifier`]s

use super::media::ViewItem;
use super::modifiers::ViewModifier;
use super::query_results::QueryResults;
use super::{FolderQuery, View, ViewName, ViewQuery};
use crate::camera_manager::store::CameraManagerReadOnlyConfigStore;
use crate::camera_manager::types::{CameraIds, EngineOptions, EventQuery, MediaQuery, RecordingQuery, ReviewQuery};
use crate::camera_manager::CameraManager;
use crate::error::Result;
use crate::folders::FoldersManager;
use std::sync::Arc;
use tracing::debug;

/// Default number of items fetched for a gallery or viewer
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Picks the item to select within re-fetched results
pub type ResultSelector = Arc<dyn Fn(&ViewItem) -> bool + Send + Sync>;

pub struct ViewQueryExecutor {
    camera_manager: Arc<CameraManager>,
    folders: Option<Arc<dyn FoldersManager>>,
}

impl ViewQueryExecutor {
    pub fn new(camera_manager: Arc<CameraManager>, folders: Option<Arc<dyn FoldersManager>>) -> Self {
        ViewQueryExecutor {
            camera_manager,
            folders,
        }
    }

    /// Modifiers attaching a fresh query and its results to `view`. `None`
    /// means the view needs no query, or already carries results it can use.
    pub async fn get_new_query_modifiers(&self, view: &View) -> Result<Option<Vec<ViewModifier>>> {
        if view.view.is_viewer()
            && view.query_results.is_some()
            && view.context.gallery_origin_view() == Some(view.view)
        {
            debug!("[ViewQueryExecutor] Adopting gallery results for '{}'", view.view);
            return Ok(None);
        }

        let Some(query) = self.build_query(view) else {
            return Ok(None);
        };
        let items = self.execute(&query, EngineOptions::default()).await?;
        debug!(
            "[ViewQueryExecutor] '{}' query returned {} item(s)",
            view.view,
            items.len()
        );

        Ok(Some(vec![
            ViewModifier::SetQuery(Some(Arc::new(query))),
            ViewModifier::SetQueryResults(Some(Arc::new(QueryResults::new(items)))),
        ]))
    }

    /// Modifiers re-running the view's existing query. The selection moves to
    /// the first item matching `selector`, else stays on the previously
    /// selected item if it is still present.
    pub async fn get_existing_query_modifiers(
        &self,
        view: &View,
        selector: Option<ResultSelector>,
    ) -> Result<Option<Vec<ViewModifier>>> {
        let Some(query) = view.query.as_deref() else {
            return Ok(None);
        };

        let results = QueryResults::new(self.execute(query, EngineOptions::default()).await?);
        let previous = view
            .query_results
            .as_ref()
            .and_then(|r| r.get_selected_result())
            .map(|item| item.id().to_string());

        let selected = selector
            .and_then(|selector| results.select_result_if_found(|item| selector(item)))
            .or_else(|| {
                previous.and_then(|id| results.select_result_if_found(|item| item.id() == id))
            })
            .unwrap_or(results);

        Ok(Some(vec![ViewModifier::SetQueryResults(Some(Arc::new(selected)))]))
    }

    async fn execute(&self, query: &ViewQuery, options: EngineOptions) -> Result<Vec<ViewItem>> {
        match query {
            ViewQuery::Media(query) => self.camera_manager.execute_media_queries(query, options).await,
            ViewQuery::Folder(query) => match &self.folders {
                Some(folders) => {
                    folders
                        .expand_folder(self.camera_manager.hass().as_ref(), query)
                        .await
                }
                None => Ok(Vec::new()),
            },
        }
    }

    fn build_query(&self, view: &View) -> Option<ViewQuery> {
        if view.view.is_folder() {
            let folder_id = self.folders.as_ref()?.get_default_folder_id()?;
            return Some(ViewQuery::Folder(FolderQuery {
                folder_id,
                path: Vec::new(),
            }));
        }

        let camera = view.camera.as_deref()?;
        let search = view.view.camera_capability()?;
        let camera_ids: CameraIds = self
            .camera_manager
            .store()
            .get_all_dependent_cameras(camera, Some(&search))
            .into_iter()
            .collect();
        if camera_ids.is_empty() {
            return None;
        }

        let limit = Some(DEFAULT_QUERY_LIMIT);
        let manager = &self.camera_manager;
        let query = match view.view {
            ViewName::Clip | ViewName::Clips => MediaQuery::Event(manager.generate_default_event_queries(
                &camera_ids,
                &EventQuery {
                    has_clip: Some(true),
                    limit,
                    ..Default::default()
                },
            )?),
            ViewName::Snapshot | ViewName::Snapshots => MediaQuery::Event(manager.generate_default_event_queries(
                &camera_ids,
                &EventQuery {
                    has_snapshot: Some(true),
                    limit,
                    ..Default::default()
                },
            )?),
            ViewName::Timeline => MediaQuery::Event(
                manager.generate_default_event_queries(&camera_ids, &EventQuery { limit, ..Default::default() })?,
            ),
            ViewName::Recording | ViewName::Recordings => MediaQuery::Recording(
                manager.generate_default_recording_queries(&camera_ids, &RecordingQuery { limit, ..Default::default() })?,
            ),
            ViewName::Review | ViewName::Reviews => MediaQuery::Review(
                manager.generate_default_review_queries(&camera_ids, &ReviewQuery { limit, ..Default::default() })?,
            ),
            ViewName::Live | ViewName::Image | ViewName::Diagnostics | ViewName::Folder | ViewName::Folders => {
                return None
            }
        };
        Some(ViewQuery::Media(query))
    }
}
