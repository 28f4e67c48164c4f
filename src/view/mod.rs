//! What the card is currently showing
//!
//! A [`View`] is an immutable value. Every transition produces a new `View`
//! through [`View::evolve`]; only the [`ViewManager`](manager::ViewManager)
//! decides which one is current.

pub mod executor;
pub mod factory;
pub mod manager;
pub mod media;
pub mod modifiers;
pub mod query_results;

use crate::camera_manager::types::MediaQuery;
use crate::capabilities::{CapabilityKey, CapabilitySearchOptions};
use crate::view::media::MediaType;
use query_results::QueryResults;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub use factory::{ViewFactory, ViewFactoryOptions};
pub use manager::{ViewManager, ViewManagerEpoch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewName {
    Live,
    Clip,
    Clips,
    Snapshot,
    Snapshots,
    Recording,
    Recordings,
    Review,
    Reviews,
    Timeline,
    Image,
    Folder,
    Folders,
    Diagnostics,
}

impl ViewName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewName::Live => "live",
            ViewName::Clip => "clip",
            ViewName::Clips => "clips",
            ViewName::Snapshot => "snapshot",
            ViewName::Snapshots => "snapshots",
            ViewName::Recording => "recording",
            ViewName::Recordings => "recordings",
            ViewName::Review => "review",
            ViewName::Reviews => "reviews",
            ViewName::Timeline => "timeline",
            ViewName::Image => "image",
            ViewName::Folder => "folder",
            ViewName::Folders => "folders",
            ViewName::Diagnostics => "diagnostics",
        }
    }

    pub fn is_gallery(&self) -> bool {
        matches!(
            self,
            ViewName::Clips | ViewName::Snapshots | ViewName::Recordings | ViewName::Reviews | ViewName::Folders
        )
    }

    pub fn is_viewer(&self) -> bool {
        matches!(
            self,
            ViewName::Clip | ViewName::Snapshot | ViewName::Recording | ViewName::Review | ViewName::Folder
        )
    }

    /// Views that show one media item at a time or a grid of them
    pub fn is_media(&self) -> bool {
        self.is_gallery() || self.is_viewer() || *self == ViewName::Live || *self == ViewName::Timeline
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, ViewName::Folder | ViewName::Folders)
    }

    /// The viewer that opens an item of this gallery
    pub fn viewer(&self) -> ViewName {
        match self {
            ViewName::Clips => ViewName::Clip,
            ViewName::Snapshots => ViewName::Snapshot,
            ViewName::Recordings => ViewName::Recording,
            ViewName::Reviews => ViewName::Review,
            ViewName::Folders => ViewName::Folder,
            other => *other,
        }
    }

    /// Whether the view can only be shown for a camera
    pub fn requires_camera(&self) -> bool {
        self.camera_capability().is_some()
    }

    /// Capability a camera (or one of its dependencies) needs for this view
    pub fn camera_capability(&self) -> Option<CapabilitySearchOptions> {
        match self {
            ViewName::Live => Some(CapabilityKey::Live.into()),
            ViewName::Clip | ViewName::Clips => Some(CapabilityKey::Clips.into()),
            ViewName::Snapshot | ViewName::Snapshots => Some(CapabilityKey::Snapshots.into()),
            ViewName::Recording | ViewName::Recordings => Some(CapabilityKey::Recordings.into()),
            ViewName::Review | ViewName::Reviews => Some(CapabilityKey::Reviews.into()),
            ViewName::Timeline => Some(CapabilitySearchOptions::any_of(&[
                CapabilityKey::Clips,
                CapabilityKey::Snapshots,
                CapabilityKey::Recordings,
                CapabilityKey::Reviews,
            ])),
            ViewName::Image | ViewName::Folder | ViewName::Folders | ViewName::Diagnostics => None,
        }
    }

    /// Kind of event media this view lists, for event-backed views
    pub fn event_media_type(&self) -> Option<MediaType> {
        match self {
            ViewName::Clip | ViewName::Clips => Some(MediaType::Clip),
            ViewName::Snapshot | ViewName::Snapshots => Some(MediaType::Snapshot),
            _ => None,
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewDisplayMode {
    #[default]
    Single,
    Grid,
}

const LOADING: &str = "loading";
const LOADING_QUERY: &str = "query";
const GALLERY: &str = "gallery";
const GALLERY_ORIGIN_VIEW: &str = "origin_view";
const LIVE: &str = "live";
const LIVE_OVERRIDES: &str = "overrides";

/// Free-form per-view state: substream overrides, loading markers and
/// component scratch data. Top-level keys are owned by one component each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewContext(Map<String, Value>);

impl ViewContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: top-level keys of `other` replace ours.
    pub fn merge(&mut self, other: ViewContext) {
        self.0.extend(other.0);
    }

    /// Token of the query load in flight for this view
    pub fn loading_query(&self) -> Option<&str> {
        self.0.get(LOADING)?.get(LOADING_QUERY)?.as_str()
    }

    pub fn set_loading_query(&mut self, token: &str) {
        let loading = self
            .0
            .entry(LOADING)
            .or_insert_with(|| Value::Object(Map::new()));
        if !loading.is_object() {
            *loading = Value::Object(Map::new());
        }
        loading[LOADING_QUERY] = Value::String(token.to_string());
    }

    pub fn clear_loading_query(&mut self) {
        let now_empty = match self.0.get_mut(LOADING).and_then(Value::as_object_mut) {
            Some(loading) => {
                loading.remove(LOADING_QUERY);
                loading.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.0.remove(LOADING);
        }
    }

    /// The viewer a gallery prepared its results for
    pub fn gallery_origin_view(&self) -> Option<ViewName> {
        let value = self.0.get(GALLERY)?.get(GALLERY_ORIGIN_VIEW)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn with_gallery_origin_view(self, view: ViewName) -> Self {
        self.with(GALLERY, serde_json::json!({ GALLERY_ORIGIN_VIEW: view }))
    }

    /// Live substream chosen for a camera, if it was overridden
    pub fn live_override(&self, camera_id: &str) -> Option<&str> {
        self.0.get(LIVE)?.get(LIVE_OVERRIDES)?.get(camera_id)?.as_str()
    }
}

/// Folder browsing request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderQuery {
    pub folder_id: String,
    /// Content IDs from the folder root down to the folder to expand
    pub path: Vec<String>,
}

/// What a view's results were fetched with
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewQuery {
    Media(MediaQuery),
    Folder(FolderQuery),
}

/// Partial update for a view. `None` means "keep"; the nested options on
/// `query` and `query_results` allow clearing.
#[derive(Debug, Clone, Default)]
pub struct ViewParameters {
    pub view: Option<ViewName>,
    pub camera: Option<String>,
    pub display_mode: Option<ViewDisplayMode>,
    pub query: Option<Option<Arc<ViewQuery>>>,
    pub query_results: Option<Option<Arc<QueryResults>>>,
    pub context: Option<ViewContext>,
}

impl ViewParameters {
    pub fn view(view: ViewName) -> Self {
        ViewParameters {
            view: Some(view),
            ..Default::default()
        }
    }

    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera = Some(camera.into());
        self
    }

    pub fn with_display_mode(mut self, mode: ViewDisplayMode) -> Self {
        self.display_mode = Some(mode);
        self
    }

    pub fn with_context(mut self, context: ViewContext) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub view: ViewName,
    pub camera: Option<String>,
    pub display_mode: ViewDisplayMode,
    pub query: Option<Arc<ViewQuery>>,
    pub query_results: Option<Arc<QueryResults>>,
    pub context: ViewContext,
}

impl View {
    pub fn new(view: ViewName, camera: Option<String>) -> Self {
        View {
            view,
            camera,
            display_mode: ViewDisplayMode::default(),
            query: None,
            query_results: None,
            context: ViewContext::default(),
        }
    }

    /// A copy with the given fields replaced. Query and results are shared.
    pub fn evolve(&self, params: ViewParameters) -> View {
        View {
            view: params.view.unwrap_or(self.view),
            camera: params.camera.or_else(|| self.camera.clone()),
            display_mode: params.display_mode.unwrap_or(self.display_mode),
            query: params.query.unwrap_or_else(|| self.query.clone()),
            query_results: params
                .query_results
                .unwrap_or_else(|| self.query_results.clone()),
            context: params.context.unwrap_or_else(|| self.context.clone()),
        }
    }

    pub fn merge_in_context(&self, context: ViewContext) -> View {
        let mut merged = self.context.clone();
        merged.merge(context);
        self.evolve(ViewParameters {
            context: Some(merged),
            ..Default::default()
        })
    }

    pub fn is_gallery_view(&self) -> bool {
        self.view.is_gallery()
    }

    pub fn is_viewer_view(&self) -> bool {
        self.view.is_viewer()
    }

    pub fn is_grid_mode(&self) -> bool {
        self.display_mode == ViewDisplayMode::Grid
    }

    fn live_override(&self) -> Option<&str> {
        self.camera
            .as_deref()
            .and_then(|camera| self.context.live_override(camera))
    }

    /// True if `other` shows different media: another view, camera, substream
    /// or result set. Loading markers and scratch context do not count.
    pub fn is_major_media_change(&self, other: &View) -> bool {
        let same_results = match (&self.query_results, &other.query_results) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.view != other.view
            || self.camera != other.camera
            || self.live_override() != other.live_override()
            || !same_results
    }
}
