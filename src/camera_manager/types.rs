use crate::plugins::browse_media::BrowseMediaEvent;
use crate::plugins::frigate::types::FrigateEvent;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Engine discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Generic,
    Frigate,
    #[serde(rename = "motioneye")]
    MotionEye,
    Reolink,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Generic => "generic",
            Engine::Frigate => "frigate",
            Engine::MotionEye => "motioneye",
            Engine::Reolink => "reolink",
        }
    }

    /// Engine serving entities of a registry platform
    pub fn from_platform(platform: &str) -> Engine {
        match platform {
            "frigate" => Engine::Frigate,
            "motioneye" => Engine::MotionEye,
            "reolink" => Engine::Reolink,
            _ => Engine::Generic,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type CameraIds = BTreeSet<String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventQuery {
    pub camera_ids: CameraIds,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub favorite: Option<bool>,
    pub has_clip: Option<bool>,
    pub has_snapshot: Option<bool>,
    /// Object labels
    pub what: Option<BTreeSet<String>>,
    /// Zones
    pub r#where: Option<BTreeSet<String>>,
    /// Sub-labels
    pub tags: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RecordingQuery {
    pub camera_ids: CameraIds,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSeverity {
    Alert,
    Detection,
    SignificantMotion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ReviewQuery {
    pub camera_ids: CameraIds,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub reviewed: Option<bool>,
    pub severity: Option<ReviewSeverity>,
    pub what: Option<BTreeSet<String>>,
    pub r#where: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingSegmentsQuery {
    pub camera_ids: CameraIds,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MediaMetadataQuery {
    pub camera_ids: CameraIds,
}

/// Any engine query. Used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CameraQuery {
    Event(EventQuery),
    Recording(RecordingQuery),
    Review(ReviewQuery),
    RecordingSegments(RecordingSegmentsQuery),
    MediaMetadata(MediaMetadataQuery),
}

impl CameraQuery {
    pub fn camera_ids(&self) -> &CameraIds {
        match self {
            CameraQuery::Event(q) => &q.camera_ids,
            CameraQuery::Recording(q) => &q.camera_ids,
            CameraQuery::Review(q) => &q.camera_ids,
            CameraQuery::RecordingSegments(q) => &q.camera_ids,
            CameraQuery::MediaMetadata(q) => &q.camera_ids,
        }
    }
}

/// A set of media queries of one kind, as attached to a view
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaQuery {
    Event(Vec<EventQuery>),
    Recording(Vec<RecordingQuery>),
    Review(Vec<ReviewQuery>),
}

impl MediaQuery {
    pub fn camera_ids(&self) -> CameraIds {
        match self {
            MediaQuery::Event(queries) => queries.iter().flat_map(|q| q.camera_ids.clone()).collect(),
            MediaQuery::Recording(queries) => queries.iter().flat_map(|q| q.camera_ids.clone()).collect(),
            MediaQuery::Review(queries) => queries.iter().flat_map(|q| q.camera_ids.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MediaQuery::Event(queries) => queries.is_empty(),
            MediaQuery::Recording(queries) => queries.is_empty(),
            MediaQuery::Review(queries) => queries.is_empty(),
        }
    }
}

/// How long a query result may be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMaxAge {
    Unbounded,
    Seconds(u64),
}

impl QueryMaxAge {
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            QueryMaxAge::Unbounded => None,
            QueryMaxAge::Seconds(seconds) => Some(now + chrono::Duration::seconds(*seconds as i64)),
        }
    }
}

/// Raw result of one engine query
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResult<T> {
    pub engine: Engine,
    /// `None` means the result never goes stale
    pub expiry: Option<DateTime<Utc>>,
    pub cached: bool,
    pub payload: T,
}

impl<T> EngineResult<T> {
    pub fn new(engine: Engine, payload: T) -> Self {
        EngineResult {
            engine,
            expiry: None,
            cached: false,
            payload,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

/// Results keyed by the (possibly split) query that produced them
pub type QueryReturn<Q, T> = Vec<(Q, EngineResult<T>)>;

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Frigate(Vec<FrigateEvent>),
    BrowseMedia(Vec<BrowseMediaEvent>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recording {
    pub camera_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: String,
    pub camera: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub severity: ReviewSeverity,
    pub reviewed: bool,
    pub thumb_path: Option<String>,
    pub labels: Vec<String>,
    pub zones: Vec<String>,
    pub sub_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSegment {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

pub type RecordingSegments = Arc<Vec<RecordingSegment>>;

/// Filter values available for a set of cameras
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaMetadata {
    pub what: BTreeSet<String>,
    pub r#where: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub days: BTreeSet<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraIcon {
    pub icon: String,
    pub entity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraMetadata {
    pub title: String,
    pub icon: CameraIcon,
    pub engine_icon: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaCapabilities {
    pub can_favorite: bool,
    pub can_download: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraEventType {
    New,
    Update,
    End,
}

/// Push notification about activity on a camera
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraEvent {
    pub camera_id: String,
    pub event_type: CameraEventType,
    pub clip: bool,
    pub snapshot: bool,
}

pub type CameraEventCallback = Arc<dyn Fn(CameraEvent) + Send + Sync>;

/// Per-call engine options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub use_cache: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions { use_cache: true }
    }
}
