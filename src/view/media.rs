//! Uniform media model
//!
//! Every engine converts its vendor results into [`ViewItem`]s. Consumers
//! discriminate variants with the [`ViewItemClassifier`] helpers or a `match`.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Clip,
    Snapshot,
    Recording,
    Review,
}

impl MediaType {
    pub fn is_video(&self) -> bool {
        !matches!(self, MediaType::Snapshot)
    }
}

/// One piece of camera media
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewMedia {
    /// Vendor identity, unique per engine
    pub id: String,
    pub camera_id: String,
    pub media_type: MediaType,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub in_progress: bool,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    /// URL or media-source content ID used to play the media
    pub content_id: Option<String>,
    pub favorite: Option<bool>,
    pub reviewed: Option<bool>,
    pub what: Vec<String>,
    pub r#where: Vec<String>,
    pub tags: Vec<String>,
    pub score: Option<f64>,
    pub severity: Option<String>,
}

impl ViewMedia {
    pub fn new(id: impl Into<String>, camera_id: impl Into<String>, media_type: MediaType) -> Self {
        ViewMedia {
            id: id.into(),
            camera_id: camera_id.into(),
            media_type,
            start_time: None,
            end_time: None,
            in_progress: false,
            title: None,
            thumbnail: None,
            content_id: None,
            favorite: None,
            reviewed: None,
            what: Vec::new(),
            r#where: Vec::new(),
            tags: Vec::new(),
            score: None,
            severity: None,
        }
    }

    pub fn with_times(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self.in_progress = start.is_some() && end.is_none();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// Whether `time` falls inside this media's time range.
    pub fn includes_time(&self, time: DateTime<Utc>) -> bool {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => start <= time && time <= end,
            (Some(start), None) => start <= time,
            _ => false,
        }
    }
}

/// A browsable folder entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewFolder {
    pub id: String,
    pub folder_id: String,
    pub title: String,
    pub icon: Option<String>,
    pub thumbnail: Option<String>,
    /// Path within the folder to expand this entry
    pub path: Vec<String>,
}

/// Anything that can be shown in a gallery or viewer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewItem {
    Event(ViewMedia),
    Recording(ViewMedia),
    Review(ViewMedia),
    Folder(ViewFolder),
}

impl ViewItem {
    pub fn id(&self) -> &str {
        match self {
            ViewItem::Event(m) | ViewItem::Recording(m) | ViewItem::Review(m) => &m.id,
            ViewItem::Folder(f) => &f.id,
        }
    }

    pub fn media(&self) -> Option<&ViewMedia> {
        match self {
            ViewItem::Event(m) | ViewItem::Recording(m) | ViewItem::Review(m) => Some(m),
            ViewItem::Folder(_) => None,
        }
    }

    pub fn media_mut(&mut self) -> Option<&mut ViewMedia> {
        match self {
            ViewItem::Event(m) | ViewItem::Recording(m) | ViewItem::Review(m) => Some(m),
            ViewItem::Folder(_) => None,
        }
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.media().map(|m| m.camera_id.as_str())
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.media().and_then(|m| m.start_time)
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            ViewItem::Folder(f) => Some(&f.title),
            _ => self.media().and_then(|m| m.title.as_deref()),
        }
    }
}

/// Discriminant checks over [`ViewItem`]
pub struct ViewItemClassifier;

impl ViewItemClassifier {
    pub fn is_media(item: &ViewItem) -> bool {
        item.media().is_some()
    }

    pub fn is_event(item: &ViewItem) -> bool {
        matches!(item, ViewItem::Event(_))
    }

    pub fn is_recording(item: &ViewItem) -> bool {
        matches!(item, ViewItem::Recording(_))
    }

    pub fn is_review(item: &ViewItem) -> bool {
        matches!(item, ViewItem::Review(_))
    }

    pub fn is_folder(item: &ViewItem) -> bool {
        matches!(item, ViewItem::Folder(_))
    }

    pub fn is_clip(item: &ViewItem) -> bool {
        item.media().is_some_and(|m| m.media_type == MediaType::Clip)
    }

    pub fn is_snapshot(item: &ViewItem) -> bool {
        item.media().is_some_and(|m| m.media_type == MediaType::Snapshot)
    }

    pub fn is_video(item: &ViewItem) -> bool {
        item.media().is_some_and(|m| m.media_type.is_video())
    }
}

/// Newest first. Items without a start time sort last.
pub fn sort_most_recent_first(items: &mut [ViewItem]) {
    items.sort_by(|a, b| b.start_time().cmp(&a.start_time()));
}
