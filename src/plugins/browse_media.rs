//! Media discovery through Home Assistant's media source browser
//!
//! MotionEye and Reolink expose recorded media only as a `media_source` tree.
//! This module walks such a tree, pruning folders outside the requested time
//! range, and turns playable leaves into timed events.

use crate::camera_manager::cache::RequestCache;
use crate::camera_manager::store::CameraManagerReadOnlyConfigStore;
use crate::camera_manager::types::{
    CameraIds, CameraQuery, Engine, EngineOptions, EngineResult, EventPayload, EventQuery, QueryMaxAge,
    QueryReturn,
};
use crate::error::{Error, HassError, Result};
use crate::hass::HomeAssistant;
use crate::view::media::{MediaType, ViewItem, ViewMedia};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_DEPTH: usize = 4;
const MAX_AGE: QueryMaxAge = QueryMaxAge::Seconds(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseMedia {
    pub title: String,
    #[serde(default)]
    pub media_class: String,
    #[serde(default)]
    pub media_content_type: String,
    pub media_content_id: String,
    #[serde(default)]
    pub can_play: bool,
    #[serde(default)]
    pub can_expand: bool,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<BrowseMedia>>,
}

/// A playable media-source item with its parsed time range
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseMediaEvent {
    pub camera_id: String,
    pub media_type: MediaType,
    pub item: BrowseMedia,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// `chrono` formats for folder and file titles, for trees that encode times there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFormats {
    pub directory: String,
    pub file: String,
}

/// Where to start browsing for one camera and what kind of media lives there
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseMediaTarget {
    pub camera_id: String,
    pub root: String,
    pub media_type: MediaType,
    pub title_formats: Option<TitleFormats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn overlaps(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
        let before_end = self.end.map_or(true, |e| start <= e);
        let after_start = self.start.map_or(true, |s| end.unwrap_or(start) >= s);
        before_end && after_start
    }
}

/// Vendor knowledge about a media-source tree
pub trait BrowseMediaParser: Send + Sync {
    /// Whether a folder should be expanded for this query range.
    fn should_expand(&self, target: &BrowseMediaTarget, folder: &BrowseMedia, range: &TimeRange) -> bool;

    /// Start (and end, if known) of a playable item, given its parent folder.
    fn parse_file(
        &self,
        target: &BrowseMediaTarget,
        parent: &BrowseMedia,
        file: &BrowseMedia,
    ) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)>;
}

pub async fn browse_media(hass: &dyn HomeAssistant, media_content_id: &str) -> Result<BrowseMedia> {
    let response = hass
        .send_message(json!({
            "type": "media_source/browse_media",
            "media_content_id": media_content_id,
        }))
        .await?;
    serde_json::from_value(response).map_err(|e| {
        Error::Hass(HassError::Decode(format!(
            "browse_media {}: {}",
            media_content_id, e
        )))
    })
}

/// Walk a media-source tree from `target.root`, collecting playable items in range.
pub async fn walk(
    hass: &dyn HomeAssistant,
    parser: &dyn BrowseMediaParser,
    target: &BrowseMediaTarget,
    range: &TimeRange,
) -> Result<Vec<BrowseMediaEvent>> {
    let mut events = Vec::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(target.root.clone(), 0)]);

    while let Some((content_id, depth)) = queue.pop_front() {
        let folder = browse_media(hass, &content_id).await?;
        for child in folder.children.iter().flatten() {
            if child.can_expand && depth + 1 < MAX_DEPTH {
                if parser.should_expand(target, child, range) {
                    queue.push_back((child.media_content_id.clone(), depth + 1));
                }
            } else if child.can_play {
                let Some((start, end)) = parser.parse_file(target, &folder, child) else {
                    debug!(
                        "[BrowseMedia] Could not parse time from '{}' ({})",
                        child.title, child.media_content_id
                    );
                    continue;
                };
                if range.overlaps(start, end) {
                    events.push(BrowseMediaEvent {
                        camera_id: target.camera_id.clone(),
                        media_type: target.media_type,
                        item: child.clone(),
                        start_time: start,
                        end_time: end,
                    });
                }
            }
        }
    }

    Ok(events)
}

/// Shared engine logic for media-source backed vendors
pub struct BrowseMediaEngine {
    engine: Engine,
    parser: Arc<dyn BrowseMediaParser>,
    cache: Arc<RequestCache>,
}

impl BrowseMediaEngine {
    pub fn new(engine: Engine, parser: Arc<dyn BrowseMediaParser>, cache: Arc<RequestCache>) -> Self {
        BrowseMediaEngine {
            engine,
            parser,
            cache,
        }
    }

    /// One query per camera: media-source trees are per camera.
    pub fn generate_default_event_query(
        &self,
        camera_ids: &CameraIds,
        query: &EventQuery,
    ) -> Option<Vec<EventQuery>> {
        if camera_ids.is_empty() {
            return None;
        }
        Some(
            camera_ids
                .iter()
                .map(|id| EventQuery {
                    camera_ids: [id.clone()].into(),
                    ..query.clone()
                })
                .collect(),
        )
    }

    pub async fn get_events(
        &self,
        hass: &dyn HomeAssistant,
        targets: Vec<BrowseMediaTarget>,
        query: &EventQuery,
        options: EngineOptions,
    ) -> Result<Option<QueryReturn<EventQuery, EventPayload>>> {
        let cache_key = CameraQuery::Event(query.clone());
        if options.use_cache {
            if let Some(cached) = self.cache.get::<EventPayload>(&cache_key) {
                return Ok(Some(vec![(query.clone(), cached)]));
            }
        }

        let range = TimeRange {
            start: query.start,
            end: query.end,
        };

        let mut events = Vec::new();
        for target in &targets {
            match walk(hass, self.parser.as_ref(), target, &range).await {
                Ok(found) => events.extend(found),
                Err(e) => warn!(
                    "[{}Engine] Browsing {} for camera {} failed: {}",
                    self.engine, target.root, target.camera_id, e
                ),
            }
        }

        events.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }

        let mut result = EngineResult::new(self.engine, EventPayload::BrowseMedia(events));
        result.expiry = MAX_AGE.expiry_from(Utc::now());
        if options.use_cache {
            self.cache.set(cache_key, result.clone());
        }
        Ok(Some(vec![(query.clone(), result)]))
    }

    pub fn generate_media_from_events(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &EventQuery,
        results: &EngineResult<EventPayload>,
    ) -> Option<Vec<ViewItem>> {
        let EventPayload::BrowseMedia(events) = &results.payload else {
            return None;
        };

        Some(
            events
                .iter()
                .filter(|event| query.camera_ids.contains(&event.camera_id))
                .filter(|event| store.has_camera_id(&event.camera_id))
                .map(|event| {
                    ViewItem::Event(
                        ViewMedia::new(
                            event.item.media_content_id.clone(),
                            event.camera_id.clone(),
                            event.media_type,
                        )
                        .with_times(Some(event.start_time), event.end_time.or(Some(event.start_time)))
                        .with_title(event.item.title.clone())
                        .with_thumbnail(event.item.thumbnail.clone())
                        .with_content_id(event.item.media_content_id.clone()),
                    )
                })
                .collect(),
        )
    }

    pub fn get_query_result_max_age(&self, query: &CameraQuery) -> Option<QueryMaxAge> {
        matches!(query, CameraQuery::Event(_)).then_some(MAX_AGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHomeAssistant;
    use chrono::TimeZone;
    use serde_json::Value;

    struct HourParser;

    impl BrowseMediaParser for HourParser {
        fn should_expand(&self, _target: &BrowseMediaTarget, folder: &BrowseMedia, _range: &TimeRange) -> bool {
            folder.title != "skip"
        }

        fn parse_file(
            &self,
            _target: &BrowseMediaTarget,
            _parent: &BrowseMedia,
            file: &BrowseMedia,
        ) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
            let hour = file.title.parse().ok()?;
            Some((Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(), None))
        }
    }

    fn node(id: &str, title: &str, folder: bool, children: Option<Value>) -> Value {
        json!({
            "title": title,
            "media_content_id": id,
            "can_expand": folder,
            "can_play": !folder,
            "children": children,
        })
    }

    #[tokio::test]
    async fn test_walk_prunes_and_filters() {
        let hass = MockHomeAssistant::new();
        hass.respond_with("media_source/browse_media", |message| {
            Ok(match message["media_content_id"].as_str().unwrap_or_default() {
                "root" => node("root", "root", true, Some(json!([
                    node("day", "day", true, None),
                    node("skipped", "skip", true, None),
                    node("bad", "not-a-time", false, None),
                ]))),
                "day" => node("day", "day", true, Some(json!([
                    node("f1", "1", false, None),
                    node("f9", "9", false, None),
                ]))),
                _ => node("x", "x", true, Some(json!([node("never", "5", false, None)]))),
            })
        });

        let target = BrowseMediaTarget {
            camera_id: "office".to_string(),
            root: "root".to_string(),
            media_type: MediaType::Clip,
            title_formats: None,
        };
        let range = TimeRange {
            start: Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()),
            end: None,
        };

        let events = walk(&hass, &HourParser, &target, &range).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item.media_content_id, "f9");
        assert_eq!(hass.sent_messages_of_type("media_source/browse_media").len(), 2);
    }
}
